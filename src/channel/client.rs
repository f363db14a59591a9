use std::{
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
};

use crate::ConsoleError;

use super::{
    Channel, Command, CommandSink, ConnectionState, Handler, Inbound, SubscriptionId,
    Subscriptions, WireMessage,
    backoff::{Backoff, RECONNECT_INITIAL_WAIT_MS, RECONNECT_MAX_WAIT_MS},
};

const CONNECT_TIMEOUT_MS: u64 = 3_000;
const MAX_EVENTS_PER_POLL: usize = 256;

#[derive(Clone, Debug)]
pub struct ChannelSettings {
    /// `host:port` of the vehicle controller
    pub addr: String,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub connect_timeout: Duration,
}

impl ChannelSettings {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reconnect_initial: Duration::from_millis(RECONNECT_INITIAL_WAIT_MS),
            reconnect_max: Duration::from_millis(RECONNECT_MAX_WAIT_MS),
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
        }
    }
}

enum LinkEvent {
    State(ConnectionState),
    Message(WireMessage),
}

struct Link {
    outbound: UnboundedSender<Command>,
    inbound: Receiver<LinkEvent>,
    io_thread: Option<JoinHandle<()>>,
}

/// TCP implementation of [`Channel`].
///
/// The socket is owned by a dedicated I/O thread running a single-threaded tokio runtime.
/// Nothing on that thread touches session state: inbound messages are queued on a std mpsc
/// channel and only turned into events when the owner calls [`Channel::poll`].
pub struct ChannelClient {
    settings: ChannelSettings,
    state: ConnectionState,
    subscriptions: Subscriptions,
    link: Option<Link>,
}

impl ChannelClient {
    pub fn new(settings: ChannelSettings) -> Self {
        Self {
            settings,
            state: ConnectionState::Disconnected,
            subscriptions: Subscriptions::default(),
            link: None,
        }
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    fn validate_addr(&self) -> Result<(), ConsoleError> {
        let addr = self.settings.addr.trim();
        let valid = addr
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if valid {
            Ok(())
        } else {
            Err(ConsoleError::InvalidControllerAddress {
                addr: self.settings.addr.clone(),
            })
        }
    }
}

impl CommandSink for ChannelClient {
    fn publish(&mut self, command: Command) {
        match &self.link {
            Some(link) => {
                debug!("Publishing {}", command);
                if link.outbound.send(command).is_err() {
                    debug!("Channel I/O thread has stopped, command dropped");
                }
            }
            None => debug!("Channel not started, dropping {}", command.event_name()),
        }
    }
}

impl Channel for ChannelClient {
    fn connect(&mut self) -> Result<(), ConsoleError> {
        if self.link.is_some() {
            return Ok(());
        }
        self.validate_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ConsoleError::ChannelRuntimeError { source: e })?;
        let (outbound_tx, outbound_rx) = unbounded_channel::<Command>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<LinkEvent>();
        let settings = self.settings.clone();

        let io_thread = thread::Builder::new()
            .name("channel-io".to_string())
            .spawn(move || runtime.block_on(run_link(settings, outbound_rx, inbound_tx)))
            .map_err(|e| ConsoleError::ChannelRuntimeError { source: e })?;

        info!("Starting controller link to {}", self.settings.addr);
        self.link = Some(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
            io_thread: Some(io_thread),
        });
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state
    }

    fn subscribe(&mut self, event: &str, handler: Handler) -> SubscriptionId {
        self.subscriptions.add(event, handler)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(id)
    }

    fn poll(&mut self) -> Vec<Inbound> {
        let mut events = Vec::new();
        let mut link_gone = false;

        if let Some(link) = &self.link {
            while events.len() < MAX_EVENTS_PER_POLL {
                match link.inbound.try_recv() {
                    Ok(LinkEvent::State(state)) => {
                        if state != self.state {
                            self.state = state;
                            events.push(Inbound::Connection(state));
                        }
                    }
                    Ok(LinkEvent::Message(message)) => match Inbound::from_wire(message) {
                        Ok(event) => events.push(event),
                        Err(e) => warn!("Skipping inbound message: {}", e),
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        link_gone = true;
                        break;
                    }
                }
            }
        }

        if link_gone {
            error!("Channel I/O thread exited unexpectedly");
            self.link = None;
            if self.state != ConnectionState::Disconnected {
                self.state = ConnectionState::Disconnected;
                events.push(Inbound::Connection(ConnectionState::Disconnected));
            }
        }

        for event in &events {
            self.subscriptions.dispatch(event);
        }
        events
    }

    fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            // dropping the sender lets the I/O thread flush what is queued and exit
            drop(link.outbound);
            if let Some(handle) = link.io_thread.take() {
                if handle.join().is_err() {
                    error!("Channel I/O thread panicked");
                }
            }
            info!("Controller link closed");
        }
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.close();
    }
}

enum Attempt {
    Connected(TcpStream),
    Failed(String),
    Shutdown,
}

enum SessionEnd {
    LinkLost,
    Shutdown,
}

async fn run_link(
    settings: ChannelSettings,
    mut outbound: UnboundedReceiver<Command>,
    inbound: Sender<LinkEvent>,
) {
    let mut backoff = Backoff::new(settings.reconnect_initial, settings.reconnect_max);

    loop {
        if inbound
            .send(LinkEvent::State(ConnectionState::Connecting))
            .is_err()
        {
            return;
        }

        match connect_stream(&settings, &mut outbound).await {
            Attempt::Shutdown => return,
            Attempt::Connected(stream) => {
                info!("Connected to controller at {}", settings.addr);
                backoff.reset();
                if inbound
                    .send(LinkEvent::State(ConnectionState::Connected))
                    .is_err()
                {
                    return;
                }
                let end = run_session(stream, &mut outbound, &inbound).await;
                if inbound
                    .send(LinkEvent::State(ConnectionState::Disconnected))
                    .is_err()
                {
                    return;
                }
                if let SessionEnd::Shutdown = end {
                    return;
                }
            }
            Attempt::Failed(reason) => {
                debug!("Could not reach controller at {}: {}", settings.addr, reason);
                if inbound
                    .send(LinkEvent::State(ConnectionState::Disconnected))
                    .is_err()
                {
                    return;
                }
            }
        }

        let delay = backoff.next_delay();
        debug!(
            "Reconnecting in {:?} (attempt {})",
            delay,
            backoff.attempts()
        );
        if !wait_discarding(delay, &mut outbound).await {
            return;
        }
    }
}

async fn connect_stream(
    settings: &ChannelSettings,
    outbound: &mut UnboundedReceiver<Command>,
) -> Attempt {
    let connect = tokio::time::timeout(
        settings.connect_timeout,
        TcpStream::connect(settings.addr.as_str()),
    );
    tokio::pin!(connect);

    loop {
        tokio::select! {
            result = &mut connect => {
                return match result {
                    Ok(Ok(stream)) => Attempt::Connected(stream),
                    Ok(Err(e)) => Attempt::Failed(e.to_string()),
                    Err(_) => Attempt::Failed("connection attempt timed out".to_string()),
                };
            }
            command = outbound.recv() => match command {
                Some(command) => debug!("Link down, dropping {}", command.event_name()),
                None => return Attempt::Shutdown,
            },
        }
    }
}

/// Sleeps for `delay`, dropping any command published meanwhile. Returns `false` when the
/// client has been closed.
async fn wait_discarding(delay: Duration, outbound: &mut UnboundedReceiver<Command>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = outbound.recv() => match command {
                Some(command) => debug!("Link down, dropping {}", command.event_name()),
                None => return false,
            },
        }
    }
}

async fn run_session(
    stream: TcpStream,
    outbound: &mut UnboundedReceiver<Command>,
    inbound: &Sender<LinkEvent>,
) -> SessionEnd {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle on controller socket: {}", e);
    }
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WireMessage>(&line) {
                        Ok(message) => {
                            if inbound.send(LinkEvent::Message(message)).is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!("Skipping unparsable line from controller: {}", e),
                    }
                }
                Ok(None) => {
                    info!("Controller closed the connection");
                    return SessionEnd::LinkLost;
                }
                Err(e) => {
                    warn!("Error reading from controller: {}", e);
                    return SessionEnd::LinkLost;
                }
            },
            command = outbound.recv() => match command {
                Some(command) => {
                    let mut frame = match serde_json::to_vec(&command.to_wire()) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("Could not serialize {}: {}", command.event_name(), e);
                            continue;
                        }
                    };
                    frame.push(b'\n');
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!("Error writing to controller: {}", e);
                        return SessionEnd::LinkLost;
                    }
                }
                None => {
                    let _ = writer.shutdown().await;
                    return SessionEnd::Shutdown;
                }
            },
        }
    }
}
