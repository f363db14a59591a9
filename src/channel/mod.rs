pub mod backoff;
pub mod client;
pub mod mock;
pub mod protocol;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ConsoleError;

pub use client::{ChannelClient, ChannelSettings};
pub use mock::MockChannel;
pub use protocol::{
    CONNECTION_EVENT, ColorName, Command, Direction, FrameKind, HazardKind, HazardSignal,
    HeadDirection, Inbound, StatusReport, WireMessage,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("Connecting..."),
            Self::Connected => f.write_str("Connected"),
            Self::Disconnected => f.write_str("Disconnected"),
        }
    }
}

/// Anything commands can be published to. Publishing is fire-and-forget: it never blocks
/// and never reports transport failures to the caller.
pub trait CommandSink {
    fn publish(&mut self, command: Command);
}

impl CommandSink for Vec<Command> {
    fn publish(&mut self, command: Command) {
        self.push(command);
    }
}

pub type Handler = Box<dyn FnMut(&Inbound)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Client-side registry of event handlers. Handlers live here rather than in the
/// transport, so a reconnection never loses a subscription.
#[derive(Default)]
pub struct Subscriptions {
    handlers: Vec<(SubscriptionId, String, Handler)>,
    next_id: u64,
}

impl Subscriptions {
    pub fn add(&mut self, event: &str, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, event.to_string(), handler));
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _, _)| *handler_id != id);
        self.handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Invokes every matching handler in registration order.
    pub fn dispatch(&mut self, event: &Inbound) {
        for (_, name, handler) in self.handlers.iter_mut() {
            if event.matches(name) {
                handler(event);
            }
        }
    }
}

/// The persistent, bidirectional link to the vehicle controller.
///
/// # Lifecycle
///
/// 1. `connect()` starts the link; calling it again is a no-op
/// 2. `publish()` sends commands whenever the operator or the interlock needs to
/// 3. `poll()` is called from the owning thread to drain inbound events; it dispatches them
///    to subscribers and hands them back so the session can apply them
/// 4. `close()` releases the link
pub trait Channel: CommandSink {
    fn connect(&mut self) -> Result<(), ConsoleError>;

    fn connection_state(&self) -> ConnectionState;

    fn subscribe(&mut self, event: &str, handler: Handler) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    fn poll(&mut self) -> Vec<Inbound>;

    fn close(&mut self) {}
}
