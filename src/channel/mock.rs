use std::collections::VecDeque;

use log::warn;

use crate::ConsoleError;

use super::{
    Channel, Command, CommandSink, ConnectionState, Handler, Inbound, SubscriptionId,
    Subscriptions, WireMessage,
};

/// An in-memory channel for tests and offline replay.
///
/// MockChannel records every published command and lets the caller queue inbound events,
/// which are delivered on the next `poll()` exactly like the TCP client would deliver them.
/// This enables:
/// - Unit testing the session without a controller on the network
/// - Replaying recorded controller traffic
/// - Simulating link loss and reconnection deterministically
#[derive(Default)]
pub struct MockChannel {
    state: ConnectionState,
    published: Vec<Command>,
    pending: VecDeque<Inbound>,
    subscriptions: Subscriptions,
    connect_calls: usize,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command published so far, oldest first.
    pub fn published(&self) -> &[Command] {
        &self.published
    }

    pub fn take_published(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.published)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls
    }

    pub fn push_inbound(&mut self, event: Inbound) {
        self.pending.push_back(event);
    }

    pub fn push_wire(&mut self, message: WireMessage) -> Result<(), ConsoleError> {
        let event = Inbound::from_wire(message)?;
        self.pending.push_back(event);
        Ok(())
    }

    /// Simulates the transport dropping the connection.
    pub fn drop_link(&mut self) {
        self.pending
            .push_back(Inbound::Connection(ConnectionState::Disconnected));
    }

    /// Simulates a successful automatic reconnection.
    pub fn restore_link(&mut self) {
        self.pending
            .push_back(Inbound::Connection(ConnectionState::Connecting));
        self.pending
            .push_back(Inbound::Connection(ConnectionState::Connected));
    }
}

impl CommandSink for MockChannel {
    fn publish(&mut self, command: Command) {
        self.published.push(command);
    }
}

impl Channel for MockChannel {
    fn connect(&mut self) -> Result<(), ConsoleError> {
        self.connect_calls += 1;
        if self.state == ConnectionState::Disconnected
            && !self
                .pending
                .iter()
                .any(|e| matches!(e, Inbound::Connection(_)))
        {
            self.restore_link();
        }
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
        let mut events = Vec::with_capacity(self.pending.len());
        while let Some(event) = self.pending.pop_front() {
            if let Inbound::Connection(state) = event {
                if state == self.state {
                    continue;
                }
                self.state = state;
            }
            events.push(event);
        }
        for event in &events {
            self.subscriptions.dispatch(event);
        }
        events
    }

    fn close(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Closing mock channel with {} undelivered events",
                self.pending.len()
            );
            self.pending.clear();
        }
        self.state = ConnectionState::Disconnected;
    }
}
