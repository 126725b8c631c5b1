//! Event bus shared by servers and pools.

use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

/// Lifecycle events published by servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ServerStarted { port: u16 },
    ServerStopped { port: u16 },
    ServerFailed { port: u16, reason: String },
}

impl Event {
    pub fn port(&self) -> u16 {
        match self {
            Event::ServerStarted { port }
            | Event::ServerStopped { port }
            | Event::ServerFailed { port, .. } => *port,
        }
    }
}

/// Cloneable handle onto a broadcast channel of [`Event`]s.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: broadcast::Sender<Event>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: Event) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            tracing::trace!(?event, "No event subscribers");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
