//! Transport Module
//!
//! The connection primitive the facade talks through: three command verbs and
//! a stream of connection-level events.
//!
//! # Implementations
//! - `TcpTransport`: one RESP2 socket to a Redis-compatible server, reconnecting in the background
//! - `MemoryTransport`: in-process store with injectable clock and failure hooks

mod entry;
mod memory;
pub mod resp;
mod tcp;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

pub use entry::StoredEntry;
pub use memory::MemoryTransport;
pub use tcp::TcpTransport;

/// Capacity of every transport's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// == Connection Event ==
/// Connection-level event emitted independently of command replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport established (or re-established) its link.
    Connected,
    /// The link failed; carries a diagnostic message.
    Error(String),
    /// The transport was closed for good.
    Closed,
}

// == Transport Trait ==
/// Capability-typed connection to the store.
///
/// Every method is one independent round trip. Failures surface as
/// `FacadeError::Connection`; implementations never retry a command.
#[async_trait]
pub trait Transport: Send + Sync {
    /// RETRIEVE: returns `None` for missing or expired keys.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// STORE-WITH-EXPIRY: overwrites value and expiry.
    async fn set_ex(&self, key: &str, seconds: u64, value: &str) -> Result<()>;

    /// REMOVE: returns how many keys were removed.
    async fn del(&self, key: &str) -> Result<u64>;

    /// Subscribes to connection events emitted from now on.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Subscribes and also returns the last event emitted before the subscription.
    ///
    /// Lets a late subscriber start from the current link state instead of
    /// waiting for the next transition.
    fn subscribe_with_latest(
        &self,
    ) -> (Option<ConnectionEvent>, broadcast::Receiver<ConnectionEvent>) {
        (None, self.subscribe())
    }

    /// Releases the underlying handle. Calling it again is a no-op.
    async fn close(&self);
}

// == Event Hub ==
/// Event fan-out shared by the transports; remembers the most recent event.
#[derive(Debug)]
struct EventHub {
    sender: broadcast::Sender<ConnectionEvent>,
    latest: Mutex<Option<ConnectionEvent>>,
}

impl EventHub {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sender,
            latest: Mutex::new(None),
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        *latest = Some(event.clone());
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.sender.subscribe()
    }

    /// Taken under the same lock as `emit`, so every event lands in exactly
    /// one of the two halves.
    fn subscribe_with_latest(
        &self,
    ) -> (Option<ConnectionEvent>, broadcast::Receiver<ConnectionEvent>) {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        (latest.clone(), self.sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_subscriber_gets_latest_event_then_stream() {
        let hub = EventHub::new();
        assert_eq!(hub.subscribe_with_latest().0, None);

        hub.emit(ConnectionEvent::Connected);
        hub.emit(ConnectionEvent::Error("reset".to_string()));

        let (latest, mut events) = hub.subscribe_with_latest();
        assert_eq!(latest, Some(ConnectionEvent::Error("reset".to_string())));
        assert!(events.try_recv().is_err());

        hub.emit(ConnectionEvent::Connected);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Connected);
    }
}
