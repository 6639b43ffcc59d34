//! In-Memory Transport
//!
//! An in-process stand-in for the remote store. Holds entries in a HashMap,
//! evaluates expiry against an injectable clock, and lets callers simulate
//! connection events and outages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{ConnectionEvent, EventHub, StoredEntry, Transport};
use crate::clock::{Clock, SystemClock};
use crate::error::{FacadeError, Result};

// == Memory Transport ==
/// Store-in-a-HashMap transport with failure injection.
#[derive(Debug)]
pub struct MemoryTransport {
    /// Key-value storage
    entries: RwLock<HashMap<String, StoredEntry>>,
    /// Time source for expiry checks
    clock: Arc<dyn Clock>,
    /// Connection event fan-out
    events: EventHub,
    /// When set, every command fails as if the link were down
    offline: AtomicBool,
    closed: AtomicBool,
    /// Commands that reached the store
    commands: AtomicU64,
}

impl MemoryTransport {
    // == Constructor ==
    /// Creates an empty store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            events: EventHub::new(),
            offline: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            commands: AtomicU64::new(0),
        }
    }

    // == Simulation Hooks ==
    /// Pushes a connection event to every subscriber.
    pub fn emit(&self, event: ConnectionEvent) {
        self.events.emit(event);
    }

    /// Makes every subsequent command fail (or succeed again) at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of commands that reached the store.
    pub fn commands_issued(&self) -> u64 {
        self.commands.load(Ordering::SeqCst)
    }

    /// Returns true once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn admit(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FacadeError::connection("transport closed"));
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(FacadeError::connection("store unreachable"));
        }
        self.commands.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.admit()?;
        let now = self.clock.now_ms();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: drop it, unless a writer replaced it since the read
        let mut entries = self.entries.write().await;
        if entries.get(key).map_or(false, |entry| entry.is_expired(now)) {
            entries.remove(key);
            debug!(key, "memory store: expired on read");
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, seconds: u64, value: &str) -> Result<()> {
        self.admit()?;
        let entry = StoredEntry::new(value.to_string(), seconds, self.clock.now_ms());
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        self.admit()?;
        let now = self.clock.now_ms();
        let removed = self.entries.write().await.remove(key);
        // An expired entry is already gone from the store's point of view
        Ok(match removed {
            Some(entry) if !entry.is_expired(now) => 1,
            _ => 0,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn subscribe_with_latest(
        &self,
    ) -> (Option<ConnectionEvent>, broadcast::Receiver<ConnectionEvent>) {
        self.events.subscribe_with_latest()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(ConnectionEvent::Closed);
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn store_with_clock() -> (MemoryTransport, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (MemoryTransport::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _) = store_with_clock();
        store.set_ex("key1", 60, "value1").await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let (store, _) = store_with_clock();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry_and_lazy_purge() {
        let (store, clock) = store_with_clock();
        store.set_ex("key1", 2, "value1").await.unwrap();

        clock.advance_secs(1);
        assert!(store.get("key1").await.unwrap().is_some());

        clock.advance_secs(1);
        assert_eq!(store.get("key1").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_shares_the_lock_with_other_readers() {
        let (store, _) = store_with_clock();
        store.set_ex("key1", 60, "value1").await.unwrap();

        let _reader = store.entries.read().await;
        let value = tokio::time::timeout(Duration::from_millis(200), store.get("key1"))
            .await
            .expect("get waited on a concurrent reader");
        assert_eq!(value.unwrap(), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_overwrite_resets_expiry() {
        let (store, clock) = store_with_clock();
        store.set_ex("key1", 2, "v1").await.unwrap();
        clock.advance_secs(1);
        store.set_ex("key1", 5, "v2").await.unwrap();
        clock.advance_secs(3);
        assert_eq!(store.get("key1").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_delete_counts() {
        let (store, clock) = store_with_clock();
        store.set_ex("live", 10, "v").await.unwrap();
        store.set_ex("stale", 1, "v").await.unwrap();
        clock.advance_secs(2);

        assert_eq!(store.del("live").await.unwrap(), 1);
        assert_eq!(store.del("stale").await.unwrap(), 0);
        assert_eq!(store.del("never").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = store_with_clock();
        store.set_ex("short", 1, "v").await.unwrap();
        store.set_ex("long", 10, "v").await.unwrap();
        clock.advance_secs(2);

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_offline_fails_without_counting() {
        let (store, _) = store_with_clock();
        store.set_offline(true);
        let err = store.get("k").await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(store.commands_issued(), 0);

        store.set_offline(false);
        store.get("k").await.unwrap();
        assert_eq!(store.commands_issued(), 1);
    }

    #[tokio::test]
    async fn test_close_emits_once_and_rejects_commands() {
        let (store, _) = store_with_clock();
        let mut events = store.subscribe();

        store.close().await;
        store.close().await;

        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Closed);
        assert!(events.try_recv().is_err());
        assert!(store.is_closed());
        assert!(store.set_ex("k", 1, "v").await.unwrap_err().is_connection());
    }
}
