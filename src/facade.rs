//! Key-Value Facade
//!
//! The surface application code talks to: `get`, `set`, `del` and `is_alive`
//! over one shared transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::info;

use crate::adapter::CommandAdapter;
use crate::config::Config;
use crate::error::Result;
use crate::monitor::{spawn_monitor_task, ConnectionMonitor, ConnectionStatus};
use crate::transport::{ConnectionEvent, TcpTransport, Transport};
use crate::value::StoredValue;

/// Resilient key-value client.
///
/// Owns its transport exclusively. Command outcomes come from their own round
/// trips; the liveness flag is maintained separately from connection events
/// and is advisory only.
pub struct KeyValueFacade {
    transport: Arc<dyn Transport>,
    adapter: CommandAdapter,
    monitor: Arc<ConnectionMonitor>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl KeyValueFacade {
    /// Wraps an existing transport and starts watching its events.
    ///
    /// An event the transport emitted before this call is applied first, so a
    /// fast first connection attempt is never missed. Must be called from
    /// within a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let monitor = Arc::new(ConnectionMonitor::new());
        let (latest, events) = transport.subscribe_with_latest();
        if let Some(event) = latest {
            monitor.apply(&event);
        }
        let monitor_task = spawn_monitor_task(monitor.clone(), events);

        Self {
            adapter: CommandAdapter::new(transport.clone()),
            transport,
            monitor,
            monitor_task: Mutex::new(Some(monitor_task)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Opens a TCP transport to the configured store and wraps it.
    pub fn connect(config: &Config) -> Self {
        info!(addr = %config.addr(), "creating store client");
        Self::new(Arc::new(TcpTransport::connect(config)))
    }

    // == Liveness ==
    /// Last-known connection health. Never blocks.
    pub fn is_alive(&self) -> bool {
        self.monitor.is_alive()
    }

    /// Liveness plus last-error diagnostics.
    pub fn status(&self) -> ConnectionStatus {
        self.monitor.status()
    }

    // == Commands ==
    /// Retrieves the value stored under `key`, or `None` if missing or expired.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.adapter.get(key).await
    }

    /// Stores `value` under `key` for `duration_secs` seconds.
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<StoredValue>,
        duration_secs: i64,
    ) -> Result<()> {
        self.adapter.set(key, value, duration_secs).await
    }

    /// Removes `key`; succeeds whether or not it existed.
    pub async fn del(&self, key: &str) -> Result<()> {
        self.adapter.del(key).await
    }

    // == Shutdown ==
    /// Closes the transport and stops the monitor.
    ///
    /// Only the first call does anything; later and concurrent calls return at once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down store client");
        self.transport.close().await;

        // Let the monitor see the Closed event before stopping it
        self.monitor.apply(&ConnectionEvent::Closed);
        let task = match self.monitor_task.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Returns true once `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for KeyValueFacade {
    fn drop(&mut self) {
        let task = match self.monitor_task.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}
