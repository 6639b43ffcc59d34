//! Event Monitor Task
//!
//! Background task that feeds connection events into a `ConnectionMonitor`.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ConnectionMonitor;
use crate::transport::ConnectionEvent;

/// Spawns a task that applies every received event to `monitor`.
///
/// The task ends when the event channel closes (all senders dropped) or when
/// the returned handle is aborted. Lagging behind the channel only loses
/// intermediate events; the next one received still sets the state.
///
/// # Example
/// ```ignore
/// let monitor = Arc::new(ConnectionMonitor::new());
/// let handle = spawn_monitor_task(monitor.clone(), transport.subscribe());
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_monitor_task(
    monitor: Arc<ConnectionMonitor>,
    mut events: broadcast::Receiver<ConnectionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("connection monitor task started");

        loop {
            match events.recv().await {
                Ok(event) => monitor.apply(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("connection monitor lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }

        debug!("connection monitor task finished");
    })
}
