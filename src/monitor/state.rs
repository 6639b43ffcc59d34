//! Liveness State
//!
//! Two-state machine (Connected / Disconnected) driven only by connection
//! events. Starts optimistic in `Connected`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::transport::ConnectionEvent;

// == Link State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Most recent connection error, kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of the monitor, suitable for health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: LinkState,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Error events observed since startup
    pub error_count: u64,
}

// == Connection Monitor ==
/// Tracks last-known connection health.
///
/// `is_alive` is a single atomic load and never blocks; the error record sits
/// behind a mutex that only `apply` and the diagnostic getters touch.
#[derive(Debug)]
pub struct ConnectionMonitor {
    alive: AtomicBool,
    errors: AtomicU64,
    last_error: Mutex<Option<LastError>>,
}

impl ConnectionMonitor {
    /// Creates a monitor in the optimistic `Connected` state.
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Returns the cached liveness flag.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn state(&self) -> LinkState {
        if self.is_alive() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    // == Apply Event ==
    /// Feeds one connection event into the state machine.
    pub fn apply(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                let was_alive = self.alive.swap(true, Ordering::AcqRel);
                if !was_alive {
                    info!("store connection restored");
                }
            }
            ConnectionEvent::Error(message) => {
                self.alive.store(false, Ordering::Release);
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("store client failed to connect: {}", message);
                let record = LastError {
                    message: message.clone(),
                    at: Utc::now(),
                };
                match self.last_error.lock() {
                    Ok(mut slot) => *slot = Some(record),
                    Err(poisoned) => *poisoned.into_inner() = Some(record),
                }
            }
            ConnectionEvent::Closed => {
                self.alive.store(false, Ordering::Release);
                info!("store connection closed");
            }
        }
    }

    /// Most recent error, if any was observed.
    pub fn last_error(&self) -> Option<LastError> {
        match self.last_error.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Snapshot of state and diagnostics.
    pub fn status(&self) -> ConnectionStatus {
        let last_error = self.last_error();
        ConnectionStatus {
            state: self.state(),
            last_error: last_error.as_ref().map(|e| e.message.clone()),
            last_error_at: last_error.map(|e| e.at),
            error_count: self.error_count(),
        }
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}
