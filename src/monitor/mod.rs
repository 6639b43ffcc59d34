//! Connection Monitor Module
//!
//! Best-effort liveness tracking fed by the transport's event stream.
//!
//! # Parts
//! - `ConnectionMonitor`: the atomic liveness flag plus last-error diagnostics
//! - `spawn_monitor_task`: background task draining connection events into the monitor

mod state;
mod task;

pub use state::{ConnectionMonitor, ConnectionStatus, LastError, LinkState};
pub use task::spawn_monitor_task;
