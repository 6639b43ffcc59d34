//! KV Facade - A resilient key-value client for Redis-compatible stores
//!
//! Provides expiring writes, reads, deletes and a best-effort liveness flag
//! over a single shared connection.
//!
//! ```ignore
//! let facade = FacadeRegistry::global().get_or_connect(&Config::from_env());
//! facade.set("session:42", "alice", 60).await?;
//! assert_eq!(facade.get("session:42").await?.as_deref(), Some("alice"));
//! ```

pub mod adapter;
pub mod clock;
pub mod config;
pub mod error;
pub mod facade;
pub mod monitor;
pub mod registry;
pub mod transport;
pub mod value;


pub use adapter::CommandAdapter;
pub use config::Config;
pub use error::{FacadeError, Result};
pub use facade::KeyValueFacade;
pub use monitor::{ConnectionMonitor, ConnectionStatus, LinkState};
pub use registry::FacadeRegistry;
pub use transport::{ConnectionEvent, MemoryTransport, TcpTransport, Transport};
pub use value::{Expiry, StoredValue};
