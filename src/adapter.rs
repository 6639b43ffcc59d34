//! Command Adapter
//!
//! Turns typed facade calls into transport commands. Preconditions are
//! checked here, before anything goes over the wire; everything else is a
//! straight pass-through to the store.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{FacadeError, Result};
use crate::transport::Transport;
use crate::value::{Expiry, StoredValue};

/// Issues GET / SETEX / DEL against a shared transport.
///
/// Calls take `&self` and hold no state across `.await`, so any number of
/// them can be in flight at once; ordering between them is whatever the
/// transport delivers.
#[derive(Clone)]
pub struct CommandAdapter {
    transport: Arc<dyn Transport>,
}

impl CommandAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    // == Get ==
    /// Fetches a value by key.
    ///
    /// Returns `Ok(None)` when the key is missing or expired.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        require_key(key)?;
        debug!(key, "GET");
        self.transport
            .get(key)
            .await
            .inspect_err(|err| warn!(key, "GET failed: {}", err))
    }

    // == Set ==
    /// Stores a value that expires after `duration_secs` seconds.
    ///
    /// Overwrites any existing value and expiry for `key`.
    ///
    /// # Errors
    /// - `InvalidArgument` if `key` is empty or `duration_secs <= 0` (nothing is sent)
    /// - `Connection` if the round trip fails
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<StoredValue>,
        duration_secs: i64,
    ) -> Result<()> {
        require_key(key)?;
        let expiry = Expiry::from_secs(duration_secs)?;
        let wire = value.into().to_wire();
        debug!(key, ttl = expiry.as_secs(), "SETEX");
        self.transport
            .set_ex(key, expiry.as_secs(), &wire)
            .await
            .inspect_err(|err| warn!(key, "SETEX failed: {}", err))
    }

    // == Delete ==
    /// Removes a key. Missing keys are not an error.
    pub async fn del(&self, key: &str) -> Result<()> {
        debug!(key, "DEL");
        let removed = self
            .transport
            .del(key)
            .await
            .inspect_err(|err| warn!(key, "DEL failed: {}", err))?;
        debug!(key, removed, "DEL done");
        Ok(())
    }
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(FacadeError::invalid("key cannot be empty"));
    }
    Ok(())
}
