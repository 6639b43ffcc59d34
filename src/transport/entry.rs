//! Stored Entry Module
//!
//! A value held by the in-memory store together with its expiration.

// == Stored Entry ==
/// Represents a single stored value and its expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// The stored value, already in canonical string form
    pub value: String,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates an entry written at `now_ms` that expires `ttl_seconds` later.
    pub fn new(value: String, ttl_seconds: u64, now_ms: u64) -> Self {
        Self {
            value,
            stored_at: now_ms,
            expires_at: now_ms.saturating_add(ttl_seconds.saturating_mul(1000)),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// An entry is expired once the current time reaches its expiration time,
    /// so a key set for `d` seconds is readable for strictly less than `d` seconds.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at.saturating_sub(now_ms)
    }
}
