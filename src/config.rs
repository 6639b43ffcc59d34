//! Configuration Module
//!
//! Handles loading connection settings for the facade from environment variables.

use std::env;
use std::time::Duration;

/// Connection configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Store host name or IP
    pub host: String,
    /// Store port
    pub port: u16,
    /// Upper bound for a single connection attempt
    pub connect_timeout: Option<Duration>,
    /// Upper bound for a single command round trip, None = wait forever
    pub command_timeout: Option<Duration>,
    /// First delay between reconnection attempts
    pub reconnect_base_delay: Duration,
    /// Cap for the exponential reconnection delay
    pub reconnect_max_delay: Duration,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_HOST` - Store host (default: 127.0.0.1)
    /// - `REDIS_PORT` - Store port (default: 6379)
    /// - `REDIS_CONNECT_TIMEOUT_MS` - Connect timeout, 0 disables (default: 5000)
    /// - `REDIS_COMMAND_TIMEOUT_MS` - Command timeout, 0 disables (default: unset)
    /// - `REDIS_RECONNECT_BASE_MS` - First reconnect delay (default: 100)
    /// - `REDIS_RECONNECT_MAX_MS` - Reconnect delay cap (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("REDIS_HOST")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.host),
            port: parse_var("REDIS_PORT").unwrap_or(defaults.port),
            connect_timeout: match parse_var::<u64>("REDIS_CONNECT_TIMEOUT_MS") {
                Some(ms) => millis_or_none(ms),
                None => defaults.connect_timeout,
            },
            command_timeout: parse_var::<u64>("REDIS_COMMAND_TIMEOUT_MS").and_then(millis_or_none),
            reconnect_base_delay: parse_var("REDIS_RECONNECT_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_base_delay),
            reconnect_max_delay: parse_var("REDIS_RECONNECT_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_max_delay),
        }
    }

    /// Returns the `host:port` address of the store.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            connect_timeout: Some(Duration::from_millis(5000)),
            command_timeout: None,
            reconnect_base_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_millis(5000),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn millis_or_none(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}
