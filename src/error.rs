//! Error types for the key-value facade
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Facade Error Enum ==
/// Unified error type for the key-value facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FacadeError {
    /// Transport unreachable, protocol failure, timeout, or command rejected by the store
    #[error("Connection error: {0}")]
    Connection(String),

    /// Caller-supplied precondition violated
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl FacadeError {
    /// Shorthand for building a `Connection` error.
    pub fn connection(msg: impl Into<String>) -> Self {
        FacadeError::Connection(msg.into())
    }

    /// Shorthand for building an `InvalidArgument` error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        FacadeError::InvalidArgument(msg.into())
    }

    /// Returns true for transport-level failures.
    pub fn is_connection(&self) -> bool {
        matches!(self, FacadeError::Connection(_))
    }
}

impl From<std::io::Error> for FacadeError {
    fn from(err: std::io::Error) -> Self {
        FacadeError::Connection(format!("io error: {}", err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the facade.
pub type Result<T> = std::result::Result<T, FacadeError>;
