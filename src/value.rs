//! Stored Value Module
//!
//! Typed payloads accepted by `set` and the expiry attached to every write.
//!
//! Values always travel to the store in a canonical string form:
//! - `Text` is sent verbatim
//! - `Integer` is base-10
//! - `Float` uses Rust's `Display` (`1.5`, `2`, `-0.25`)
//! - `Bool` is `true` or `false`
//!
//! Reads return the raw string; callers parse it back if they need a type.

use std::fmt;
use std::time::Duration;

use crate::error::{FacadeError, Result};

// == Stored Value ==
/// A value that can be written to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl StoredValue {
    /// Renders the canonical string sent to the store.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredValue::Text(text) => f.write_str(text),
            StoredValue::Integer(n) => write!(f, "{}", n),
            StoredValue::Float(x) => write!(f, "{}", x),
            StoredValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        StoredValue::Text(value.to_string())
    }
}

impl From<String> for StoredValue {
    fn from(value: String) -> Self {
        StoredValue::Text(value)
    }
}

impl From<&String> for StoredValue {
    fn from(value: &String) -> Self {
        StoredValue::Text(value.clone())
    }
}

impl From<bool> for StoredValue {
    fn from(value: bool) -> Self {
        StoredValue::Bool(value)
    }
}

impl From<f64> for StoredValue {
    fn from(value: f64) -> Self {
        StoredValue::Float(value)
    }
}

impl From<f32> for StoredValue {
    fn from(value: f32) -> Self {
        StoredValue::Float(value as f64)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for StoredValue {
                fn from(value: $ty) -> Self {
                    StoredValue::Integer(value as i64)
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

// == Expiry ==
/// A strictly positive expiration in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expiry(u64);

impl Expiry {
    /// Validates a caller-supplied duration.
    ///
    /// # Errors
    /// Returns `FacadeError::InvalidArgument` when `secs <= 0`.
    pub fn from_secs(secs: i64) -> Result<Self> {
        if secs <= 0 {
            return Err(FacadeError::invalid(format!(
                "duration must be a positive number of seconds, got {}",
                secs
            )));
        }
        Ok(Expiry(secs as u64))
    }

    #[inline]
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}
