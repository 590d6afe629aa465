//! Error types for the aghsync system
//!
//! This module defines all error types used throughout the crate.
//!
//! ## Propagation policy
//!
//! - [`Error::Unreachable`] and [`Error::Protocol`] degrade the device to
//!   `Jammed`; they never reach the host.
//! - [`Error::Unauthorized`] clears the router session and is otherwise
//!   handled like [`Error::Unreachable`].
//! - [`Error::Storage`] is logged and ignored by the scheduler.

use thiserror::Error;

/// Result type alias for aghsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the aghsync system
#[derive(Error, Debug)]
pub enum Error {
    /// Appliance or router could not be reached (network error, timeout)
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// Credentials or session rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Response did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timer persistence failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an unreachable error
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the remote side rejected our credentials or session
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}
