//! Error types for the presence watcher
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for presence watcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the presence watcher
#[derive(Error, Debug)]
pub enum Error {
    /// Guild or member could not be resolved by the presence source
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// Transient failure creating or editing a notification
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The referenced notification message no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// An outbound call did not complete within the configured timeout
    #[error("Timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// Timeout that elapsed
        timeout_ms: u64,
        /// What was being awaited
        context: String,
    },

    /// Credentials rejected during the login handshake (fatal)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Gateway transport or protocol errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),
}

impl Error {
    /// Create a lookup error
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(timeout_ms: u64, context: impl Into<String>) -> Self {
        Self::Timeout {
            timeout_ms,
            context: context.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a gateway error
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error should stop the process instead of being retried
    /// on the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_auth_and_config_only() {
        assert!(Error::auth("bad token").is_fatal());
        assert!(Error::config("missing guild").is_fatal());
        assert!(!Error::lookup("no member").is_fatal());
        assert!(!Error::delivery("503").is_fatal());
        assert!(!Error::not_found("message 1").is_fatal());
        assert!(!Error::timeout(10, "edit").is_fatal());
    }

    #[test]
    fn timeout_display_names_the_call() {
        let err = Error::timeout(10_000, "create_message");
        assert_eq!(err.to_string(), "Timed out after 10000ms: create_message");
    }
}
