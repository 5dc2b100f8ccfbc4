//! Error types for the Tollgate service.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(e: config::ConfigError) -> Self {
        TollgateError::Config(e.to_string())
    }
}

/// Failures talking to the counter store.
///
/// None of these are surfaced to HTTP clients; limiters and the detector log
/// them and let the request through.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend rejected or failed the command.
    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// The command did not complete within the configured timeout.
    #[error("Counter store call timed out after {0:?}")]
    Timeout(Duration),

    /// The store has been shut down.
    #[error("Counter store is closed")]
    Closed,
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;

/// Result type alias for counter store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
