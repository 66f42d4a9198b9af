//! Pool error types

use std::time::Duration;

use sluice_core::SluiceError;
use thiserror::Error;

use crate::pool::ConnectionId;

/// Errors returned by [`ConnectionPool`](crate::ConnectionPool) operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// No connection became available before the deadline
    #[error(
        "Timed out waiting for connection after {waited:?} \
         (max_pool_size: {max_size}, in use: {in_use}, waiting: {waiting})"
    )]
    PoolExhausted {
        waited: Duration,
        max_size: usize,
        in_use: usize,
        waiting: usize,
    },

    /// The pool is shutting down or has shut down
    #[error("Pool is closed")]
    PoolClosed,

    /// The backend refused or failed to establish a connection
    #[error("Failed to create connection after {attempts} attempt(s): {source}")]
    ConnectionCreationFailed {
        attempts: u32,
        #[source]
        source: SluiceError,
    },

    /// A connection was returned to the wrong pool or returned twice
    #[error("Invalid release of connection {id}: {reason}")]
    InvalidRelease { id: ConnectionId, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PoolError {
    /// Whether the caller may reasonably try the same operation again.
    pub fn is_retryable(&self) -> bool {
        match self {
            PoolError::PoolExhausted { .. } => true,
            PoolError::ConnectionCreationFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;
