//! Error types for backend connections

use thiserror::Error;

/// Error raised by a backend connection or the capability that creates it
#[derive(Error, Debug)]
pub enum SluiceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl SluiceError {
    /// Whether retrying the same operation against the backend can succeed.
    ///
    /// Authentication and configuration failures will not fix themselves.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SluiceError::Connection(_) | SluiceError::Io(_) | SluiceError::Timeout(_)
        )
    }
}

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, SluiceError>;
