//! Error types for the ordered store

use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Fjall storage error
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// Filesystem error while opening or persisting
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored key or value was not valid UTF-8
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<std::string::FromUtf8Error> for StoreError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        StoreError::Encoding(e.to_string())
    }
}
