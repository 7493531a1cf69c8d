//! Error types for metric storage.

use thiserror::Error;

/// Metric store result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Metric store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be mapped back to a domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Backend temporarily unable to accept writes
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
