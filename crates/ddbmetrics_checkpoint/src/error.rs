//! Error types for the checkpoint store.

use thiserror::Error;

/// Checkpoint operation result type.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint store errors.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Malformed state (bad id, out-of-range percentage, unsupported version)
    #[error("Checkpoint validation failed: {0}")]
    Validation(String),

    /// Structurally valid state whose counters or timestamps contradict each other
    #[error("Checkpoint consistency check failed: {0}")]
    Consistency(String),

    /// A step in the schema migration chain failed
    #[error("Checkpoint migration failed: {0}")]
    Migration(String),

    /// Blob could not be decoded at all
    #[error("Checkpoint is corrupt: {0}")]
    Corrupt(String),

    /// No checkpoint for the operation id
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CheckpointError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    pub fn migration(msg: impl Into<String>) -> Self {
        Self::Migration(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Errors that quarantine the blob with a timestamped `.error_*` suffix.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Consistency(_) | Self::Migration(_)
        )
    }
}
