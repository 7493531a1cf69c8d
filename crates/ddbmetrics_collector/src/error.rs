//! Error types for the collector.

use ddbmetrics_checkpoint::CheckpointError;
use ddbmetrics_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`MetricsApi`](crate::MetricsApi) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Worth retrying at the batch level.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ApiError::InvalidRequest(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Throttled(_) => "Throttled",
            ApiError::Timeout(_) => "ApiTimeout",
            ApiError::Transport(_) => "Transport",
            ApiError::InvalidRequest(_) => "InvalidRequest",
        }
    }
}

/// Collector operation result type.
pub type Result<T> = std::result::Result<T, CollectError>;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Metric store write failed; unflushed points are still buffered
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Metrics API error: {0}")]
    Api(#[from] ApiError),

    #[error("Operation {0} already completed")]
    AlreadyCompleted(String),

    #[error("Operation not found: {0}")]
    NotFound(String),

    #[error("Invalid collection request: {0}")]
    InvalidRequest(String),

    #[error("Resource {resource} timed out after {secs} seconds")]
    ResourceTimeout { resource: String, secs: u64 },
}

impl CollectError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Key used in `CollectionResult::errors_by_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectError::Checkpoint(_) => "CheckpointError",
            CollectError::Storage(_) => "StorageError",
            CollectError::Api(api) => api.kind(),
            CollectError::AlreadyCompleted(_) => "AlreadyCompleted",
            CollectError::NotFound(_) => "NotFound",
            CollectError::InvalidRequest(_) => "InvalidRequest",
            CollectError::ResourceTimeout { .. } => "TimeoutError",
        }
    }

    /// Errors that end the whole run rather than a single resource.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CollectError::Checkpoint(_) | CollectError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Throttled("slow down".into()).is_transient());
        assert!(ApiError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(!ApiError::InvalidRequest("bad dims".into()).is_transient());
    }

    #[test]
    fn test_fatal_and_kind() {
        let storage = CollectError::from(StoreError::unavailable("disk full"));
        assert!(storage.is_fatal());
        assert_eq!(storage.kind(), "StorageError");

        let timeout = CollectError::ResourceTimeout {
            resource: "orders".into(),
            secs: 45,
        };
        assert!(!timeout.is_fatal());
        assert_eq!(timeout.kind(), "TimeoutError");
        assert_eq!(
            CollectError::from(ApiError::Throttled("x".into())).kind(),
            "Throttled"
        );
    }
}
