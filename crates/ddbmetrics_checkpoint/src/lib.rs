//! Durable, versioned checkpoints for long-running operations.
//!
//! One blob per operation id, replaced atomically (temp file + rename).
//! Blobs carry their schema version and are migrated forward on load;
//! anything that cannot be migrated or decoded is renamed aside rather than
//! deleted.

pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod schema;
pub mod store;

pub use config::{CheckpointConfig, IdStyle};
pub use error::{CheckpointError, Result};
pub use models::{
    CheckpointFilter, CheckpointInfo, CheckpointStats, CheckpointSummary, CollectionRequest,
    CollectionState, FailedCollection, OperationState, OperationStatus, OperationType,
};
pub use schema::CURRENT_SCHEMA_VERSION;
pub use store::{CheckpointStore, PERCENTAGE_TOLERANCE};
