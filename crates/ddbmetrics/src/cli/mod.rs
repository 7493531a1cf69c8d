//! CLI command implementations.

pub mod checkpoint;
pub mod status;
pub mod summary;

use anyhow::{Context, Result};
use ddbmetrics::AppConfig;
use ddbmetrics_checkpoint::CheckpointStore;

/// Open the configured checkpoint store.
pub fn open_checkpoints(config: &AppConfig) -> Result<CheckpointStore> {
    CheckpointStore::open(config.checkpoint.clone()).with_context(|| {
        format!(
            "Failed to open checkpoint directory {}",
            config.checkpoint.dir.display()
        )
    })
}
