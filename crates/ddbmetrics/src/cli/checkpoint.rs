//! `ddbmetrics checkpoint ...`

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use ddbmetrics::output::{
    format_optional_time, format_percentage, format_size, format_time, print_fields,
    print_status_table, print_table,
};
use ddbmetrics::AppConfig;
use ddbmetrics_checkpoint::{CheckpointFilter, OperationStatus, OperationType};
use std::path::PathBuf;
use tracing::info;

use super::open_checkpoints;

#[derive(Subcommand, Debug)]
pub enum CheckpointAction {
    /// List checkpoints, newest first
    List {
        /// Filter by operation type (discovery, collection, analysis)
        #[arg(short = 't', long = "type")]
        operation_type: Option<OperationType>,

        /// Filter by status (running, paused, completed, failed)
        #[arg(short, long)]
        status: Option<OperationStatus>,

        #[arg(long)]
        json: bool,
    },

    /// Show one checkpoint in full
    Show {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Copy a checkpoint to a file
    Export {
        id: String,
        dest: PathBuf,

        /// Write pretty-printed JSON instead of the stored encoding
        #[arg(long)]
        json: bool,

        /// Skip gzip compression
        #[arg(long)]
        no_compress: bool,
    },

    /// Import a checkpoint file as a paused operation
    Import {
        src: PathBuf,

        /// Operation id to import under (default: generated)
        #[arg(long)]
        id: Option<String>,
    },

    Delete {
        id: String,
    },

    /// Remove checkpoints and backups older than the retention window
    Cleanup {
        /// Override the configured retention in days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Restore an operation from its newest quarantined backup
    Recover {
        id: String,
    },

    /// Rewrite uncompressed checkpoints larger than a threshold with gzip
    Compress {
        /// Size threshold in KiB
        #[arg(long, default_value = "64")]
        threshold_kb: u64,
    },

    /// Aggregate statistics for the checkpoint directory
    Stats {
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: CheckpointAction, config: &AppConfig) -> Result<()> {
    let store = open_checkpoints(config)?;

    match action {
        CheckpointAction::List {
            operation_type,
            status,
            json,
        } => {
            let filter = CheckpointFilter {
                operation_type,
                status,
            };
            let checkpoints = store.list_checkpoints(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&checkpoints)?);
                return Ok(());
            }
            if checkpoints.is_empty() {
                println!("No checkpoints in {}", store.dir().display());
                return Ok(());
            }
            let rows = checkpoints
                .into_iter()
                .map(|c| {
                    (
                        c.status,
                        vec![
                            c.operation_id,
                            c.operation_type.to_string(),
                            c.status.to_string(),
                            format_percentage(c.completion_percentage),
                            format_time(c.last_checkpoint_time),
                            c.failed_collections.to_string(),
                            format_size(c.file_size),
                        ],
                    )
                })
                .collect();
            print_status_table(
                &["ID", "TYPE", "STATUS", "DONE", "LAST CHECKPOINT", "FAILED", "SIZE"],
                rows,
                2,
            );
        }

        CheckpointAction::Show { id, json } => {
            let Some(state) = store.load(&id)? else {
                bail!("No readable checkpoint for operation '{}'", id);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
                return Ok(());
            }
            let cs = &state.collection_state;
            let mut fields = vec![
                ("Operation", state.operation_id.clone()),
                ("Type", state.operation_type.to_string()),
                ("Status", state.status.to_string()),
                ("Progress", format_percentage(state.completion_percentage)),
                (
                    "Operations",
                    format!("{}/{}", cs.completed_operations, cs.total_operations),
                ),
                ("Started", format_time(state.start_time)),
                ("Last checkpoint", format_time(state.last_checkpoint_time)),
                ("ETA", format_optional_time(state.estimated_completion)),
                ("Schema", state.schema_version.clone()),
            ];
            if let Some(request) = &state.request {
                fields.push(("Window", request.window.to_string()));
                fields.push(("Resources", request.resources.len().to_string()));
            }
            if let Some(message) = &state.error_message {
                fields.push(("Message", message.clone()));
            }
            print_fields(&fields);

            if !cs.failed_collections.is_empty() {
                println!();
                let rows = cs
                    .failed_collections
                    .iter()
                    .map(|f| {
                        vec![
                            f.resource.clone(),
                            f.region.clone(),
                            f.error.clone(),
                            format_time(f.timestamp),
                        ]
                    })
                    .collect();
                print_table(&["RESOURCE", "REGION", "ERROR", "AT"], rows);
            }
        }

        CheckpointAction::Export {
            id,
            dest,
            json,
            no_compress,
        } => {
            if json {
                store.export_json(&id, &dest)?;
            } else {
                store.export(&id, &dest, !no_compress)?;
            }
            info!(operation_id = %id, dest = %dest.display(), "Checkpoint exported");
            println!("Exported {} to {}", id, dest.display());
        }

        CheckpointAction::Import { src, id } => {
            let state = store
                .import(&src, id.as_deref())
                .with_context(|| format!("Failed to import {}", src.display()))?;
            println!(
                "Imported {} as {} ({})",
                src.display(),
                state.operation_id,
                state.status
            );
        }

        CheckpointAction::Delete { id } => {
            if store.delete(&id)? {
                println!("Deleted {}", id);
            } else {
                println!("No checkpoint for {}", id);
            }
        }

        CheckpointAction::Cleanup { days } => {
            let max_age = match days {
                Some(days) => chrono::Duration::days(i64::from(days)),
                None => config.checkpoint.max_age(),
            };
            let removed = store.cleanup_old_checkpoints(max_age)?;
            println!("Removed {} file(s)", removed);
        }

        CheckpointAction::Recover { id } => {
            let state = store.recover(&id)?;
            println!(
                "Recovered {} at {} ({})",
                state.operation_id,
                format_percentage(state.completion_percentage),
                state.status
            );
        }

        CheckpointAction::Compress { threshold_kb } => {
            let rewritten = store.compress_large(threshold_kb.saturating_mul(1024))?;
            println!("Compressed {} checkpoint(s)", rewritten);
        }

        CheckpointAction::Stats { json } => {
            let stats = store.statistics()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }
            let join = |counts: &std::collections::BTreeMap<String, usize>| {
                counts
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            print_fields(&[
                ("Checkpoints", stats.total_checkpoints.to_string()),
                ("By status", join(&stats.by_status)),
                ("By type", join(&stats.by_operation_type)),
                ("Total size", format_size(stats.total_size_bytes)),
                ("Oldest", format_optional_time(stats.oldest_checkpoint)),
                ("Newest", format_optional_time(stats.newest_checkpoint)),
                ("Active", stats.active_operations.to_string()),
                ("Quarantined", stats.quarantined_files.to_string()),
            ]);
        }
    }
    Ok(())
}
