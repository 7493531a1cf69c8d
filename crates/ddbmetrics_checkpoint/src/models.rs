//! Checkpoint records: operation state, nested collection progress and listings.

use chrono::{DateTime, Duration, Utc};
use ddbmetrics_protocol::{MetricConfig, Resource, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::schema::CURRENT_SCHEMA_VERSION;

/// Kind of long-running operation tracked by a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Discovery,
    Collection,
    Analysis,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Discovery => "DISCOVERY",
            OperationType::Collection => "COLLECTION",
            OperationType::Analysis => "ANALYSIS",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DISCOVERY" => Ok(OperationType::Discovery),
            "COLLECTION" => Ok(OperationType::Collection),
            "ANALYSIS" => Ok(OperationType::Analysis),
            _ => Err(format!(
                "Invalid operation type: '{}'. Expected: discovery, collection, or analysis",
                s
            )),
        }
    }
}

/// Lifecycle status of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Running => "RUNNING",
            OperationStatus::Paused => "PAUSED",
            OperationStatus::Completed => "COMPLETED",
            OperationStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }

    /// Running or Paused checkpoints are never reaped by retention.
    pub fn is_active(&self) -> bool {
        matches!(self, OperationStatus::Running | OperationStatus::Paused)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RUNNING" => Ok(OperationStatus::Running),
            "PAUSED" => Ok(OperationStatus::Paused),
            "COMPLETED" | "COMPLETE" => Ok(OperationStatus::Completed),
            "FAILED" => Ok(OperationStatus::Failed),
            _ => Err(format!("Invalid operation status: '{}'", s)),
        }
    }
}

/// A resource whose collection failed during a run. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCollection {
    pub resource: String,
    pub region: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// The caller's original collection request, kept so `resume` can replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    pub window: TimeWindow,
    pub resources: Vec<Resource>,
    pub metric_configs: Vec<MetricConfig>,
}

/// Detailed progress for a collection operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionState {
    /// `region:resource_name` keys already processed (succeeded or given up on)
    pub completed_resources: BTreeSet<String>,
    pub failed_collections: Vec<FailedCollection>,
    pub total_operations: u64,
    pub completed_operations: u64,
    /// Coarser counter, never decreases
    pub completed_batches: u64,
    pub start_time: DateTime<Utc>,
}

impl CollectionState {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            completed_resources: BTreeSet::new(),
            failed_collections: Vec::new(),
            total_operations: 0,
            completed_operations: 0,
            completed_batches: 0,
            start_time,
        }
    }

    pub fn is_completed(&self, resource_key: &str) -> bool {
        self.completed_resources.contains(resource_key)
    }

    /// Mark a resource processed. Returns false if it already was.
    pub fn mark_completed(&mut self, resource_key: impl Into<String>) -> bool {
        let inserted = self.completed_resources.insert(resource_key.into());
        if inserted {
            self.completed_operations = (self.completed_operations + 1).min(self.total_operations);
            self.completed_batches += 1;
        }
        inserted
    }

    pub fn record_failure(
        &mut self,
        resource: impl Into<String>,
        region: impl Into<String>,
        error: impl Into<String>,
    ) {
        self.failed_collections.push(FailedCollection {
            resource: resource.into(),
            region: region.into(),
            error: error.into(),
            timestamp: Utc::now(),
        });
    }

    /// Completion percentage derived from the operation counters.
    pub fn completion_percentage(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        ((self.completed_operations * 100) as f64 / self.total_operations as f64).min(100.0)
    }
}

/// Root checkpoint record for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationState {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: DateTime<Utc>,
    pub completion_percentage: f64,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_by: String,
    pub region: Option<String>,
    pub schema_version: String,
    pub collection_state: CollectionState,
    #[serde(default)]
    pub request: Option<CollectionRequest>,
    #[serde(default)]
    pub custom_data: BTreeMap<String, serde_json::Value>,
}

impl OperationState {
    /// Fresh Running state with an empty collection state.
    pub fn new(operation_id: impl Into<String>, operation_type: OperationType) -> Self {
        let now = Utc::now();
        Self {
            operation_id: operation_id.into(),
            operation_type,
            status: OperationStatus::Running,
            start_time: now,
            last_checkpoint_time: now,
            completion_percentage: 0.0,
            estimated_completion: None,
            error_message: None,
            created_by: "system".to_string(),
            region: None,
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            collection_state: CollectionState::new(now),
            request: None,
            custom_data: BTreeMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Re-derive the percentage from the counters and extrapolate an ETA.
    pub fn refresh_progress(&mut self, now: DateTime<Utc>) {
        self.completion_percentage = self.collection_state.completion_percentage();
        self.estimated_completion = estimate_completion(
            self.collection_state.start_time,
            now,
            self.completion_percentage,
        );
    }

    pub fn mark_running(&mut self) {
        self.status = OperationStatus::Running;
        self.error_message = None;
    }

    pub fn mark_paused(&mut self, reason: impl Into<String>) {
        self.status = OperationStatus::Paused;
        self.error_message = Some(reason.into());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = OperationStatus::Failed;
        self.error_message = Some(error.into());
    }

    /// Completed implies every planned operation is accounted for.
    pub fn mark_completed(&mut self) {
        let cs = &mut self.collection_state;
        cs.completed_operations = cs.total_operations;
        self.status = OperationStatus::Completed;
        self.completion_percentage = 100.0;
        self.estimated_completion = Some(Utc::now());
    }
}

/// Linear extrapolation from elapsed time and percentage done.
fn estimate_completion(
    started: DateTime<Utc>,
    now: DateTime<Utc>,
    percentage: f64,
) -> Option<DateTime<Utc>> {
    if percentage <= 0.0 || now <= started {
        return None;
    }
    if percentage >= 100.0 {
        return Some(now);
    }
    let elapsed_ms = (now - started).num_milliseconds() as f64;
    let remaining_ms = elapsed_ms * (100.0 - percentage) / percentage;
    Some(now + Duration::milliseconds(remaining_ms as i64))
}

// ============================================================================
// Listing types
// ============================================================================

/// One row of `list_checkpoints`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointSummary {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub completion_percentage: f64,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub failed_collections: usize,
    pub file_size: u64,
    pub modified_time: DateTime<Utc>,
}

/// Optional filter for `list_checkpoints`.
#[derive(Debug, Clone, Default)]
pub struct CheckpointFilter {
    pub operation_type: Option<OperationType>,
    pub status: Option<OperationStatus>,
}

impl CheckpointFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, operation_type: OperationType) -> Self {
        self.operation_type = Some(operation_type);
        self
    }

    pub fn with_status(mut self, status: OperationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, state: &OperationState) -> bool {
        self.operation_type
            .map_or(true, |wanted| wanted == state.operation_type)
            && self.status.map_or(true, |wanted| wanted == state.status)
    }
}

/// File metadata for a checkpoint, read without decoding it.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointInfo {
    pub operation_id: String,
    pub path: PathBuf,
    pub file_size: u64,
    pub modified_time: DateTime<Utc>,
}

/// Aggregate view over the checkpoint directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckpointStats {
    pub total_checkpoints: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_operation_type: BTreeMap<String, usize>,
    pub total_size_bytes: u64,
    pub oldest_checkpoint: Option<DateTime<Utc>>,
    pub newest_checkpoint: Option<DateTime<Utc>>,
    pub active_operations: usize,
    pub quarantined_files: usize,
}
