//! Checkpoint schema versions and the forward migration chain.
//!
//! Each historical layout has its own typed struct. A blob is parsed into the
//! struct matching its `schema_version` and then walked through [`MIGRATIONS`]
//! one step at a time until it reaches [`CURRENT_SCHEMA_VERSION`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CheckpointError, Result};
use crate::models::{
    CollectionState, FailedCollection, OperationState, OperationStatus, OperationType,
};

pub const CURRENT_SCHEMA_VERSION: &str = "1.2.0";

/// Blobs without a `schema_version` field predate versioning.
const UNVERSIONED: &str = "1.0.0";

// ============================================================================
// Historical layouts
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionStateV1_0 {
    #[serde(default)]
    pub failed_collections: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub total_operations: u64,
    #[serde(default)]
    pub completed_operations: u64,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationStateV1_0 {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: DateTime<Utc>,
    #[serde(default)]
    pub completion_percentage: f64,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default = "default_created_by")]
    pub created_by: String,
    pub region: Option<String>,
    pub collection_state: Option<CollectionStateV1_0>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionStateV1_1 {
    #[serde(default)]
    pub completed_resources: Vec<String>,
    /// Loose maps with `resource`, `region`, `error` and `timestamp` keys
    #[serde(default)]
    pub failed_collections: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub total_operations: u64,
    #[serde(default)]
    pub completed_operations: u64,
    #[serde(default)]
    pub completed_batches: u64,
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationStateV1_1 {
    pub operation_id: String,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: DateTime<Utc>,
    #[serde(default)]
    pub completion_percentage: f64,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default = "default_created_by")]
    pub created_by: String,
    pub region: Option<String>,
    pub collection_state: Option<CollectionStateV1_1>,
    #[serde(default)]
    pub custom_data: BTreeMap<String, serde_json::Value>,
}

fn default_created_by() -> String {
    "system".to_string()
}

/// A parsed blob tagged with the layout it was written in.
#[derive(Debug, Clone)]
pub enum Versioned {
    V1_0(OperationStateV1_0),
    V1_1(OperationStateV1_1),
    V1_2(OperationState),
}

impl Versioned {
    pub fn version(&self) -> &'static str {
        match self {
            Versioned::V1_0(_) => "1.0.0",
            Versioned::V1_1(_) => "1.1.0",
            Versioned::V1_2(_) => "1.2.0",
        }
    }
}

/// One step of the chain.
pub struct Migration {
    pub from: &'static str,
    pub to: &'static str,
    pub apply: fn(Versioned) -> Result<Versioned>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        from: "1.0.0",
        to: "1.1.0",
        apply: migrate_1_0_to_1_1,
    },
    Migration {
        from: "1.1.0",
        to: "1.2.0",
        apply: migrate_1_1_to_1_2,
    },
];

/// Versions the store can read.
pub fn supported_versions() -> impl Iterator<Item = &'static str> {
    MIGRATIONS
        .iter()
        .map(|m| m.from)
        .chain(std::iter::once(CURRENT_SCHEMA_VERSION))
}

pub fn is_supported(version: &str) -> bool {
    supported_versions().any(|v| v == version)
}

/// Parse an untyped document into the layout named by its `schema_version`.
///
/// Unknown versions are a validation error. A document that does not fit the
/// layout of its declared version is corrupt.
pub fn parse_versioned(doc: serde_json::Value) -> Result<Versioned> {
    let version = match doc.get("schema_version") {
        None | Some(serde_json::Value::Null) => UNVERSIONED.to_string(),
        Some(serde_json::Value::String(v)) => v.clone(),
        Some(other) => {
            return Err(CheckpointError::validation(format!(
                "schema_version must be a string, got {}",
                other
            )))
        }
    };

    let shape_err =
        |e: serde_json::Error| CheckpointError::corrupt(format!("{} layout: {}", version, e));

    match version.as_str() {
        "1.0.0" => serde_json::from_value(doc)
            .map(Versioned::V1_0)
            .map_err(shape_err),
        "1.1.0" => serde_json::from_value(doc)
            .map(Versioned::V1_1)
            .map_err(shape_err),
        CURRENT_SCHEMA_VERSION => serde_json::from_value(doc)
            .map(Versioned::V1_2)
            .map_err(shape_err),
        other => Err(CheckpointError::validation(format!(
            "unsupported schema version '{}'",
            other
        ))),
    }
}

/// Walk a parsed blob up to the current layout.
pub fn migrate(mut versioned: Versioned) -> Result<OperationState> {
    loop {
        if let Versioned::V1_2(mut state) = versioned {
            state.schema_version = CURRENT_SCHEMA_VERSION.to_string();
            return Ok(state);
        }
        let from = versioned.version();
        let step = MIGRATIONS
            .iter()
            .find(|m| m.from == from)
            .ok_or_else(|| CheckpointError::migration(format!("no migration from {}", from)))?;
        tracing::debug!(from = step.from, to = step.to, "Migrating checkpoint");
        versioned = (step.apply)(versioned)?;
    }
}

/// Decode-side convenience: parse then migrate.
pub fn upgrade(doc: serde_json::Value) -> Result<OperationState> {
    migrate(parse_versioned(doc)?)
}

fn migrate_1_0_to_1_1(versioned: Versioned) -> Result<Versioned> {
    let Versioned::V1_0(old) = versioned else {
        return Err(CheckpointError::migration("expected a 1.0.0 checkpoint"));
    };

    let collection_state = old.collection_state.map(|cs| CollectionStateV1_1 {
        completed_resources: Vec::new(),
        failed_collections: cs.failed_collections,
        total_operations: cs.total_operations,
        completed_operations: cs.completed_operations,
        completed_batches: 0,
        start_time: cs.start_time,
    });

    Ok(Versioned::V1_1(OperationStateV1_1 {
        operation_id: old.operation_id,
        operation_type: old.operation_type,
        status: old.status,
        start_time: old.start_time,
        last_checkpoint_time: old.last_checkpoint_time,
        completion_percentage: old.completion_percentage,
        estimated_completion: old.estimated_completion,
        error_message: old.error_message,
        created_by: old.created_by,
        region: old.region,
        collection_state,
        custom_data: BTreeMap::new(),
    }))
}

fn migrate_1_1_to_1_2(versioned: Versioned) -> Result<Versioned> {
    let Versioned::V1_1(old) = versioned else {
        return Err(CheckpointError::migration("expected a 1.1.0 checkpoint"));
    };

    let collection_state = match old.collection_state {
        Some(cs) => {
            let failed_collections = cs
                .failed_collections
                .into_iter()
                .map(|entry| typed_failure(entry, old.start_time))
                .collect::<Result<Vec<_>>>()?;
            CollectionState {
                completed_resources: cs.completed_resources.into_iter().collect::<BTreeSet<_>>(),
                failed_collections,
                total_operations: cs.total_operations,
                completed_operations: cs.completed_operations,
                completed_batches: cs.completed_batches,
                start_time: cs.start_time.unwrap_or(old.start_time),
            }
        }
        None => CollectionState::new(old.start_time),
    };

    Ok(Versioned::V1_2(OperationState {
        operation_id: old.operation_id,
        operation_type: old.operation_type,
        status: old.status,
        start_time: old.start_time,
        last_checkpoint_time: old.last_checkpoint_time,
        completion_percentage: old.completion_percentage,
        estimated_completion: old.estimated_completion,
        error_message: old.error_message,
        created_by: old.created_by,
        region: old.region,
        schema_version: CURRENT_SCHEMA_VERSION.to_string(),
        collection_state,
        request: None,
        custom_data: old.custom_data,
    }))
}

fn typed_failure(
    mut entry: BTreeMap<String, String>,
    fallback_time: DateTime<Utc>,
) -> Result<FailedCollection> {
    let resource = entry
        .remove("resource")
        .ok_or_else(|| CheckpointError::migration("failed collection entry without 'resource'"))?;
    let timestamp = match entry.remove("timestamp") {
        Some(raw) => parse_legacy_timestamp(&raw)?,
        None => fallback_time,
    };
    Ok(FailedCollection {
        resource,
        region: entry.remove("region").unwrap_or_default(),
        error: entry.remove("error").unwrap_or_default(),
        timestamp,
    })
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_legacy_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| CheckpointError::migration(format!("unparseable timestamp '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v1_0_doc() -> serde_json::Value {
        json!({
            "operation_id": "legacy",
            "operation_type": "COLLECTION",
            "status": "PAUSED",
            "start_time": "2024-01-01T00:00:00Z",
            "last_checkpoint_time": "2024-01-01T01:00:00Z",
            "completion_percentage": 50.0,
            "estimated_completion": null,
            "error_message": null,
            "region": "us-east-1",
            "collection_state": {
                "failed_collections": [
                    {"resource": "orders", "region": "us-east-1", "error": "throttled",
                     "timestamp": "2024-01-01T00:30:00"}
                ],
                "total_operations": 4,
                "completed_operations": 2,
                "start_time": "2024-01-01T00:00:00Z"
            }
        })
    }

    #[test]
    fn test_chain_is_contiguous_and_ends_at_current() {
        for pair in MIGRATIONS.windows(2) {
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(MIGRATIONS.last().map(|m| m.to), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_unversioned_blob_migrates_from_1_0() {
        let state = upgrade(v1_0_doc()).unwrap();
        assert_eq!(state.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(state.created_by, "system");
        assert!(state.request.is_none());
        assert!(state.custom_data.is_empty());

        let cs = &state.collection_state;
        assert_eq!(cs.total_operations, 4);
        assert_eq!(cs.completed_operations, 2);
        assert_eq!(cs.completed_batches, 0);
        assert!(cs.completed_resources.is_empty());
        assert_eq!(cs.failed_collections.len(), 1);
        assert_eq!(cs.failed_collections[0].resource, "orders");
        assert_eq!(
            cs.failed_collections[0].timestamp.to_rfc3339(),
            "2024-01-01T00:30:00+00:00"
        );
    }

    #[test]
    fn test_missing_collection_state_gets_fresh_one() {
        let mut doc = v1_0_doc();
        doc["schema_version"] = json!("1.1.0");
        doc["collection_state"] = serde_json::Value::Null;
        let state = upgrade(doc).unwrap();
        assert_eq!(state.collection_state.total_operations, 0);
        assert_eq!(state.collection_state.start_time, state.start_time);
    }

    #[test]
    fn test_unknown_version_is_validation_error() {
        let mut doc = v1_0_doc();
        doc["schema_version"] = json!("9.9.9");
        assert!(matches!(
            upgrade(doc).unwrap_err(),
            CheckpointError::Validation(_)
        ));
    }

    #[test]
    fn test_failure_without_resource_fails_migration() {
        let mut doc = v1_0_doc();
        doc["collection_state"]["failed_collections"] = json!([{"error": "boom"}]);
        assert!(matches!(
            upgrade(doc).unwrap_err(),
            CheckpointError::Migration(_)
        ));
    }

    #[test]
    fn test_bad_legacy_timestamp_fails_migration() {
        let mut doc = v1_0_doc();
        doc["collection_state"]["failed_collections"][0]["timestamp"] = json!("yesterday");
        assert!(matches!(
            upgrade(doc).unwrap_err(),
            CheckpointError::Migration(_)
        ));
    }
}
