//! File-backed checkpoint store.
//!
//! Layout inside the checkpoint directory:
//! - `<id>.checkpoint`: current blob for an operation
//! - `<id>.tmp`: in-flight write, renamed over the checkpoint when complete
//! - `<id>.checkpoint.error_<YYYYmmdd_HHMMSS>`: rejected by validation,
//!   consistency or migration
//! - `<id>.checkpoint.corrupted`: could not be decoded at all

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::{CheckpointConfig, IdStyle};
use crate::error::{CheckpointError, Result};
use crate::models::{
    CheckpointFilter, CheckpointInfo, CheckpointStats, CheckpointSummary, OperationState,
    OperationStatus, OperationType,
};
use crate::schema::{self, CURRENT_SCHEMA_VERSION};

const CHECKPOINT_EXT: &str = "checkpoint";
const TMP_EXT: &str = "tmp";
const CORRUPTED_SUFFIX: &str = ".corrupted";
const ERROR_MARKER: &str = ".error_";

/// Allowed gap between the stored percentage and the one derived from counters.
pub const PERCENTAGE_TOLERANCE: f64 = 5.0;

pub struct CheckpointStore {
    config: CheckpointConfig,
    /// Ids saved or loaded through this instance and not yet deleted
    active: Mutex<HashSet<String>>,
    /// Serializes every filesystem mutation in the directory
    file_lock: Mutex<()>,
}

impl CheckpointStore {
    /// Open (creating if needed) the checkpoint directory.
    pub fn open(config: CheckpointConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        let store = Self {
            config,
            active: Mutex::new(HashSet::new()),
            file_lock: Mutex::new(()),
        };
        info!(dir = %store.config.dir.display(), "Checkpoint store opened");
        if store.config.auto_cleanup {
            store.auto_cleanup();
        }
        Ok(store)
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    // ------------------------------------------------------------------
    // Create / save / load
    // ------------------------------------------------------------------

    /// Create and persist a fresh Running operation with a generated id.
    pub fn create(&self, operation_type: OperationType) -> Result<OperationState> {
        let id = self.generate_id(operation_type);
        self.create_with_id(&id, operation_type)
    }

    /// Create and persist a fresh Running operation, replacing any existing
    /// checkpoint with the same id.
    pub fn create_with_id(
        &self,
        operation_id: &str,
        operation_type: OperationType,
    ) -> Result<OperationState> {
        let mut state = OperationState::new(operation_id, operation_type);
        self.save(&mut state)?;
        info!(operation_id = %state.operation_id, operation_type = %operation_type, "Created operation");
        Ok(state)
    }

    /// Validate, stamp and atomically persist `state`.
    ///
    /// On success `schema_version` is current and `last_checkpoint_time` is now.
    pub fn save(&self, state: &mut OperationState) -> Result<()> {
        validate(state)?;
        check_consistency(state, true)?;

        let now = Utc::now();
        state.schema_version = CURRENT_SCHEMA_VERSION.to_string();
        state.last_checkpoint_time = now.max(state.start_time);

        let bytes = codec::encode(state, self.config.enable_compression)?;
        {
            let _guard = self.lock_files();
            self.write_atomic(&state.operation_id, &bytes)?;
        }
        self.register(&state.operation_id);
        debug!(
            operation_id = %state.operation_id,
            status = %state.status,
            completion = state.completion_percentage,
            bytes = bytes.len(),
            "Checkpoint saved"
        );

        if self.config.auto_cleanup {
            self.auto_cleanup();
        }
        Ok(())
    }

    /// Load, migrate and validate a checkpoint.
    ///
    /// Returns `Ok(None)` when there is no checkpoint, and also when the blob
    /// was unusable and has just been quarantined.
    pub fn load(&self, operation_id: &str) -> Result<Option<OperationState>> {
        validate_id(operation_id)?;
        let _guard = self.lock_files();

        let path = self.checkpoint_path(operation_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;

        match decode_state(&bytes) {
            Ok(state) => {
                drop(_guard);
                self.register(&state.operation_id);
                Ok(Some(state))
            }
            Err(err @ (CheckpointError::Io(_) | CheckpointError::NotFound(_))) => Err(err),
            Err(err) => {
                let suffix = quarantine_suffix(&err, Utc::now());
                let target = self.quarantine(&path, &suffix)?;
                warn!(
                    operation_id,
                    error = %err,
                    quarantined = %target.display(),
                    "Checkpoint quarantined"
                );
                Ok(None)
            }
        }
    }

    /// Delete a checkpoint. Returns whether a file was removed.
    pub fn delete(&self, operation_id: &str) -> Result<bool> {
        validate_id(operation_id)?;
        let removed = {
            let _guard = self.lock_files();
            let path = self.checkpoint_path(operation_id);
            if path.exists() {
                fs::remove_file(&path)?;
                true
            } else {
                false
            }
        };
        self.unregister(operation_id);
        if removed {
            info!(operation_id, "Checkpoint deleted");
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Listing and inspection
    // ------------------------------------------------------------------

    /// Checkpoints matching `filter`, newest `last_checkpoint_time` first.
    ///
    /// Unreadable files are skipped; they are quarantined only by `load`.
    pub fn list_checkpoints(&self, filter: &CheckpointFilter) -> Result<Vec<CheckpointSummary>> {
        let _guard = self.lock_files();
        let mut summaries = Vec::new();

        for path in self.files_with_ext(CHECKPOINT_EXT)? {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                    continue;
                }
            };
            let state = match decode_state(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping invalid checkpoint");
                    continue;
                }
            };
            if !filter.matches(&state) {
                continue;
            }
            let metadata = fs::metadata(&path)?;
            summaries.push(CheckpointSummary {
                operation_id: state.operation_id,
                operation_type: state.operation_type,
                status: state.status,
                completion_percentage: state.completion_percentage,
                start_time: state.start_time,
                last_checkpoint_time: state.last_checkpoint_time,
                estimated_completion: state.estimated_completion,
                failed_collections: state.collection_state.failed_collections.len(),
                file_size: metadata.len(),
                modified_time: modified_utc(&metadata),
            });
        }

        summaries.sort_by(|a, b| b.last_checkpoint_time.cmp(&a.last_checkpoint_time));
        Ok(summaries)
    }

    /// Most recent checkpoint, optionally restricted to one operation type.
    pub fn latest_checkpoint(
        &self,
        operation_type: Option<OperationType>,
    ) -> Result<Option<OperationState>> {
        let filter = CheckpointFilter {
            operation_type,
            status: None,
        };
        match self.list_checkpoints(&filter)?.into_iter().next() {
            Some(summary) => self.load(&summary.operation_id),
            None => Ok(None),
        }
    }

    /// File metadata without decoding the blob.
    pub fn checkpoint_info(&self, operation_id: &str) -> Result<CheckpointInfo> {
        validate_id(operation_id)?;
        let path = self.checkpoint_path(operation_id);
        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CheckpointError::not_found(operation_id),
            _ => CheckpointError::Io(e),
        })?;
        Ok(CheckpointInfo {
            operation_id: operation_id.to_string(),
            path,
            file_size: metadata.len(),
            modified_time: modified_utc(&metadata),
        })
    }

    pub fn statistics(&self) -> Result<CheckpointStats> {
        let summaries = self.list_checkpoints(&CheckpointFilter::default())?;
        let mut stats = CheckpointStats {
            total_checkpoints: summaries.len(),
            active_operations: self.active_operations().len(),
            ..CheckpointStats::default()
        };

        for summary in &summaries {
            *stats
                .by_status
                .entry(summary.status.to_string())
                .or_default() += 1;
            *stats
                .by_operation_type
                .entry(summary.operation_type.to_string())
                .or_default() += 1;
            stats.total_size_bytes += summary.file_size;
            stats.oldest_checkpoint = Some(
                stats
                    .oldest_checkpoint
                    .map_or(summary.start_time, |t| t.min(summary.start_time)),
            );
            stats.newest_checkpoint = Some(
                stats
                    .newest_checkpoint
                    .map_or(summary.last_checkpoint_time, |t| {
                        t.max(summary.last_checkpoint_time)
                    }),
            );
        }

        let _guard = self.lock_files();
        stats.quarantined_files = self
            .dir_entries()?
            .iter()
            .filter(|path| is_quarantined(path))
            .count();
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Retention
    // ------------------------------------------------------------------

    /// Delete checkpoints, quarantined blobs and stale temp files whose mtime
    /// is older than `max_age`. Running and Paused operations are kept.
    pub fn cleanup_old_checkpoints(&self, max_age: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;
        let mut removed_ids = Vec::new();
        let mut removed = 0;

        {
            let _guard = self.lock_files();
            let entries = self.dir_entries()?;

            for path in entries.iter().filter(|p| is_quarantined(p) || has_ext(p, TMP_EXT)) {
                if modified_before(path, cutoff)? {
                    fs::remove_file(path)?;
                    debug!(path = %path.display(), "Removed stale backup");
                    removed += 1;
                }
            }

            for path in entries.iter().filter(|p| has_ext(p, CHECKPOINT_EXT)) {
                if !modified_before(path, cutoff)? {
                    continue;
                }
                let state = match fs::read(path)
                    .map_err(CheckpointError::from)
                    .and_then(|bytes| decode_state(&bytes))
                {
                    Ok(state) => state,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Old checkpoint unreadable, leaving for load to quarantine");
                        continue;
                    }
                };
                if state.status.is_active() {
                    debug!(operation_id = %state.operation_id, status = %state.status, "Keeping active operation");
                    continue;
                }
                fs::remove_file(path)?;
                removed_ids.push(state.operation_id);
                removed += 1;
            }
        }

        for id in &removed_ids {
            self.unregister(id);
        }
        if removed > 0 {
            info!(removed, cutoff = %cutoff, "Checkpoint retention sweep");
        }
        Ok(removed)
    }

    fn auto_cleanup(&self) {
        if let Err(e) = self.cleanup_old_checkpoints(self.config.max_age()) {
            warn!(error = %e, "Automatic checkpoint cleanup failed");
        }
    }

    // ------------------------------------------------------------------
    // Export / import / recovery
    // ------------------------------------------------------------------

    /// Write a checkpoint to `dest`, gzip-compressed or as compact JSON.
    pub fn export(&self, operation_id: &str, dest: &Path, compress: bool) -> Result<()> {
        let state = self.require(operation_id)?;
        let bytes = codec::encode(&state, compress)?;
        write_file_atomic(dest, &bytes)?;
        info!(operation_id, dest = %dest.display(), compress, "Checkpoint exported");
        Ok(())
    }

    /// Write a checkpoint to `dest` as pretty JSON.
    pub fn export_json(&self, operation_id: &str, dest: &Path) -> Result<()> {
        let state = self.require(operation_id)?;
        write_file_atomic(dest, &codec::encode_pretty(&state)?)?;
        info!(operation_id, dest = %dest.display(), "Checkpoint exported as JSON");
        Ok(())
    }

    /// Import a checkpoint file written by `export` (any supported version).
    ///
    /// The operation is stored under `new_id`, or a generated id when none is
    /// given. Unless it had completed, it is imported Paused so that it can be
    /// resumed.
    pub fn import(&self, src: &Path, new_id: Option<&str>) -> Result<OperationState> {
        let bytes = fs::read(src)?;
        let mut state = decode_state(&bytes)?;
        let original_id = state.operation_id.clone();

        state.operation_id = match new_id {
            Some(id) => {
                validate_id(id)?;
                id.to_string()
            }
            None => self.generate_id(state.operation_type),
        };
        if state.status != OperationStatus::Completed {
            state.status = OperationStatus::Paused;
        }
        self.save(&mut state)?;
        info!(
            operation_id = %state.operation_id,
            imported_from = %original_id,
            src = %src.display(),
            "Checkpoint imported"
        );
        Ok(state)
    }

    /// Restore an operation from its newest quarantined blob.
    ///
    /// Counters are clamped so the result passes consistency checks, and the
    /// operation is saved Paused with a "Recovered from backup" message. The
    /// quarantined file is left in place.
    pub fn recover(&self, operation_id: &str) -> Result<OperationState> {
        validate_id(operation_id)?;
        let backup = {
            let _guard = self.lock_files();
            self.newest_backup(operation_id)?
        }
        .ok_or_else(|| CheckpointError::not_found(format!("no backup for {}", operation_id)))?;

        let bytes = fs::read(&backup)?;
        let mut state = schema::upgrade(codec::decode(&bytes)?)?;

        state.operation_id = operation_id.to_string();
        if state.last_checkpoint_time < state.start_time {
            state.last_checkpoint_time = state.start_time;
        }
        let cs = &mut state.collection_state;
        cs.completed_operations = cs.completed_operations.min(cs.total_operations);
        if cs.start_time > state.last_checkpoint_time {
            cs.start_time = state.start_time;
        }
        state.refresh_progress(Utc::now());
        state.status = OperationStatus::Paused;
        state.error_message = Some("Recovered from backup".to_string());

        self.save(&mut state)?;
        info!(operation_id, backup = %backup.display(), "Checkpoint recovered");
        Ok(state)
    }

    /// Re-save uncompressed checkpoints larger than `threshold_bytes` with
    /// compression. Returns how many files were rewritten.
    pub fn compress_large(&self, threshold_bytes: u64) -> Result<usize> {
        let _guard = self.lock_files();
        let mut rewritten = 0;

        for path in self.files_with_ext(CHECKPOINT_EXT)? {
            if fs::metadata(&path)?.len() <= threshold_bytes {
                continue;
            }
            let bytes = fs::read(&path)?;
            if codec::is_compressed(&bytes) {
                continue;
            }
            let doc = match codec::decode(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping undecodable checkpoint");
                    continue;
                }
            };
            let packed = codec::encode(&doc, true)?;
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            self.write_atomic(id, &packed)?;
            debug!(path = %path.display(), before = bytes.len(), after = packed.len(), "Compressed checkpoint");
            rewritten += 1;
        }
        Ok(rewritten)
    }

    // ------------------------------------------------------------------
    // Active-operations registry
    // ------------------------------------------------------------------

    pub fn active_operations(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_active().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_registered(&self, operation_id: &str) -> bool {
        self.lock_active().contains(operation_id)
    }

    fn register(&self, operation_id: &str) {
        self.lock_active().insert(operation_id.to_string());
    }

    fn unregister(&self, operation_id: &str) {
        self.lock_active().remove(operation_id);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_files(&self) -> MutexGuard<'_, ()> {
        self.file_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_active(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require(&self, operation_id: &str) -> Result<OperationState> {
        self.load(operation_id)?
            .ok_or_else(|| CheckpointError::not_found(operation_id))
    }

    /// Generate a unique id in the configured style.
    pub fn generate_id(&self, operation_type: OperationType) -> String {
        match self.config.id_style {
            IdStyle::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStyle::Timestamp => {
                let base = format!(
                    "{}_{}",
                    operation_type.as_str().to_lowercase(),
                    Utc::now().format("%Y-%m-%dT%H-%M-%S")
                );
                let taken =
                    |id: &str| self.is_registered(id) || self.checkpoint_path(id).exists();
                if !taken(&base) {
                    return base;
                }
                let mut n = 1;
                loop {
                    let candidate = format!("{}_{}", base, n);
                    if !taken(&candidate) {
                        return candidate;
                    }
                    n += 1;
                }
            }
        }
    }

    fn checkpoint_path(&self, operation_id: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.{}", operation_id, CHECKPOINT_EXT))
    }

    fn tmp_path(&self, operation_id: &str) -> PathBuf {
        self.config.dir.join(format!("{}.{}", operation_id, TMP_EXT))
    }

    /// Caller holds the file lock.
    fn write_atomic(&self, operation_id: &str, bytes: &[u8]) -> Result<()> {
        let tmp = self.tmp_path(operation_id);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.checkpoint_path(operation_id))?;
        Ok(())
    }

    /// Rename `path` aside with `suffix`, never overwriting an earlier backup.
    fn quarantine(&self, path: &Path, suffix: &str) -> Result<PathBuf> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CheckpointError::validation("non-UTF-8 checkpoint file name"))?;
        let mut target = path.with_file_name(format!("{}{}", name, suffix));
        let mut n = 1;
        while target.exists() {
            target = path.with_file_name(format!("{}.{}{}", name, n, suffix));
            n += 1;
        }
        fs::rename(path, &target)?;
        Ok(target)
    }

    fn newest_backup(&self, operation_id: &str) -> Result<Option<PathBuf>> {
        let prefix = format!("{}.{}.", operation_id, CHECKPOINT_EXT);
        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for path in self.dir_entries()? {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&prefix));
            if !matches || !is_quarantined(&path) {
                continue;
            }
            let modified = fs::metadata(&path)?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, path));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    fn dir_entries(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.config.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        Ok(paths)
    }

    fn files_with_ext(&self, ext: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .dir_entries()?
            .into_iter()
            .filter(|p| has_ext(p, ext))
            .collect())
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_id(operation_id: &str) -> Result<()> {
    if operation_id.trim().is_empty() {
        return Err(CheckpointError::validation("operation_id is empty"));
    }
    if operation_id.contains(['/', '\\']) || operation_id.starts_with('.') {
        return Err(CheckpointError::validation(format!(
            "operation_id '{}' is not a valid file name",
            operation_id
        )));
    }
    Ok(())
}

/// Structural checks. Failures quarantine on load and reject on save.
pub fn validate(state: &OperationState) -> Result<()> {
    validate_id(&state.operation_id)?;
    if !(0.0..=100.0).contains(&state.completion_percentage) {
        return Err(CheckpointError::validation(format!(
            "completion_percentage {} outside 0..=100",
            state.completion_percentage
        )));
    }
    if state.start_time > state.last_checkpoint_time {
        return Err(CheckpointError::validation(format!(
            "start_time {} is after last_checkpoint_time {}",
            state.start_time, state.last_checkpoint_time
        )));
    }
    if !schema::is_supported(&state.schema_version) {
        return Err(CheckpointError::validation(format!(
            "unsupported schema version '{}'",
            state.schema_version
        )));
    }
    Ok(())
}

/// Cross-field checks on the nested collection state.
///
/// A percentage drifting from the counters by more than
/// [`PERCENTAGE_TOLERANCE`] is rejected when `strict`, otherwise repaired.
pub fn check_consistency(state: &mut OperationState, strict: bool) -> Result<()> {
    let cs = &state.collection_state;
    if cs.completed_operations > cs.total_operations {
        return Err(CheckpointError::consistency(format!(
            "completed_operations {} exceeds total_operations {}",
            cs.completed_operations, cs.total_operations
        )));
    }
    if cs.start_time > state.last_checkpoint_time {
        return Err(CheckpointError::consistency(format!(
            "collection start_time {} is after last_checkpoint_time {}",
            cs.start_time, state.last_checkpoint_time
        )));
    }
    if cs.total_operations > 0 {
        let derived = cs.completion_percentage();
        let drift = (state.completion_percentage - derived).abs();
        if drift > PERCENTAGE_TOLERANCE {
            if strict {
                return Err(CheckpointError::consistency(format!(
                    "completion_percentage {:.1} disagrees with counters ({:.1})",
                    state.completion_percentage, derived
                )));
            }
            warn!(
                operation_id = %state.operation_id,
                stored = state.completion_percentage,
                derived,
                "Repairing completion percentage"
            );
            state.completion_percentage = derived;
        }
    }
    Ok(())
}

/// Decode, migrate and validate a blob, repairing percentage drift.
fn decode_state(bytes: &[u8]) -> Result<OperationState> {
    let mut state = schema::upgrade(codec::decode(bytes)?)?;
    validate(&state)?;
    check_consistency(&mut state, false)?;
    Ok(state)
}

fn quarantine_suffix(err: &CheckpointError, now: DateTime<Utc>) -> String {
    if err.is_rejection() {
        format!("{}{}", ERROR_MARKER, now.format("%Y%m%d_%H%M%S"))
    } else {
        CORRUPTED_SUFFIX.to_string()
    }
}

// ============================================================================
// File helpers
// ============================================================================

fn write_file_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = dest.with_extension(TMP_EXT);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, dest)?;
    Ok(())
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn is_quarantined(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, |n| n.ends_with(CORRUPTED_SUFFIX) || n.contains(ERROR_MARKER))
}

fn modified_utc(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

fn modified_before(path: &Path, cutoff: DateTime<Utc>) -> Result<bool> {
    Ok(modified_utc(&fs::metadata(path)?) < cutoff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationState;

    #[test]
    fn test_validate_id_rejects_paths() {
        assert!(validate_id("collection_2024-01-01T00-00-00").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../escape").is_err());
        assert!(validate_id("a/b").is_err());
    }

    #[test]
    fn test_validate_percentage_range() {
        let mut state = OperationState::new("op", OperationType::Collection);
        state.completion_percentage = 101.0;
        assert!(matches!(
            validate(&state).unwrap_err(),
            CheckpointError::Validation(_)
        ));
    }

    #[test]
    fn test_consistency_strict_and_repair() {
        let mut state = OperationState::new("op", OperationType::Collection);
        state.collection_state.total_operations = 10;
        state.collection_state.completed_operations = 5;
        state.completion_percentage = 80.0;

        assert!(matches!(
            check_consistency(&mut state, true).unwrap_err(),
            CheckpointError::Consistency(_)
        ));
        check_consistency(&mut state, false).unwrap();
        assert_eq!(state.completion_percentage, 50.0);

        // within tolerance is left alone
        state.completion_percentage = 53.0;
        check_consistency(&mut state, true).unwrap();
        assert_eq!(state.completion_percentage, 53.0);
    }

    #[test]
    fn test_completed_over_total_is_inconsistent() {
        let mut state = OperationState::new("op", OperationType::Collection);
        state.collection_state.total_operations = 1;
        state.collection_state.completed_operations = 2;
        assert!(matches!(
            check_consistency(&mut state, false).unwrap_err(),
            CheckpointError::Consistency(_)
        ));
    }

    #[test]
    fn test_quarantine_suffixes() {
        let now = DateTime::parse_from_rfc3339("2024-03-05T06:07:08Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            quarantine_suffix(&CheckpointError::migration("x"), now),
            ".error_20240305_060708"
        );
        assert_eq!(
            quarantine_suffix(&CheckpointError::corrupt("x"), now),
            ".corrupted"
        );
    }

    #[test]
    fn test_is_quarantined() {
        assert!(is_quarantined(Path::new("a.checkpoint.corrupted")));
        assert!(is_quarantined(Path::new("a.checkpoint.error_20240101_000000")));
        assert!(!is_quarantined(Path::new("a.checkpoint")));
    }
}
