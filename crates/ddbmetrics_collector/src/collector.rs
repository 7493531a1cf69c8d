//! Resumable streaming collection.
//!
//! Run lifecycle: resume-or-create the operation, skip resources already
//! completed, then for each remaining resource (bounded concurrency) detect the
//! gap, query the remote API in batches and stream pages into the buffer.
//! Progress is checkpointed every `checkpoint_interval` resources and after
//! failures. The run ends Completed, Paused (cancelled) or Failed (storage or
//! checkpoint error).

use chrono::{DateTime, Utc};
use ddbmetrics_checkpoint::{
    CheckpointStore, CollectionRequest, OperationState, OperationStatus, OperationType,
};
use ddbmetrics_protocol::{Resource, TimeWindow};
use ddbmetrics_store::MetricStore;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::api::MetricsApi;
use crate::buffer::MetricBuffer;
use crate::cancel::CancellationToken;
use crate::config::CollectorConfig;
use crate::error::{CollectError, Result};
use crate::gap::{GapDecision, GapDetector};
use crate::planner::BatchQueryPlanner;

/// Summary of one `collect` run.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionResult {
    pub operation_id: String,
    pub status: OperationStatus,
    /// Points received from the remote API during this run
    pub total_collected: u64,
    /// Resources processed without error, up-to-date ones included
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_up_to_date: usize,
    /// Resources skipped because an earlier run completed them
    pub already_completed: usize,
    pub duration: Duration,
    pub errors_by_type: BTreeMap<String, usize>,
}

/// Progress view of a stored operation.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub operation_id: String,
    pub status: OperationStatus,
    pub completion_percentage: f64,
    pub completed_resources: usize,
    pub total_operations: u64,
    pub completed_operations: u64,
    pub failed_collections: usize,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<&OperationState> for CollectionStatus {
    fn from(state: &OperationState) -> Self {
        let cs = &state.collection_state;
        Self {
            operation_id: state.operation_id.clone(),
            status: state.status,
            completion_percentage: state.completion_percentage,
            completed_resources: cs.completed_resources.len(),
            total_operations: cs.total_operations,
            completed_operations: cs.completed_operations,
            failed_collections: cs.failed_collections.len(),
            start_time: state.start_time,
            last_checkpoint_time: state.last_checkpoint_time,
            estimated_completion: state.estimated_completion,
            error_message: state.error_message.clone(),
        }
    }
}

/// How one resource ended.
enum ResourceOutcome {
    Collected(u64),
    UpToDate,
    /// Not started because the run was cancelled or is shutting down
    NotStarted,
}

struct ResourceReport {
    resource: Resource,
    outcome: Result<ResourceOutcome>,
}

/// Run-scoped counters and the set of completions not yet backed by a
/// successful flush.
#[derive(Default)]
struct RunTally {
    total_collected: u64,
    succeeded: usize,
    failed: usize,
    skipped_up_to_date: usize,
    errors_by_type: BTreeMap<String, usize>,
    since_checkpoint: usize,
    unflushed: Vec<String>,
    fatal: Option<CollectError>,
}

pub struct StreamingCollector {
    checkpoints: Arc<CheckpointStore>,
    store: Arc<dyn MetricStore>,
    api: Arc<dyn MetricsApi>,
    config: CollectorConfig,
    cancel: CancellationToken,
}

impl StreamingCollector {
    pub fn new(
        checkpoints: Arc<CheckpointStore>,
        store: Arc<dyn MetricStore>,
        api: Arc<dyn MetricsApi>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            checkpoints,
            store,
            api,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Share an externally owned stop signal.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that pauses the current run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Collect `request`, creating a new operation or, with `resume`,
    /// continuing the one stored under `operation_id`.
    pub async fn collect(
        &self,
        request: CollectionRequest,
        operation_id: Option<&str>,
        resume: bool,
    ) -> Result<CollectionResult> {
        validate_request(&request)?;
        let started = Instant::now();
        let mut state = self.open_operation(&request, operation_id, resume)?;
        let operation_id = state.operation_id.clone();

        let resources = dedupe(&request.resources);
        let unique = resources.len();
        let already_done: HashSet<String> = state
            .collection_state
            .completed_resources
            .iter()
            .cloned()
            .collect();
        let pending: Vec<Resource> = resources
            .into_iter()
            .filter(|r| !already_done.contains(&r.key()))
            .collect();
        let already_completed = unique - pending.len();

        info!(
            operation_id = %operation_id,
            window = %request.window,
            pending = pending.len(),
            already_completed,
            "Collection started"
        );

        let buffer = MetricBuffer::new(Arc::clone(&self.store), self.config.flush_threshold);
        let detector = GapDetector::new(Arc::clone(&self.store));
        let planner = BatchQueryPlanner::new(&self.config);
        let mut tally = RunTally::default();

        {
            let buffer = &buffer;
            let detector = &detector;
            let planner = &planner;
            let request = &request;
            let halted = &AtomicBool::new(false);

            let mut reports = stream::iter(pending)
                .map(|resource| async move {
                    if self.cancel.is_cancelled() || halted.load(Ordering::SeqCst) {
                        return ResourceReport {
                            resource,
                            outcome: Ok(ResourceOutcome::NotStarted),
                        };
                    }
                    let delay = self.config.rate_limit_delay();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let outcome = match tokio::time::timeout(
                        self.config.resource_timeout(),
                        self.collect_resource(&resource, request, detector, planner, buffer),
                    )
                    .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => Err(CollectError::ResourceTimeout {
                            resource: resource.resource_name.clone(),
                            secs: self.config.resource_timeout_secs,
                        }),
                    };
                    ResourceReport { resource, outcome }
                })
                .buffer_unordered(self.config.max_concurrent_resources.max(1));

            // Reports that finished while a checkpoint was being written.
            let mut held: VecDeque<ResourceReport> = VecDeque::new();

            loop {
                let report = match held.pop_front() {
                    Some(report) => report,
                    None => match reports.next().await {
                        Some(report) => report,
                        None => break,
                    },
                };
                let checkpoint_due = self.record(&mut state, &mut tally, report);
                if tally.fatal.is_some() {
                    halted.store(true, Ordering::SeqCst);
                    continue;
                }
                if !checkpoint_due {
                    continue;
                }

                // Keep in-flight resources moving while the flush and save run;
                // their timeouts are counting.
                let saved = {
                    let save = self.checkpoint(&mut state, &mut tally, buffer);
                    tokio::pin!(save);
                    loop {
                        tokio::select! {
                            saved = &mut save => break saved,
                            Some(report) = reports.next() => held.push_back(report),
                        }
                    }
                };
                if let Err(e) = saved {
                    error!(operation_id = %operation_id, error = %e, "Checkpoint failed");
                    tally.fatal = Some(e);
                    halted.store(true, Ordering::SeqCst);
                }
            }
        }

        if let Some(fatal) = tally.fatal.take() {
            self.fail_run(&mut state, &mut tally, &buffer, &fatal).await;
            return Err(fatal);
        }

        let cancelled = self.cancel.is_cancelled()
            && state.collection_state.completed_operations < unique as u64;
        if let Err(e) = self.checkpoint(&mut state, &mut tally, &buffer).await {
            self.fail_run(&mut state, &mut tally, &buffer, &e).await;
            return Err(e);
        }

        if cancelled {
            state.mark_paused("Cancelled");
            info!(operation_id = %operation_id, completion = state.completion_percentage, "Collection paused");
        } else {
            state.mark_completed();
            info!(
                operation_id = %operation_id,
                collected = tally.total_collected,
                succeeded = tally.succeeded,
                failed = tally.failed,
                "Collection completed"
            );
        }
        self.checkpoints.save(&mut state)?;

        Ok(CollectionResult {
            operation_id,
            status: state.status,
            total_collected: tally.total_collected,
            succeeded: tally.succeeded,
            failed: tally.failed,
            skipped_up_to_date: tally.skipped_up_to_date,
            already_completed,
            duration: started.elapsed(),
            errors_by_type: tally.errors_by_type,
        })
    }

    /// Continue a stored operation with the request it was started with.
    pub async fn resume(&self, operation_id: &str) -> Result<CollectionResult> {
        let state = self
            .checkpoints
            .load(operation_id)?
            .ok_or_else(|| CollectError::NotFound(operation_id.to_string()))?;
        if state.status == OperationStatus::Completed {
            return Err(CollectError::AlreadyCompleted(operation_id.to_string()));
        }
        let request = state.request.clone().ok_or_else(|| {
            CollectError::invalid_request(format!(
                "operation {} has no stored collection request",
                operation_id
            ))
        })?;
        self.collect(request, Some(operation_id), true).await
    }

    pub fn status(&self, operation_id: &str) -> Result<Option<CollectionStatus>> {
        Ok(self
            .checkpoints
            .load(operation_id)?
            .as_ref()
            .map(CollectionStatus::from))
    }

    // ------------------------------------------------------------------

    fn open_operation(
        &self,
        request: &CollectionRequest,
        operation_id: Option<&str>,
        resume: bool,
    ) -> Result<OperationState> {
        let existing = match (operation_id, resume) {
            (Some(id), true) => self.checkpoints.load(id)?,
            _ => None,
        };

        let mut state = match existing {
            Some(state) if state.status == OperationStatus::Completed => {
                return Err(CollectError::AlreadyCompleted(state.operation_id));
            }
            Some(mut state) => {
                info!(
                    operation_id = %state.operation_id,
                    previous_status = %state.status,
                    completed = state.collection_state.completed_resources.len(),
                    "Resuming operation"
                );
                state.mark_running();
                state
            }
            None => {
                if resume {
                    debug!(?operation_id, "Nothing to resume, starting fresh");
                }
                match operation_id {
                    Some(id) => self.checkpoints.create_with_id(id, OperationType::Collection)?,
                    None => self.checkpoints.create(OperationType::Collection)?,
                }
            }
        };

        let cs = &mut state.collection_state;
        cs.total_operations = dedupe(&request.resources).len() as u64;
        cs.completed_operations = cs.completed_operations.min(cs.total_operations);
        state.request = Some(request.clone());
        state.refresh_progress(Utc::now());
        self.checkpoints.save(&mut state)?;
        Ok(state)
    }

    async fn collect_resource(
        &self,
        resource: &Resource,
        request: &CollectionRequest,
        detector: &GapDetector,
        planner: &BatchQueryPlanner,
        buffer: &MetricBuffer,
    ) -> Result<ResourceOutcome> {
        let window = match detector
            .detect(resource, &request.window, &request.metric_configs)
            .await
        {
            GapDecision::UpToDate => return Ok(ResourceOutcome::UpToDate),
            GapDecision::NeedsCollection { from } => match request.window.starting_from(from) {
                Some(window) => window,
                None => return Ok(ResourceOutcome::UpToDate),
            },
        };

        let plan = planner.plan(std::slice::from_ref(resource), &request.metric_configs);
        let stats = planner
            .execute(self.api.as_ref(), &plan, &window, buffer)
            .await?;
        debug!(
            resource = %resource.resource_name,
            window = %window,
            batches = stats.batches,
            pages = stats.pages,
            points = stats.points,
            "Resource collected"
        );
        Ok(ResourceOutcome::Collected(stats.points as u64))
    }

    /// Fold one report into the state. Returns whether a checkpoint is due.
    fn record(
        &self,
        state: &mut OperationState,
        tally: &mut RunTally,
        report: ResourceReport,
    ) -> bool {
        let ResourceReport { resource, outcome } = report;
        let key = resource.key();

        let failed = match outcome {
            Ok(ResourceOutcome::NotStarted) => return false,
            Ok(ResourceOutcome::Collected(points)) => {
                tally.total_collected += points;
                tally.succeeded += 1;
                false
            }
            Ok(ResourceOutcome::UpToDate) => {
                tally.skipped_up_to_date += 1;
                tally.succeeded += 1;
                false
            }
            Err(e) if e.is_fatal() => {
                // Not marked completed: its points may still be buffered.
                *tally.errors_by_type.entry(e.kind().to_string()).or_default() += 1;
                if tally.fatal.is_none() {
                    tally.fatal = Some(e);
                }
                return false;
            }
            Err(e) => {
                warn!(resource = %resource.resource_name, region = %resource.region, error = %e, "Resource collection failed");
                *tally.errors_by_type.entry(e.kind().to_string()).or_default() += 1;
                tally.failed += 1;
                state
                    .collection_state
                    .record_failure(&resource.resource_name, &resource.region, e.to_string());
                true
            }
        };

        if state.collection_state.mark_completed(key.clone()) {
            tally.unflushed.push(key);
        }
        state.refresh_progress(Utc::now());
        tally.since_checkpoint += 1;
        failed || tally.since_checkpoint >= self.config.checkpoint_interval.max(1)
    }

    /// Flush, then persist progress. Completions become durable only here.
    async fn checkpoint(
        &self,
        state: &mut OperationState,
        tally: &mut RunTally,
        buffer: &MetricBuffer,
    ) -> Result<()> {
        buffer.flush().await?;
        tally.unflushed.clear();
        tally.since_checkpoint = 0;
        self.checkpoints.save(state)?;
        debug!(
            operation_id = %state.operation_id,
            completion = state.completion_percentage,
            "Progress checkpointed"
        );
        Ok(())
    }

    /// Final flush attempt, then persist Failed without any completion whose
    /// points did not reach the store.
    async fn fail_run(
        &self,
        state: &mut OperationState,
        tally: &mut RunTally,
        buffer: &MetricBuffer,
        cause: &CollectError,
    ) {
        match buffer.flush().await {
            Ok(_) => tally.unflushed.clear(),
            Err(e) => {
                let buffered = buffer.len().await;
                error!(
                    operation_id = %state.operation_id,
                    buffered,
                    error = %e,
                    "Final flush failed"
                );
            }
        }

        let cs = &mut state.collection_state;
        for key in tally.unflushed.drain(..) {
            if cs.completed_resources.remove(&key) {
                cs.completed_operations = cs.completed_operations.saturating_sub(1);
            }
        }
        state.refresh_progress(Utc::now());
        state.mark_failed(cause.to_string());
        if let Err(e) = self.checkpoints.save(state) {
            error!(operation_id = %state.operation_id, error = %e, "Could not persist failed state");
        }
        error!(operation_id = %state.operation_id, error = %cause, "Collection failed");
    }
}

fn validate_request(request: &CollectionRequest) -> Result<()> {
    if request.window.start >= request.window.end {
        return Err(CollectError::invalid_request(format!(
            "window start {} is not before end {}",
            request.window.start, request.window.end
        )));
    }
    if request.metric_configs.is_empty() {
        return Err(CollectError::invalid_request("no metric configurations"));
    }
    if let Some(config) = request
        .metric_configs
        .iter()
        .find(|c| c.statistics.is_empty() || c.periods.is_empty())
    {
        return Err(CollectError::invalid_request(format!(
            "metric {} has no statistics or periods",
            config.metric_name
        )));
    }
    Ok(())
}

/// First occurrence of each resource key, request order kept.
fn dedupe(resources: &[Resource]) -> Vec<Resource> {
    let mut seen = HashSet::new();
    resources
        .iter()
        .filter(|r| seen.insert(r.key()))
        .cloned()
        .collect()
}

/// Window helper for callers: the trailing `days` ending now.
pub fn trailing_days(days: i64) -> std::result::Result<TimeWindow, ddbmetrics_protocol::ProtocolError> {
    TimeWindow::ending_at(Utc::now(), chrono::Duration::days(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddbmetrics_protocol::MetricConfig;

    #[test]
    fn test_dedupe_keeps_first() {
        let a = Resource::table("1", "orders", "us-east-1");
        let b = Resource::table("1", "orders", "eu-west-1");
        let out = dedupe(&[a.clone(), b.clone(), a.clone()]);
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn test_validate_request_rejects_empty_configs() {
        let request = CollectionRequest {
            window: trailing_days(1).unwrap(),
            resources: vec![],
            metric_configs: vec![],
        };
        assert!(matches!(
            validate_request(&request).unwrap_err(),
            CollectError::InvalidRequest(_)
        ));

        let request = CollectionRequest {
            metric_configs: vec![MetricConfig::new("X").with_periods(Vec::<u32>::new())],
            ..request
        };
        assert!(validate_request(&request).is_err());
    }
}
