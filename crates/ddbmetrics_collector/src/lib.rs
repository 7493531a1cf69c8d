//! Batched, incremental, resumable metrics collection.
//!
//! [`StreamingCollector`] drives a run: for every resource it asks the
//! [`GapDetector`] what is missing, the [`BatchQueryPlanner`] fetches it from a
//! [`MetricsApi`] in batches, and pages stream through the [`MetricBuffer`]
//! into the metric store. Progress is checkpointed so an interrupted run can
//! resume where it stopped.

pub mod api;
pub mod buffer;
pub mod cancel;
pub mod collector;
pub mod config;
pub mod error;
pub mod gap;
pub mod planner;

pub use api::{
    GetMetricDataRequest, GetMetricDataResponse, MetricDataQuery, MetricDataResult, MetricsApi,
};
pub use buffer::{MetricBuffer, PageSink};
pub use cancel::CancellationToken;
pub use collector::{trailing_days, CollectionResult, CollectionStatus, StreamingCollector};
pub use config::CollectorConfig;
pub use error::{ApiError, CollectError, Result};
pub use gap::{GapDecision, GapDetector};
pub use planner::{BatchQueryPlanner, ExecutionStats, QueryMetadata, QueryPlan};
