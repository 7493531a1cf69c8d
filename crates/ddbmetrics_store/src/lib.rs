//! Metric data point storage.
//!
//! Points are keyed by their identity (account, resource, metric, timestamp,
//! statistic, period). Writing a point whose identity already exists replaces
//! its value, so re-collecting an overlapping window is harmless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddbmetrics_protocol::{MetricDataPoint, MetricKey, Resource};
use std::collections::HashMap;

pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::{Result, StoreError};
pub use memory::MemoryMetricStore;
#[cfg(feature = "sqlite")]
pub use sqlite::{KindSummary, MetricSummary, SqliteMetricStore};

/// Sink for collected metric data points.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Insert or replace `points` as one unit. Returns the number written.
    async fn batch_upsert(&self, points: &[MetricDataPoint]) -> Result<usize>;

    /// Latest stored timestamp per (metric, statistic, period) for `resource`.
    /// Series with no stored points are absent from the map.
    async fn latest_timestamps_for(
        &self,
        resource: &Resource,
    ) -> Result<HashMap<MetricKey, DateTime<Utc>>>;
}
