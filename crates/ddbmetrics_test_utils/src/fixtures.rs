//! Shared test fixtures.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ddbmetrics_checkpoint::{CheckpointConfig, CheckpointStore, CollectionRequest};
use ddbmetrics_collector::CollectorConfig;
use ddbmetrics_protocol::{MetricConfig, Resource, Statistic, TimeWindow};
use std::sync::Arc;
use tempfile::TempDir;

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "us-east-1";

/// Fixed, period-aligned window end so generated points are predictable.
pub fn window_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

/// `days` ending at [`window_end`].
pub fn window_days(days: i64) -> TimeWindow {
    TimeWindow::ending_at(window_end(), Duration::days(days)).unwrap()
}

pub fn table(name: &str) -> Resource {
    Resource::table(ACCOUNT, name, REGION)
}

/// `count` tables named `table_000`, `table_001`, ...
pub fn tables(count: usize) -> Vec<Resource> {
    (0..count).map(|i| table(&format!("table_{:03}", i))).collect()
}

/// Two tables and a GSI on the first.
pub fn sample_resources() -> Vec<Resource> {
    vec![
        table("orders"),
        Resource::gsi(ACCOUNT, "orders", "by_customer", REGION),
        table("users"),
    ]
}

/// A single Sum series at 300 seconds.
pub fn sum_300() -> Vec<MetricConfig> {
    vec![MetricConfig::new("ConsumedReadCapacityUnits")
        .with_statistics([Statistic::Sum])
        .with_periods([300])]
}

pub fn request(resources: Vec<Resource>, days: i64) -> CollectionRequest {
    CollectionRequest {
        window: window_days(days),
        resources,
        metric_configs: sum_300(),
    }
}

/// No artificial delays and short timeouts.
pub fn fast_config() -> CollectorConfig {
    CollectorConfig {
        inter_batch_delay_ms: 0,
        batch_retry_delay_ms: 1,
        rate_limit_delay_ms: 0,
        batch_timeout_secs: 5,
        resource_timeout_secs: 10,
        ..CollectorConfig::default()
    }
}

/// Checkpoint store in a fresh temp directory, auto-cleanup off.
pub fn temp_checkpoint_store() -> (TempDir, Arc<CheckpointStore>) {
    let dir = TempDir::new().unwrap();
    let config = CheckpointConfig {
        auto_cleanup: false,
        ..CheckpointConfig::with_dir(dir.path())
    };
    let store = CheckpointStore::open(config).unwrap();
    (dir, Arc::new(store))
}
