use std::sync::Arc;

use chrono::Duration;
use ddbmetrics_collector::MetricBuffer;
use ddbmetrics_protocol::{MetricDataPoint, Statistic};
use ddbmetrics_test_utils::{fixtures, FlakyMetricStore};

/// Five-minute Sum points for `orders`, starting `from` steps after the window end.
fn points(from: i64, count: i64) -> Vec<MetricDataPoint> {
    let orders = fixtures::table("orders");
    (from..from + count)
        .map(|step| MetricDataPoint {
            account_id: orders.account_id.clone(),
            table_name: orders.table_name.clone(),
            resource_name: orders.resource_name.clone(),
            resource_kind: orders.kind,
            metric_name: "ConsumedReadCapacityUnits".into(),
            operation: None,
            operation_type: None,
            statistic: Statistic::Sum,
            period_seconds: 300,
            timestamp: fixtures::window_end() + Duration::minutes(5 * step),
            value: step as f64,
            unit: "Count".into(),
            region: orders.region.clone(),
            dimensions: Default::default(),
        })
        .collect()
}

#[tokio::test]
async fn test_failed_flush_keeps_drained_points_ahead_of_newer_ones() {
    let store = Arc::new(FlakyMetricStore::new());
    let buffer = MetricBuffer::new(store.clone(), 100);
    let first = points(0, 4);
    let newer = points(4, 2);

    buffer.add_and_maybe_flush(first.clone()).await.unwrap();
    store.fail_next_upserts(1);
    assert!(buffer.flush().await.is_err());
    assert_eq!(store.upsert_calls(), 1);
    assert_eq!(store.inner().len(), 0);
    assert_eq!(buffer.snapshot().await, first);

    buffer.add_and_maybe_flush(newer.clone()).await.unwrap();
    let expected: Vec<_> = first.iter().chain(newer.iter()).cloned().collect();
    assert_eq!(buffer.snapshot().await, expected);

    assert_eq!(buffer.flush().await.unwrap(), 6);
    assert!(buffer.is_empty().await);
    assert_eq!(buffer.flushed_total(), 6);
    assert_eq!(store.upsert_calls(), 2);

    assert_eq!(store.inner().points_for("orders"), expected);
}

#[tokio::test]
async fn test_threshold_flush_failure_is_reported_and_retried() {
    let store = Arc::new(FlakyMetricStore::new());
    let buffer = MetricBuffer::new(store.clone(), 4);

    store.fail_next_upserts(1);
    assert!(buffer.add_and_maybe_flush(points(0, 4)).await.is_err());
    assert_eq!(buffer.len().await, 4);

    // restored points count toward the next threshold check
    buffer.add_and_maybe_flush(points(4, 1)).await.unwrap();
    assert!(buffer.is_empty().await);
    assert_eq!(store.inner().len(), 5);
}
