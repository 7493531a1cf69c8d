use std::sync::Arc;

use ddbmetrics_collector::{ApiError, BatchQueryPlanner, CollectError, MetricBuffer};
use ddbmetrics_protocol::{MetricConfig, Statistic, TimeWindow};
use ddbmetrics_store::MemoryMetricStore;
use ddbmetrics_test_utils::{fixtures, ScriptedMetricsApi};

fn wide_config(periods: u32) -> Vec<MetricConfig> {
    vec![MetricConfig::new("ConsumedWriteCapacityUnits")
        .with_statistics([Statistic::Sum, Statistic::Maximum])
        .with_periods((1..=periods).map(|n| n * 60).collect::<Vec<_>>())]
}

fn last_hour() -> TimeWindow {
    TimeWindow::ending_at(fixtures::window_end(), chrono::Duration::hours(1)).unwrap()
}

#[tokio::test]
async fn test_fifty_queries_split_into_two_batches() {
    let planner = BatchQueryPlanner::new(&fixtures::fast_config());
    let plan = planner.plan(&[fixtures::table("orders")], &wide_config(25));
    assert_eq!(plan.len(), 50);

    let api = ScriptedMetricsApi::new();
    let store = Arc::new(MemoryMetricStore::new());
    let buffer = MetricBuffer::new(store.clone(), 10_000);

    let stats = planner
        .execute(&api, &plan, &last_hour(), &buffer)
        .await
        .unwrap();

    assert_eq!(stats.batches, 2);
    assert_eq!(stats.pages, 2);
    let calls = api.calls();
    assert!(calls.iter().all(|c| c.queries.len() == 25));
    assert_eq!(calls[1].queries[0].id, "m25");

    // points wait in the buffer until flushed
    assert_eq!(buffer.len().await, stats.points);
    assert!(store.is_empty());
    buffer.flush().await.unwrap();
    assert_eq!(store.len(), stats.points);
}

#[tokio::test]
async fn test_sixty_queries_fit_one_batch() {
    let planner = BatchQueryPlanner::new(&fixtures::fast_config());
    let plan = planner.plan(&[fixtures::table("orders")], &wide_config(30));
    let api = ScriptedMetricsApi::new();
    let buffer = MetricBuffer::new(Arc::new(MemoryMetricStore::new()), 10_000);

    let stats = planner
        .execute(&api, &plan, &last_hour(), &buffer)
        .await
        .unwrap();
    assert_eq!(stats.batches, 1);
    assert_eq!(api.calls()[0].queries.len(), 60);
}

#[tokio::test]
async fn test_retries_exhausted_surface_last_error() {
    let planner = BatchQueryPlanner::new(&fixtures::fast_config());
    let plan = planner.plan(&[fixtures::table("orders")], &fixtures::sum_300());
    let api = ScriptedMetricsApi::new();
    api.fail_next(5, ApiError::Transport("connection reset".into()));
    let buffer = MetricBuffer::new(Arc::new(MemoryMetricStore::new()), 10_000);

    let err = planner
        .execute(&api, &plan, &last_hour(), &buffer)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::Api(ApiError::Transport(_))));
    assert_eq!(api.call_count(), 3);
}
