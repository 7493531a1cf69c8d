use chrono::{DateTime, Duration, TimeZone, Utc};
use ddbmetrics_protocol::{MetricDataPoint, MetricKey, Resource, ResourceKind, Statistic};
use ddbmetrics_store::{MemoryMetricStore, MetricStore, SqliteMetricStore};
use std::collections::BTreeMap;
use tempfile::TempDir;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn point(resource: &Resource, metric: &str, stat: Statistic, minutes: i64, value: f64) -> MetricDataPoint {
    let mut dimensions = BTreeMap::new();
    dimensions.insert("TableName".to_string(), resource.table_name.clone());
    MetricDataPoint {
        account_id: resource.account_id.clone(),
        table_name: resource.table_name.clone(),
        resource_name: resource.resource_name.clone(),
        resource_kind: resource.kind,
        metric_name: metric.to_string(),
        operation: None,
        operation_type: None,
        statistic: stat,
        period_seconds: 300,
        timestamp: base() + Duration::minutes(minutes),
        value,
        unit: "Count".to_string(),
        region: resource.region.clone(),
        dimensions,
    }
}

fn window_points(resource: &Resource, from_min: i64, to_min: i64, value: f64) -> Vec<MetricDataPoint> {
    (from_min..to_min)
        .step_by(5)
        .map(|m| point(resource, "ConsumedReadCapacityUnits", Statistic::Sum, m, value))
        .collect()
}

#[tokio::test]
async fn test_sqlite_overlapping_windows_upsert() {
    let store = SqliteMetricStore::in_memory().await.unwrap();
    let orders = Resource::table("123", "orders", "us-east-1");

    // [0, 60) then [30, 90): six points overlap
    store
        .batch_upsert(&window_points(&orders, 0, 60, 1.0))
        .await
        .unwrap();
    store
        .batch_upsert(&window_points(&orders, 30, 90, 2.0))
        .await
        .unwrap();

    assert_eq!(store.count_points().await.unwrap(), 18);

    let key = MetricKey::new("ConsumedReadCapacityUnits", Statistic::Sum, 300);
    let overlapped = store
        .value_at(&orders, &key, base() + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(overlapped, Some(2.0));
    let untouched = store.value_at(&orders, &key, base()).await.unwrap();
    assert_eq!(untouched, Some(1.0));
}

#[tokio::test]
async fn test_sqlite_repeated_batch_is_idempotent() {
    let store = SqliteMetricStore::in_memory().await.unwrap();
    let orders = Resource::table("123", "orders", "us-east-1");
    let batch = window_points(&orders, 0, 60, 3.0);

    store.batch_upsert(&batch).await.unwrap();
    store.batch_upsert(&batch).await.unwrap();
    assert_eq!(store.count_points().await.unwrap(), batch.len() as u64);
}

#[tokio::test]
async fn test_sqlite_latest_per_series() {
    let store = SqliteMetricStore::in_memory().await.unwrap();
    let orders = Resource::table("123", "orders", "us-east-1");
    let other = Resource::gsi("123", "orders", "by_customer", "us-east-1");

    let mut points = window_points(&orders, 0, 60, 1.0);
    points.push(point(&orders, "ConsumedReadCapacityUnits", Statistic::Maximum, 20, 9.0));
    points.push(point(&other, "ConsumedReadCapacityUnits", Statistic::Sum, 500, 1.0));
    store.batch_upsert(&points).await.unwrap();

    let latest = store.latest_timestamps_for(&orders).await.unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(
        latest[&MetricKey::new("ConsumedReadCapacityUnits", Statistic::Sum, 300)],
        base() + Duration::minutes(55)
    );
    assert_eq!(
        latest[&MetricKey::new("ConsumedReadCapacityUnits", Statistic::Maximum, 300)],
        base() + Duration::minutes(20)
    );
}

#[tokio::test]
async fn test_sqlite_summary_by_kind() {
    let store = SqliteMetricStore::in_memory().await.unwrap();
    let table = Resource::table("123", "orders", "us-east-1");
    let gsi = Resource::gsi("123", "orders", "by_customer", "us-east-1");

    let mut points = window_points(&table, 0, 30, 1.0);
    points.extend(window_points(&gsi, 0, 10, 1.0));
    store.batch_upsert(&points).await.unwrap();

    let summary = store.summary().await.unwrap();
    assert_eq!(summary.total_points, 8);
    assert_eq!(summary.total_resources, 2);
    let gsi_row = summary
        .by_kind
        .iter()
        .find(|k| k.resource_kind == ResourceKind::Gsi.as_str())
        .unwrap();
    assert_eq!(gsi_row.points, 2);
    assert_eq!(gsi_row.earliest, Some(base()));
    assert_eq!(gsi_row.latest, Some(base() + Duration::minutes(5)));
}

#[tokio::test]
async fn test_sqlite_file_persists_across_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data").join("metrics.db");
    let orders = Resource::table("123", "orders", "us-east-1");

    {
        let store = SqliteMetricStore::open(&path).await.unwrap();
        store
            .batch_upsert(&window_points(&orders, 0, 15, 1.0))
            .await
            .unwrap();
    }

    let reopened = SqliteMetricStore::open(&path).await.unwrap();
    assert_eq!(reopened.count_points().await.unwrap(), 3);
}

#[tokio::test]
async fn test_memory_store_matches_upsert_semantics() {
    let store = MemoryMetricStore::new();
    let orders = Resource::table("123", "orders", "us-east-1");

    store
        .batch_upsert(&window_points(&orders, 0, 60, 1.0))
        .await
        .unwrap();
    store
        .batch_upsert(&window_points(&orders, 30, 90, 2.0))
        .await
        .unwrap();
    assert_eq!(store.len(), 18);

    let stored = store.points_for("orders");
    assert_eq!(stored.first().map(|p| p.value), Some(1.0));
    assert_eq!(stored.last().map(|p| p.value), Some(2.0));

    let latest = store.latest_timestamps_for(&orders).await.unwrap();
    assert_eq!(
        latest.values().next().copied(),
        Some(base() + Duration::minutes(85))
    );
}

#[tokio::test]
async fn test_same_name_in_two_regions_are_separate_series() {
    let sqlite = SqliteMetricStore::in_memory().await.unwrap();
    let memory = MemoryMetricStore::new();
    let east = Resource::table("123", "orders", "us-east-1");
    let west = Resource::table("123", "orders", "eu-west-1");
    let key = MetricKey::new("ConsumedReadCapacityUnits", Statistic::Sum, 300);

    let stores: [&dyn MetricStore; 2] = [&sqlite, &memory];
    for store in stores {
        store
            .batch_upsert(&window_points(&east, 0, 60, 1.0))
            .await
            .unwrap();
        assert!(store.latest_timestamps_for(&west).await.unwrap().is_empty());

        store
            .batch_upsert(&window_points(&west, 0, 30, 2.0))
            .await
            .unwrap();
        let east_latest = store.latest_timestamps_for(&east).await.unwrap();
        let west_latest = store.latest_timestamps_for(&west).await.unwrap();
        assert_eq!(east_latest[&key], base() + Duration::minutes(55));
        assert_eq!(west_latest[&key], base() + Duration::minutes(25));
    }

    assert_eq!(sqlite.count_points().await.unwrap(), 18);
    assert_eq!(sqlite.value_at(&east, &key, base()).await.unwrap(), Some(1.0));
    assert_eq!(sqlite.value_at(&west, &key, base()).await.unwrap(), Some(2.0));
    assert_eq!(memory.len(), 18);
}
