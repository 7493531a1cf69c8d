//! Per-resource gap detection against what is already stored.

use chrono::{DateTime, Duration, Utc};
use ddbmetrics_protocol::{max_period, MetricConfig, Resource, TimeWindow};
use ddbmetrics_store::MetricStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapDecision {
    /// Collect `[from, window.end)`
    NeedsCollection { from: DateTime<Utc> },
    /// Nothing left to fetch for this window
    UpToDate,
}

impl fmt::Display for GapDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapDecision::NeedsCollection { from } => write!(f, "collect from {}", from),
            GapDecision::UpToDate => write!(f, "up to date"),
        }
    }
}

pub struct GapDetector {
    store: Arc<dyn MetricStore>,
}

impl GapDetector {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Decide what part of `window` still needs collecting for `resource`.
    ///
    /// With no stored data the whole window is needed. Otherwise collection
    /// restarts at the earliest per-series latest timestamp plus the largest
    /// configured period; a restart at or after the window end means the
    /// resource is up to date. A failed lookup falls back to the full window.
    pub async fn detect(
        &self,
        resource: &Resource,
        window: &TimeWindow,
        metric_configs: &[MetricConfig],
    ) -> GapDecision {
        let latest = match self.store.latest_timestamps_for(resource).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(resource = %resource.resource_name, error = %e, "Latest-timestamp lookup failed, collecting full window");
                return GapDecision::NeedsCollection { from: window.start };
            }
        };

        let Some(min_latest) = latest.values().min().copied() else {
            return GapDecision::NeedsCollection { from: window.start };
        };

        let margin = Duration::seconds(i64::from(max_period(metric_configs).unwrap_or(0)));
        let gap_start = min_latest + margin;
        if gap_start >= window.end {
            debug!(resource = %resource.resource_name, latest = %min_latest, "Resource up to date");
            return GapDecision::UpToDate;
        }

        let from = gap_start.max(window.start);
        debug!(resource = %resource.resource_name, from = %from, "Gap detected");
        GapDecision::NeedsCollection { from }
    }

    /// Resources that need a remote call, each with its narrowed window,
    /// plus the number found up to date.
    pub async fn resources_needing_collection(
        &self,
        resources: &[Resource],
        window: &TimeWindow,
        metric_configs: &[MetricConfig],
    ) -> (Vec<(Resource, TimeWindow)>, usize) {
        let mut needed = Vec::new();
        let mut up_to_date = 0;
        for resource in resources {
            match self.detect(resource, window, metric_configs).await {
                GapDecision::NeedsCollection { from } => match window.starting_from(from) {
                    Some(narrowed) => needed.push((resource.clone(), narrowed)),
                    None => up_to_date += 1,
                },
                GapDecision::UpToDate => up_to_date += 1,
            }
        }
        (needed, up_to_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ddbmetrics_protocol::{MetricDataPoint, Statistic};
    use ddbmetrics_store::MemoryMetricStore;

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn stored(resource: &Resource, stat: Statistic, at: DateTime<Utc>) -> MetricDataPoint {
        MetricDataPoint {
            account_id: resource.account_id.clone(),
            table_name: resource.table_name.clone(),
            resource_name: resource.resource_name.clone(),
            resource_kind: resource.kind,
            metric_name: "ConsumedReadCapacityUnits".into(),
            operation: None,
            operation_type: None,
            statistic: stat,
            period_seconds: 300,
            timestamp: at,
            value: 1.0,
            unit: "Count".into(),
            region: resource.region.clone(),
            dimensions: Default::default(),
        }
    }

    fn configs() -> Vec<MetricConfig> {
        vec![MetricConfig::new("ConsumedReadCapacityUnits")
            .with_statistics([Statistic::Sum, Statistic::Maximum])
            .with_periods([60, 300])]
    }

    #[tokio::test]
    async fn test_no_data_needs_full_window() {
        let detector = GapDetector::new(Arc::new(MemoryMetricStore::new()));
        let orders = Resource::table("123", "orders", "us-east-1");
        let window = TimeWindow::new(ts(0, 0), ts(12, 0)).unwrap();
        assert_eq!(
            detector.detect(&orders, &window, &configs()).await,
            GapDecision::NeedsCollection { from: ts(0, 0) }
        );
    }

    #[tokio::test]
    async fn test_restart_from_min_latest_plus_max_period() {
        let store = Arc::new(MemoryMetricStore::new());
        let orders = Resource::table("123", "orders", "us-east-1");
        store
            .batch_upsert(&[
                stored(&orders, Statistic::Sum, ts(10, 0)),
                stored(&orders, Statistic::Maximum, ts(8, 0)),
            ])
            .await
            .unwrap();

        let detector = GapDetector::new(store);
        let window = TimeWindow::new(ts(0, 0), ts(12, 0)).unwrap();
        assert_eq!(
            detector.detect(&orders, &window, &configs()).await,
            GapDecision::NeedsCollection { from: ts(8, 5) }
        );
    }

    #[tokio::test]
    async fn test_up_to_date_at_window_end() {
        let store = Arc::new(MemoryMetricStore::new());
        let orders = Resource::table("123", "orders", "us-east-1");
        store
            .batch_upsert(&[stored(&orders, Statistic::Sum, ts(11, 55))])
            .await
            .unwrap();

        let detector = GapDetector::new(store);
        let window = TimeWindow::new(ts(0, 0), ts(12, 0)).unwrap();
        assert_eq!(
            detector.detect(&orders, &window, &configs()).await,
            GapDecision::UpToDate
        );

        let (needed, skipped) = detector
            .resources_needing_collection(
                &[orders.clone(), Resource::table("123", "users", "us-east-1")],
                &window,
                &configs(),
            )
            .await;
        assert_eq!(skipped, 1);
        assert_eq!(needed.len(), 1);
        assert_eq!(needed[0].0.resource_name, "users");
        assert_eq!(needed[0].1, window);
    }

    #[tokio::test]
    async fn test_stale_data_clamps_to_window_start() {
        let store = Arc::new(MemoryMetricStore::new());
        let orders = Resource::table("123", "orders", "us-east-1");
        store
            .batch_upsert(&[stored(&orders, Statistic::Sum, ts(0, 0))])
            .await
            .unwrap();

        let detector = GapDetector::new(store);
        let window = TimeWindow::new(ts(6, 0), ts(12, 0)).unwrap();
        assert_eq!(
            detector.detect(&orders, &window, &configs()).await,
            GapDecision::NeedsCollection { from: ts(6, 0) }
        );
    }
}
