//! Remote query planning, batching and pagination.

use chrono::{DateTime, Utc};
use ddbmetrics_protocol::defaults::{DEFAULT_UNIT, DYNAMODB_NAMESPACE};
use ddbmetrics_protocol::{
    dimensions_for, MetricConfig, MetricDataPoint, Resource, Statistic, TimeWindow,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{GetMetricDataRequest, GetMetricDataResponse, MetricDataQuery, MetricsApi};
use crate::buffer::PageSink;
use crate::config::CollectorConfig;
use crate::error::{ApiError, Result};

/// What a sub-query id maps back to.
#[derive(Debug, Clone)]
pub struct QueryMetadata {
    pub resource: Resource,
    pub metric_name: String,
    pub operation: Option<String>,
    pub operation_type: Option<String>,
    pub statistic: Statistic,
    pub period: u32,
    pub dimensions: BTreeMap<String, String>,
}

/// Sub-queries in planning order plus their reconstruction metadata.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub queries: Vec<MetricDataQuery>,
    pub metadata: HashMap<String, QueryMetadata>,
}

impl QueryPlan {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Turn one response page into data points, in response order.
    ///
    /// Unknown ids and results whose timestamp and value counts differ are
    /// skipped with a warning.
    pub fn points_from(&self, response: &GetMetricDataResponse) -> Vec<MetricDataPoint> {
        let mut points = Vec::new();
        for result in &response.results {
            let Some(meta) = self.metadata.get(&result.id) else {
                warn!(query_id = %result.id, "Unknown query id in response");
                continue;
            };
            if result.timestamps.len() != result.values.len() {
                warn!(
                    query_id = %result.id,
                    timestamps = result.timestamps.len(),
                    values = result.values.len(),
                    "Timestamp/value count mismatch, dropping result"
                );
                continue;
            }
            points.extend(
                result
                    .timestamps
                    .iter()
                    .zip(&result.values)
                    .map(|(ts, value)| meta.data_point(*ts, *value)),
            );
        }
        points
    }
}

impl QueryMetadata {
    fn data_point(&self, timestamp: DateTime<Utc>, value: f64) -> MetricDataPoint {
        MetricDataPoint {
            account_id: self.resource.account_id.clone(),
            table_name: self.resource.table_name.clone(),
            resource_name: self.resource.resource_name.clone(),
            resource_kind: self.resource.kind,
            metric_name: self.metric_name.clone(),
            operation: self.operation.clone(),
            operation_type: self.operation_type.clone(),
            statistic: self.statistic,
            period_seconds: self.period,
            timestamp,
            value,
            unit: DEFAULT_UNIT.to_string(),
            region: self.resource.region.clone(),
            dimensions: self.dimensions.clone(),
        }
    }
}

/// Counters from executing a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub batches: usize,
    pub pages: usize,
    pub points: usize,
}

pub struct BatchQueryPlanner {
    max_queries_per_batch: usize,
    max_datapoints: u32,
    batch_timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
    inter_batch_delay: Duration,
}

impl BatchQueryPlanner {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            max_queries_per_batch: config.max_queries_per_batch.max(1),
            max_datapoints: config.max_datapoints,
            batch_timeout: config.batch_timeout(),
            retry_attempts: config.batch_retry_attempts.max(1),
            retry_delay: config.retry_delay(),
            inter_batch_delay: config.inter_batch_delay(),
        }
    }

    /// Expand resource × metric × statistic × period into named sub-queries.
    pub fn plan(&self, resources: &[Resource], metric_configs: &[MetricConfig]) -> QueryPlan {
        let per_resource: usize = metric_configs.iter().map(MetricConfig::series_count).sum();
        let total = resources.len() * per_resource;
        let mut plan = QueryPlan {
            queries: Vec::with_capacity(total),
            metadata: HashMap::with_capacity(total),
        };
        for resource in resources {
            for config in metric_configs {
                let dimensions = dimensions_for(resource, config);
                for &statistic in &config.statistics {
                    for &period in &config.periods {
                        let id = format!("m{}", plan.queries.len());
                        plan.queries.push(MetricDataQuery {
                            id: id.clone(),
                            namespace: DYNAMODB_NAMESPACE.to_string(),
                            metric_name: config.metric_name.clone(),
                            dimensions: dimensions.clone(),
                            period,
                            stat: statistic,
                        });
                        plan.metadata.insert(
                            id,
                            QueryMetadata {
                                resource: resource.clone(),
                                metric_name: config.metric_name.clone(),
                                operation: config.operation.clone(),
                                operation_type: config.operation_type.clone(),
                                statistic,
                                period,
                                dimensions: dimensions.clone(),
                            },
                        );
                    }
                }
            }
        }
        plan
    }

    /// Queries per batch: 25 up to 50 total, 100 up to 200, else the cap.
    /// Never more than `total`.
    pub fn batch_size(&self, total: usize) -> usize {
        let tier = if total <= 50 {
            25
        } else if total <= 200 {
            100
        } else {
            self.max_queries_per_batch
        };
        tier.min(self.max_queries_per_batch).min(total).max(1)
    }

    /// Run every batch of `plan` over `window`, following continuation
    /// tokens and handing each page to `sink` as it arrives.
    pub async fn execute(
        &self,
        api: &dyn MetricsApi,
        plan: &QueryPlan,
        window: &TimeWindow,
        sink: &dyn PageSink,
    ) -> Result<ExecutionStats> {
        let mut stats = ExecutionStats::default();
        if plan.is_empty() {
            return Ok(stats);
        }

        let size = self.batch_size(plan.len());
        let batch_count = plan.len().div_ceil(size);

        for (index, batch) in plan.queries.chunks(size).enumerate() {
            let mut next_token: Option<String> = None;
            let mut pages = 0;
            let mut batch_points = 0;

            loop {
                let request = GetMetricDataRequest {
                    queries: batch.to_vec(),
                    start_time: window.start,
                    end_time: window.end,
                    next_token: next_token.take(),
                    max_datapoints: self.max_datapoints,
                };
                let response = self.call_with_retry(api, request).await?;
                let points = plan.points_from(&response);
                pages += 1;
                batch_points += points.len();
                if !points.is_empty() {
                    sink.accept(points).await?;
                }

                match response.next_token {
                    Some(token) if !token.is_empty() => next_token = Some(token),
                    _ => break,
                }
            }

            debug!(
                batch = index + 1,
                of = batch_count,
                pages,
                points = batch_points,
                "Batch complete"
            );
            stats.batches += 1;
            stats.pages += pages;
            stats.points += batch_points;

            if index + 1 < batch_count && !self.inter_batch_delay.is_zero() {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }
        Ok(stats)
    }

    /// One remote call with a per-attempt timeout and bounded fixed-delay retry.
    async fn call_with_retry(
        &self,
        api: &dyn MetricsApi,
        request: GetMetricDataRequest,
    ) -> std::result::Result<GetMetricDataResponse, ApiError> {
        let mut attempt = 1;
        loop {
            let outcome =
                match tokio::time::timeout(self.batch_timeout, api.get_metric_data(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ApiError::Timeout(self.batch_timeout)),
                };

            match outcome {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry_attempts => {
                    warn!(attempt, max = self.retry_attempts, error = %e, "Metrics API call failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MetricDataResult;
    use chrono::TimeZone;

    fn planner() -> BatchQueryPlanner {
        BatchQueryPlanner::new(&CollectorConfig::default())
    }

    #[test]
    fn test_batch_size_tiers() {
        let p = planner();
        assert_eq!(p.batch_size(1), 1);
        assert_eq!(p.batch_size(10), 10);
        assert_eq!(p.batch_size(50), 25);
        assert_eq!(p.batch_size(51), 100);
        assert_eq!(p.batch_size(200), 100);
        assert_eq!(p.batch_size(201), 201);
        assert_eq!(p.batch_size(5_000), 500);
    }

    #[test]
    fn test_plan_expands_cross_product() {
        let resources = vec![
            Resource::table("123", "orders", "us-east-1"),
            Resource::gsi("123", "orders", "by_customer", "us-east-1"),
        ];
        let configs = vec![
            MetricConfig::new("ConsumedReadCapacityUnits")
                .with_statistics([Statistic::Sum, Statistic::Maximum])
                .with_periods([60, 300]),
            MetricConfig::new("SuccessfulRequestLatency")
                .with_statistics([Statistic::Average])
                .with_periods([300])
                .with_operation("Query"),
        ];

        let plan = planner().plan(&resources, &configs);
        assert_eq!(plan.len(), 2 * (4 + 1));
        assert_eq!(plan.queries[0].id, "m0");
        assert_eq!(plan.queries[9].id, "m9");

        let gsi_latency = &plan.metadata["m9"];
        assert_eq!(gsi_latency.resource.resource_name, "orders#by_customer");
        assert_eq!(gsi_latency.operation.as_deref(), Some("Query"));
        assert_eq!(
            plan.queries[9].dimensions.get("GlobalSecondaryIndexName").map(String::as_str),
            Some("by_customer")
        );
    }

    #[test]
    fn test_points_from_skips_unknown_and_mismatched() {
        let resources = vec![Resource::table("123", "orders", "us-east-1")];
        let configs = vec![MetricConfig::new("ReadThrottleEvents")
            .with_statistics([Statistic::Sum])
            .with_periods([60, 300])];
        let plan = planner().plan(&resources, &configs);

        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let response = GetMetricDataResponse {
            results: vec![
                MetricDataResult {
                    id: "m0".into(),
                    timestamps: vec![t0, t0 + chrono::Duration::minutes(1)],
                    values: vec![1.0, 2.0],
                },
                MetricDataResult {
                    id: "m1".into(),
                    timestamps: vec![t0],
                    values: vec![],
                },
                MetricDataResult {
                    id: "m42".into(),
                    timestamps: vec![t0],
                    values: vec![1.0],
                },
            ],
            next_token: None,
        };

        let points = plan.points_from(&response);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].period_seconds, 60);
        assert_eq!(points[1].value, 2.0);
        assert_eq!(points[0].unit, "Count");
    }
}
