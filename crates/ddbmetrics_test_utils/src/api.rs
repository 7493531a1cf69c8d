//! Scripted `MetricsApi`.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ddbmetrics_collector::{
    ApiError, GetMetricDataRequest, GetMetricDataResponse, MetricDataResult, MetricsApi,
};
use ddbmetrics_protocol::defaults::DIMENSION_TABLE_NAME;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct Script {
    calls: Vec<GetMetricDataRequest>,
    fail_next: Vec<ApiError>,
    table_failures: HashMap<String, ApiError>,
    table_delays: HashMap<String, Duration>,
    delay: Duration,
    value: f64,
}

/// Answers every sub-query with one point per period step in the window.
///
/// Timestamps are aligned to the query period (epoch based) and fall in
/// `[start, end)`. Responses are paged `points_per_page` timestamps at a time;
/// the continuation token is the next page index.
pub struct ScriptedMetricsApi {
    points_per_page: usize,
    script: Mutex<Script>,
}

impl Default for ScriptedMetricsApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedMetricsApi {
    pub fn new() -> Self {
        Self::with_page_size(usize::MAX)
    }

    pub fn with_page_size(points_per_page: usize) -> Self {
        Self {
            points_per_page: points_per_page.max(1),
            script: Mutex::new(Script {
                value: 1.0,
                ..Script::default()
            }),
        }
    }

    /// Delay applied to every call.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.lock().delay = delay;
        self
    }

    /// Fail the next `n` calls with `err`.
    pub fn fail_next(&self, n: usize, err: ApiError) {
        let mut script = self.lock();
        script.fail_next.extend(std::iter::repeat(err).take(n));
    }

    /// Fail every call that queries `table`.
    pub fn fail_for_table(&self, table: &str, err: ApiError) {
        self.lock().table_failures.insert(table.to_string(), err);
    }

    pub fn clear_failures(&self) {
        let mut script = self.lock();
        script.fail_next.clear();
        script.table_failures.clear();
    }

    /// Extra latency for calls that query `table`.
    pub fn delay_for_table(&self, table: &str, delay: Duration) {
        self.lock().table_delays.insert(table.to_string(), delay);
    }

    /// Value reported for every generated point.
    pub fn set_value(&self, value: f64) {
        self.lock().value = value;
    }

    pub fn calls(&self) -> Vec<GetMetricDataRequest> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Calls whose queries target `table`.
    pub fn calls_for_table(&self, table: &str) -> Vec<GetMetricDataRequest> {
        self.lock()
            .calls
            .iter()
            .filter(|c| tables_in(c).iter().any(|t| t == table))
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn respond(&self, request: &GetMetricDataRequest, value: f64) -> GetMetricDataResponse {
        let page: usize = request
            .next_token
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);

        let mut more = false;
        let results = request
            .queries
            .iter()
            .map(|query| {
                let all = aligned_steps(request.start_time, request.end_time, query.period);
                let from = page.saturating_mul(self.points_per_page).min(all.len());
                let to = from.saturating_add(self.points_per_page).min(all.len());
                more |= to < all.len();
                let timestamps = all[from..to].to_vec();
                MetricDataResult {
                    id: query.id.clone(),
                    values: vec![value; timestamps.len()],
                    timestamps,
                }
            })
            .collect();

        GetMetricDataResponse {
            results,
            next_token: more.then(|| (page + 1).to_string()),
        }
    }
}

#[async_trait]
impl MetricsApi for ScriptedMetricsApi {
    async fn get_metric_data(
        &self,
        request: GetMetricDataRequest,
    ) -> Result<GetMetricDataResponse, ApiError> {
        let tables = tables_in(&request);
        let (delay, failure, value) = {
            let mut script = self.lock();
            script.calls.push(request.clone());
            let extra = tables
                .iter()
                .filter_map(|t| script.table_delays.get(t).copied())
                .max()
                .unwrap_or_default();
            let failure = if script.fail_next.is_empty() {
                tables
                    .iter()
                    .find_map(|t| script.table_failures.get(t).cloned())
            } else {
                Some(script.fail_next.remove(0))
            };
            (script.delay + extra, failure, script.value)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(self.respond(&request, value))
    }
}

fn tables_in(request: &GetMetricDataRequest) -> Vec<String> {
    let mut tables: Vec<String> = request
        .queries
        .iter()
        .filter_map(|q| q.dimensions.get(DIMENSION_TABLE_NAME).cloned())
        .collect();
    tables.sort();
    tables.dedup();
    tables
}

/// Period-aligned timestamps in `[start, end)`.
fn aligned_steps(start: DateTime<Utc>, end: DateTime<Utc>, period: u32) -> Vec<DateTime<Utc>> {
    let period = i64::from(period.max(1));
    let first = start.timestamp().div_euclid(period) * period;
    let first = if first < start.timestamp() {
        first + period
    } else {
        first
    };
    let mut steps = Vec::new();
    let mut ts = first;
    while ts < end.timestamp() {
        if let Some(at) = DateTime::<Utc>::from_timestamp(ts, 0) {
            steps.push(at);
        }
        ts += period;
    }
    steps
}

/// Number of points the scripted API returns per sub-query over a window.
pub fn expected_points(start: DateTime<Utc>, end: DateTime<Utc>, period: u32) -> usize {
    aligned_steps(start, end, period).len()
}

/// The last aligned timestamp the scripted API reports before `end`.
pub fn last_step_before(end: DateTime<Utc>, period: u32) -> DateTime<Utc> {
    end - ChronoDuration::seconds(i64::from(period.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ddbmetrics_collector::MetricDataQuery;
    use ddbmetrics_protocol::Statistic;
    use std::collections::BTreeMap;

    fn request(next_token: Option<String>) -> GetMetricDataRequest {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();
        GetMetricDataRequest {
            queries: vec![MetricDataQuery {
                id: "m0".into(),
                namespace: "AWS/DynamoDB".into(),
                metric_name: "ConsumedReadCapacityUnits".into(),
                dimensions: BTreeMap::from([(DIMENSION_TABLE_NAME.to_string(), "orders".to_string())]),
                period: 300,
                stat: Statistic::Sum,
            }],
            start_time: start,
            end_time: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            next_token,
            max_datapoints: 100,
        }
    }

    #[tokio::test]
    async fn test_pages_aligned_points() {
        let api = ScriptedMetricsApi::with_page_size(5);
        let first = api.get_metric_data(request(None)).await.unwrap();
        assert_eq!(first.results[0].timestamps.len(), 5);
        assert_eq!(
            first.results[0].timestamps[0],
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
        );
        assert_eq!(first.next_token.as_deref(), Some("1"));

        let second = api.get_metric_data(request(first.next_token)).await.unwrap();
        // 00:05 .. 00:55 is eleven steps
        assert_eq!(second.results[0].timestamps.len(), 5);
        let third = api.get_metric_data(request(second.next_token)).await.unwrap();
        assert_eq!(third.results[0].timestamps.len(), 1);
        assert!(third.next_token.is_none());
        assert_eq!(api.call_count(), 3);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let api = ScriptedMetricsApi::new();
        api.fail_next(1, ApiError::Throttled("slow down".into()));
        assert!(api.get_metric_data(request(None)).await.is_err());
        assert!(api.get_metric_data(request(None)).await.is_ok());

        api.fail_for_table("orders", ApiError::Transport("reset".into()));
        assert!(api.get_metric_data(request(None)).await.is_err());
        assert_eq!(api.calls_for_table("orders").len(), 3);
    }
}
