//! Remote metrics API boundary.
//!
//! Shapes follow CloudWatch `GetMetricData`: a batch of named sub-queries over
//! one window, answered with per-query timestamp/value lists and an optional
//! continuation token.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddbmetrics_protocol::Statistic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ApiError;

/// One named sub-query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDataQuery {
    /// `m<n>`, unique within a plan
    pub id: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: BTreeMap<String, String>,
    pub period: u32,
    pub stat: Statistic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetMetricDataRequest {
    pub queries: Vec<MetricDataQuery>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub next_token: Option<String>,
    pub max_datapoints: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDataResult {
    pub id: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetMetricDataResponse {
    pub results: Vec<MetricDataResult>,
    pub next_token: Option<String>,
}

/// A remote, rate-limited, paginated metrics source.
///
/// An empty `results` list is a successful answer.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn get_metric_data(
        &self,
        request: GetMetricDataRequest,
    ) -> Result<GetMetricDataResponse, ApiError>;
}
