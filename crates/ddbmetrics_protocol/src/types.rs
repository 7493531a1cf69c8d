//! Core domain types: resources, metric configurations, windows and data points.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::defaults::{
    DIMENSION_GSI_NAME, DIMENSION_OPERATION, DIMENSION_OPERATION_TYPE, DIMENSION_TABLE_NAME,
    GSI_SEPARATOR,
};

/// Errors raised while constructing or parsing protocol values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid time window: start {start} is not before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Unknown statistic: '{0}'")]
    UnknownStatistic(String),

    #[error("Unknown resource kind: '{0}'")]
    UnknownResourceKind(String),
}

// ============================================================================
// Resources
// ============================================================================

/// Kind of resource a metric series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    /// A base table
    Table,
    /// A global secondary index, named `table#index`
    Gsi,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Table => "TABLE",
            ResourceKind::Gsi => "GSI",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TABLE" => Ok(ResourceKind::Table),
            "GSI" | "INDEX" => Ok(ResourceKind::Gsi),
            _ => Err(ProtocolError::UnknownResourceKind(s.to_string())),
        }
    }
}

/// A resource handed to the collector by the discovery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resource {
    pub account_id: String,
    /// Table name, or `table#index` for a GSI
    pub resource_name: String,
    pub table_name: String,
    pub kind: ResourceKind,
    pub region: String,
}

impl Resource {
    pub fn table(
        account_id: impl Into<String>,
        table_name: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let table_name = table_name.into();
        Self {
            account_id: account_id.into(),
            resource_name: table_name.clone(),
            table_name,
            kind: ResourceKind::Table,
            region: region.into(),
        }
    }

    pub fn gsi(
        account_id: impl Into<String>,
        table_name: impl Into<String>,
        index_name: &str,
        region: impl Into<String>,
    ) -> Self {
        let table_name = table_name.into();
        Self {
            account_id: account_id.into(),
            resource_name: format!("{}{}{}", table_name, GSI_SEPARATOR, index_name),
            table_name,
            kind: ResourceKind::Gsi,
            region: region.into(),
        }
    }

    /// Key recorded in a checkpoint's completed set: `region:resource_name`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.region, self.resource_name)
    }

    /// Index name for GSI resources.
    pub fn index_name(&self) -> Option<&str> {
        if self.kind != ResourceKind::Gsi {
            return None;
        }
        self.resource_name
            .split_once(GSI_SEPARATOR)
            .map(|(_, index)| index)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.resource_name, self.kind, self.region)
    }
}

// ============================================================================
// Metric configuration
// ============================================================================

/// CloudWatch statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Statistic {
    Sum,
    Average,
    Maximum,
    Minimum,
    SampleCount,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Sum => "Sum",
            Statistic::Average => "Average",
            Statistic::Maximum => "Maximum",
            Statistic::Minimum => "Minimum",
            Statistic::SampleCount => "SampleCount",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Statistic::Sum),
            "average" | "avg" => Ok(Statistic::Average),
            "maximum" | "max" => Ok(Statistic::Maximum),
            "minimum" | "min" => Ok(Statistic::Minimum),
            "samplecount" => Ok(Statistic::SampleCount),
            _ => Err(ProtocolError::UnknownStatistic(s.to_string())),
        }
    }
}

/// A metric to collect, fanned out over statistics and periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub metric_name: String,
    pub statistics: Vec<Statistic>,
    /// Aggregation periods in seconds
    pub periods: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
}

impl MetricConfig {
    /// Defaults mirror the catalog: Average/Sum/Maximum over 60s and 300s.
    pub fn new(metric_name: impl Into<String>) -> Self {
        Self {
            metric_name: metric_name.into(),
            statistics: vec![Statistic::Average, Statistic::Sum, Statistic::Maximum],
            periods: vec![60, 300],
            operation: None,
            operation_type: None,
        }
    }

    pub fn with_statistics(mut self, statistics: impl Into<Vec<Statistic>>) -> Self {
        self.statistics = statistics.into();
        self
    }

    pub fn with_periods(mut self, periods: impl Into<Vec<u32>>) -> Self {
        self.periods = periods.into();
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.operation_type = Some(operation_type.into());
        self
    }

    /// Number of (statistic, period) series this config produces per resource.
    pub fn series_count(&self) -> usize {
        self.statistics.len() * self.periods.len()
    }
}

/// Largest period across all configs, used as the gap safety margin.
pub fn max_period(configs: &[MetricConfig]) -> Option<u32> {
    configs
        .iter()
        .flat_map(|config| config.periods.iter().copied())
        .max()
}

/// Dimensions identifying a resource/config pair in the remote API.
pub fn dimensions_for(resource: &Resource, config: &MetricConfig) -> BTreeMap<String, String> {
    let mut dimensions = BTreeMap::new();
    dimensions.insert(
        DIMENSION_TABLE_NAME.to_string(),
        resource.table_name.clone(),
    );
    if let Some(index) = resource.index_name() {
        dimensions.insert(DIMENSION_GSI_NAME.to_string(), index.to_string());
    }
    if let Some(operation) = &config.operation {
        dimensions.insert(DIMENSION_OPERATION.to_string(), operation.clone());
    }
    if let Some(operation_type) = &config.operation_type {
        dimensions.insert(DIMENSION_OPERATION_TYPE.to_string(), operation_type.clone());
    }
    dimensions
}

// ============================================================================
// Time window
// ============================================================================

/// Half-open collection window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ProtocolError> {
        if start >= end {
            return Err(ProtocolError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// The trailing `duration` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, duration: Duration) -> Result<Self, ProtocolError> {
        Self::new(end - duration, end)
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Same window with a later start, or `None` when `from` is at/after the end.
    pub fn starting_from(&self, from: DateTime<Utc>) -> Option<Self> {
        let start = from.max(self.start);
        if start >= self.end {
            None
        } else {
            Some(Self {
                start,
                end: self.end,
            })
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} .. {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// ============================================================================
// Data points
// ============================================================================

/// One stored series for a resource: metric name × statistic × period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub metric_name: String,
    pub statistic: Statistic,
    pub period_seconds: u32,
}

impl MetricKey {
    pub fn new(metric_name: impl Into<String>, statistic: Statistic, period_seconds: u32) -> Self {
        Self {
            metric_name: metric_name.into(),
            statistic,
            period_seconds,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.metric_name, self.statistic, self.period_seconds
        )
    }
}

/// Storage identity of a data point. Re-collecting the same identity upserts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricIdentity {
    pub account_id: String,
    pub region: String,
    pub resource_name: String,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub statistic: Statistic,
    pub period_seconds: u32,
}

/// A single collected metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDataPoint {
    pub account_id: String,
    pub table_name: String,
    pub resource_name: String,
    pub resource_kind: ResourceKind,
    pub metric_name: String,
    pub operation: Option<String>,
    pub operation_type: Option<String>,
    pub statistic: Statistic,
    pub period_seconds: u32,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    pub region: String,
    pub dimensions: BTreeMap<String, String>,
}

impl MetricDataPoint {
    pub fn identity(&self) -> MetricIdentity {
        MetricIdentity {
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            resource_name: self.resource_name.clone(),
            metric_name: self.metric_name.clone(),
            timestamp: self.timestamp,
            statistic: self.statistic,
            period_seconds: self.period_seconds,
        }
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.metric_name.clone(), self.statistic, self.period_seconds)
    }
}
