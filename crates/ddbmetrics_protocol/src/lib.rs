//! Shared domain types for the ddbmetrics collector.
//!
//! Everything that crosses a crate boundary lives here: resources to collect,
//! metric configurations, the collection window and the data point record that
//! the metric store persists.

pub mod catalog;
pub mod defaults;
pub mod types;

pub use catalog::{dynamodb_metrics, essential_metrics};
pub use types::{
    dimensions_for, max_period, MetricConfig, MetricDataPoint, MetricIdentity, MetricKey,
    ProtocolError, Resource, ResourceKind, Statistic, TimeWindow,
};
