//! Canonical default values shared across the collector crates.

/// CloudWatch namespace queried for every DynamoDB metric.
pub const DYNAMODB_NAMESPACE: &str = "AWS/DynamoDB";

/// GetMetricData does not echo units back; stored points use this one.
pub const DEFAULT_UNIT: &str = "Count";

/// Separator between table and index name in a GSI resource name.
pub const GSI_SEPARATOR: char = '#';

pub const DIMENSION_TABLE_NAME: &str = "TableName";
pub const DIMENSION_GSI_NAME: &str = "GlobalSecondaryIndexName";
pub const DIMENSION_OPERATION: &str = "Operation";
pub const DIMENSION_OPERATION_TYPE: &str = "OperationType";

/// Upper bound on datapoints requested per GetMetricData call.
pub const MAX_DATAPOINTS_PER_CALL: u32 = 100_800;

/// Fixed cap on sub-queries per batch once the adaptive tiers are exceeded.
pub const MAX_QUERIES_PER_BATCH: usize = 500;
