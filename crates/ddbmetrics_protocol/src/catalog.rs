//! Default DynamoDB metric catalog.

use crate::types::{MetricConfig, Statistic};

const LATENCY_OPERATIONS: &[&str] = &[
    "GetItem",
    "PutItem",
    "Query",
    "Scan",
    "BatchGetItem",
    "BatchWriteItem",
];

/// Capacity, throttling and error metrics collected on every run.
pub fn essential_metrics() -> Vec<MetricConfig> {
    use Statistic::{Average, Maximum, Sum};

    vec![
        MetricConfig::new("ConsumedReadCapacityUnits")
            .with_statistics([Sum, Average, Maximum])
            .with_periods([60, 300]),
        MetricConfig::new("ConsumedWriteCapacityUnits")
            .with_statistics([Sum, Average, Maximum])
            .with_periods([60, 300]),
        MetricConfig::new("ProvisionedReadCapacityUnits")
            .with_statistics([Average])
            .with_periods([300]),
        MetricConfig::new("ProvisionedWriteCapacityUnits")
            .with_statistics([Average])
            .with_periods([300]),
        MetricConfig::new("ReadThrottleEvents")
            .with_statistics([Sum])
            .with_periods([60, 300]),
        MetricConfig::new("WriteThrottleEvents")
            .with_statistics([Sum])
            .with_periods([60, 300]),
        MetricConfig::new("UserErrors")
            .with_statistics([Sum])
            .with_periods([60, 300]),
        MetricConfig::new("SystemErrors")
            .with_statistics([Sum])
            .with_periods([60, 300]),
    ]
}

/// Metric configurations for DynamoDB.
///
/// `comprehensive` adds per-operation latency, conditional check failures and
/// transaction conflicts on top of [`essential_metrics`].
pub fn dynamodb_metrics(comprehensive: bool) -> Vec<MetricConfig> {
    let mut metrics = essential_metrics();
    if !comprehensive {
        return metrics;
    }

    for operation in LATENCY_OPERATIONS {
        metrics.push(
            MetricConfig::new("SuccessfulRequestLatency")
                .with_statistics([Statistic::Average, Statistic::Maximum])
                .with_periods([60, 300])
                .with_operation(*operation),
        );
    }
    metrics.push(
        MetricConfig::new("ConditionalCheckFailedRequests")
            .with_statistics([Statistic::Sum])
            .with_periods([60, 300]),
    );
    metrics.push(
        MetricConfig::new("TransactionConflict")
            .with_statistics([Statistic::Sum])
            .with_periods([60, 300]),
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comprehensive_extends_essential() {
        let essential = dynamodb_metrics(false);
        let comprehensive = dynamodb_metrics(true);
        assert_eq!(essential.len(), 8);
        assert_eq!(comprehensive.len(), essential.len() + LATENCY_OPERATIONS.len() + 2);
        assert_eq!(&comprehensive[..essential.len()], essential.as_slice());
    }

    #[test]
    fn test_latency_configs_carry_operation() {
        let latency: Vec<_> = dynamodb_metrics(true)
            .into_iter()
            .filter(|m| m.metric_name == "SuccessfulRequestLatency")
            .collect();
        assert!(latency.iter().all(|m| m.operation.is_some()));
    }
}
