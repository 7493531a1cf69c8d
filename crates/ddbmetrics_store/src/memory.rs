use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddbmetrics_protocol::{MetricDataPoint, MetricIdentity, MetricKey, Resource};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::MetricStore;

/// In-process store with the same upsert semantics as the SQLite one.
#[derive(Default)]
pub struct MemoryMetricStore {
    points: Mutex<HashMap<MetricIdentity, MetricDataPoint>>,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stored points for one resource, oldest first.
    pub fn points_for(&self, resource_name: &str) -> Vec<MetricDataPoint> {
        let mut points: Vec<MetricDataPoint> = self
            .lock()
            .values()
            .filter(|p| p.resource_name == resource_name)
            .cloned()
            .collect();
        points.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.key().cmp(&b.key()))
        });
        points
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MetricIdentity, MetricDataPoint>> {
        self.points.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MetricStore for MemoryMetricStore {
    async fn batch_upsert(&self, points: &[MetricDataPoint]) -> Result<usize> {
        let mut stored = self.lock();
        for point in points {
            stored.insert(point.identity(), point.clone());
        }
        Ok(points.len())
    }

    async fn latest_timestamps_for(
        &self,
        resource: &Resource,
    ) -> Result<HashMap<MetricKey, DateTime<Utc>>> {
        let mut latest: HashMap<MetricKey, DateTime<Utc>> = HashMap::new();
        for point in self.lock().values().filter(|p| {
            p.account_id == resource.account_id
                && p.resource_name == resource.resource_name
                && p.region == resource.region
        }) {
            latest
                .entry(point.key())
                .and_modify(|ts| *ts = (*ts).max(point.timestamp))
                .or_insert(point.timestamp);
        }
        Ok(latest)
    }
}
