//! Bounded in-memory buffer in front of the metric store.

use async_trait::async_trait;
use ddbmetrics_protocol::MetricDataPoint;
use ddbmetrics_store::{MetricStore, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::Result;

/// Receives pages of converted data points as they arrive.
#[async_trait]
pub trait PageSink: Send + Sync {
    async fn accept(&self, points: Vec<MetricDataPoint>) -> Result<()>;
}

struct BufferInner {
    points: Mutex<Vec<MetricDataPoint>>,
    store: Arc<dyn MetricStore>,
    threshold: usize,
    flushed: AtomicU64,
}

/// Accumulates points and writes them out once `threshold` is reached.
///
/// The threshold decision is taken under the buffer lock; the store write
/// happens outside it. A failed write puts the drained points back at the
/// front of the buffer, in their original order, and reports the error.
#[derive(Clone)]
pub struct MetricBuffer {
    inner: Arc<BufferInner>,
}

impl MetricBuffer {
    pub fn new(store: Arc<dyn MetricStore>, threshold: usize) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                points: Mutex::new(Vec::new()),
                store,
                threshold: threshold.max(1),
                flushed: AtomicU64::new(0),
            }),
        }
    }

    pub async fn add_and_maybe_flush(&self, points: Vec<MetricDataPoint>) -> Result<()> {
        let should_flush = {
            let mut buffered = self.inner.points.lock().await;
            buffered.extend(points);
            buffered.len() >= self.inner.threshold
        };
        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write everything currently buffered. Returns the number of points written.
    ///
    /// The write runs on its own task, so a caller that is timed out or
    /// dropped mid-flush never loses drained points.
    pub async fn flush(&self) -> Result<usize> {
        let inner = Arc::clone(&self.inner);
        let written = tokio::spawn(async move { inner.flush_now().await })
            .await
            .map_err(|e| StoreError::unavailable(format!("flush task failed: {}", e)))??;
        Ok(written)
    }

    pub async fn len(&self) -> usize {
        self.inner.points.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> Vec<MetricDataPoint> {
        self.inner.points.lock().await.clone()
    }

    /// Points successfully written over the buffer's lifetime.
    pub fn flushed_total(&self) -> u64 {
        self.inner.flushed.load(Ordering::SeqCst)
    }
}

impl BufferInner {
    async fn flush_now(&self) -> std::result::Result<usize, StoreError> {
        let drained = {
            let mut buffered = self.points.lock().await;
            if buffered.is_empty() {
                return Ok(0);
            }
            if buffered.len() > self.threshold * 5 {
                warn!(
                    buffered = buffered.len(),
                    threshold = self.threshold,
                    "Metric buffer far above flush threshold"
                );
            }
            std::mem::take(&mut *buffered)
        };

        match self.store.batch_upsert(&drained).await {
            Ok(written) => {
                self.flushed.fetch_add(written as u64, Ordering::SeqCst);
                debug!(points = written, "Flushed metric buffer");
                Ok(written)
            }
            Err(e) => {
                let restored = drained.len();
                let mut buffered = self.points.lock().await;
                let newer = std::mem::replace(&mut *buffered, drained);
                buffered.extend(newer);
                error!(
                    restored,
                    buffered = buffered.len(),
                    error = %e,
                    "Metric flush failed, points restored to buffer"
                );
                Err(e)
            }
        }
    }
}

#[async_trait]
impl PageSink for MetricBuffer {
    async fn accept(&self, points: Vec<MetricDataPoint>) -> Result<()> {
        self.add_and_maybe_flush(points).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddbmetrics_store::MemoryMetricStore;

    fn points(n: usize) -> Vec<MetricDataPoint> {
        use chrono::{Duration, TimeZone, Utc};
        use ddbmetrics_protocol::{ResourceKind, Statistic};
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| MetricDataPoint {
                account_id: "123".into(),
                table_name: "orders".into(),
                resource_name: "orders".into(),
                resource_kind: ResourceKind::Table,
                metric_name: "ConsumedReadCapacityUnits".into(),
                operation: None,
                operation_type: None,
                statistic: Statistic::Sum,
                period_seconds: 60,
                timestamp: base + Duration::minutes(i as i64),
                value: i as f64,
                unit: "Count".into(),
                region: "us-east-1".into(),
                dimensions: Default::default(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_flushes_at_threshold() {
        let store = Arc::new(MemoryMetricStore::new());
        let buffer = MetricBuffer::new(store.clone(), 10);

        buffer.add_and_maybe_flush(points(9)).await.unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(buffer.len().await, 9);

        buffer.add_and_maybe_flush(points(10)).await.unwrap();
        // identities overlap on the first nine minutes
        assert_eq!(store.len(), 10);
        assert!(buffer.is_empty().await);
        assert_eq!(buffer.flushed_total(), 19);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let buffer = MetricBuffer::new(Arc::new(MemoryMetricStore::new()), 10);
        assert_eq!(buffer.flush().await.unwrap(), 0);
    }
}
