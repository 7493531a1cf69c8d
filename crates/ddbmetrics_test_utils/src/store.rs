use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddbmetrics_protocol::{MetricDataPoint, MetricKey, Resource};
use ddbmetrics_store::{MemoryMetricStore, MetricStore, Result, StoreError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory store whose upserts fail or stall on demand.
///
/// Failing upserts write nothing. Latest-timestamp lookups always succeed.
#[derive(Default)]
pub struct FlakyMetricStore {
    inner: Arc<MemoryMetricStore>,
    upserts: AtomicUsize,
    fail_remaining: AtomicUsize,
    /// 1-based upsert call that fails, 0 when unset
    fail_at: AtomicUsize,
    upsert_delay_ms: AtomicU64,
}

impl FlakyMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` upserts.
    pub fn fail_next_upserts(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail only the `n`-th upsert call counted from creation.
    pub fn fail_upsert_number(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    /// Sleep this long inside every upsert before writing.
    pub fn delay_upserts(&self, delay: Duration) {
        self.upsert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_remaining.store(0, Ordering::SeqCst);
        self.fail_at.store(0, Ordering::SeqCst);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryMetricStore {
        &self.inner
    }

    fn should_fail(&self, call: usize) -> bool {
        if self.fail_at.load(Ordering::SeqCst) == call {
            return true;
        }
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MetricStore for FlakyMetricStore {
    async fn batch_upsert(&self, points: &[MetricDataPoint]) -> Result<usize> {
        let call = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.upsert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.should_fail(call) {
            return Err(StoreError::unavailable(format!(
                "injected failure on upsert #{}",
                call
            )));
        }
        self.inner.batch_upsert(points).await
    }

    async fn latest_timestamps_for(
        &self,
        resource: &Resource,
    ) -> Result<HashMap<MetricKey, DateTime<Utc>>> {
        self.inner.latest_timestamps_for(resource).await
    }
}
