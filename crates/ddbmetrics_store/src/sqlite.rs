//! SQLite-backed metric store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ddbmetrics_protocol::{MetricDataPoint, MetricKey, Resource, Statistic};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::MetricStore;

/// Collected-metrics overview.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricSummary {
    pub total_points: u64,
    pub total_resources: u64,
    pub by_kind: Vec<KindSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KindSummary {
    pub resource_kind: String,
    pub points: u64,
    pub resources: u64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

pub struct SqliteMetricStore {
    pool: Pool<Sqlite>,
}

impl SqliteMetricStore {
    /// Wrap an existing pool and make sure the schema exists.
    pub async fn new(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open (creating if needed) a database file.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        info!(path = %path.display(), "Opened metric store");
        Self::new(pool).await
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new(pool).await
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics (
                account_id TEXT NOT NULL,
                table_name TEXT NOT NULL,
                resource_name TEXT NOT NULL,
                resource_kind TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                operation TEXT,
                operation_type TEXT,
                statistic TEXT NOT NULL,
                period_seconds INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                region TEXT NOT NULL,
                dimensions TEXT NOT NULL,
                collected_at TEXT NOT NULL,
                UNIQUE (account_id, region, resource_name, metric_name, timestamp, statistic, period_seconds)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metrics_series ON metrics(account_id, region, resource_name, metric_name, statistic, period_seconds, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_points(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM metrics")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Stored value for one identity, if any.
    pub async fn value_at(
        &self,
        resource: &Resource,
        key: &MetricKey,
        timestamp: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let row: Option<(f64,)> = sqlx::query_as(
            r#"
            SELECT value FROM metrics
            WHERE account_id = ?1 AND resource_name = ?2 AND metric_name = ?3
              AND statistic = ?4 AND period_seconds = ?5 AND timestamp = ?6
              AND region = ?7
            "#,
        )
        .bind(&resource.account_id)
        .bind(&resource.resource_name)
        .bind(&key.metric_name)
        .bind(key.statistic.as_str())
        .bind(i64::from(key.period_seconds))
        .bind(format_ts(timestamp))
        .bind(&resource.region)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Totals plus per resource kind counts and time range.
    pub async fn summary(&self) -> Result<MetricSummary> {
        let rows: Vec<(String, i64, i64, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT resource_kind, COUNT(*), COUNT(DISTINCT account_id || '/' || region || '/' || resource_name),
                   MIN(timestamp), MAX(timestamp)
            FROM metrics
            GROUP BY resource_kind
            ORDER BY resource_kind
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = MetricSummary::default();
        for (resource_kind, points, resources, earliest, latest) in rows {
            summary.total_points += points as u64;
            summary.total_resources += resources as u64;
            summary.by_kind.push(KindSummary {
                resource_kind,
                points: points as u64,
                resources: resources as u64,
                earliest: earliest.as_deref().map(parse_ts).transpose()?,
                latest: latest.as_deref().map(parse_ts).transpose()?,
            });
        }
        Ok(summary)
    }
}

#[async_trait]
impl MetricStore for SqliteMetricStore {
    async fn batch_upsert(&self, points: &[MetricDataPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        let collected_at = format_ts(Utc::now());

        // One transaction for the whole flush; a failure leaves nothing behind.
        let mut tx = self.pool.begin().await?;
        for point in points {
            let dimensions = serde_json::to_string(&point.dimensions)?;
            sqlx::query(
                r#"
                INSERT INTO metrics
                (account_id, table_name, resource_name, resource_kind, metric_name,
                 operation, operation_type, statistic, period_seconds, timestamp,
                 value, unit, region, dimensions, collected_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT (account_id, region, resource_name, metric_name, timestamp, statistic, period_seconds)
                DO UPDATE SET value = excluded.value,
                              unit = excluded.unit,
                              dimensions = excluded.dimensions,
                              collected_at = excluded.collected_at
                "#,
            )
            .bind(&point.account_id)
            .bind(&point.table_name)
            .bind(&point.resource_name)
            .bind(point.resource_kind.as_str())
            .bind(&point.metric_name)
            .bind(point.operation.as_deref())
            .bind(point.operation_type.as_deref())
            .bind(point.statistic.as_str())
            .bind(i64::from(point.period_seconds))
            .bind(format_ts(point.timestamp))
            .bind(point.value)
            .bind(&point.unit)
            .bind(&point.region)
            .bind(dimensions)
            .bind(&collected_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(points = points.len(), "Upserted metric points");
        Ok(points.len())
    }

    async fn latest_timestamps_for(
        &self,
        resource: &Resource,
    ) -> Result<HashMap<MetricKey, DateTime<Utc>>> {
        let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT metric_name, statistic, period_seconds, MAX(timestamp)
            FROM metrics
            WHERE account_id = ?1 AND resource_name = ?2 AND region = ?3
            GROUP BY metric_name, statistic, period_seconds
            "#,
        )
        .bind(&resource.account_id)
        .bind(&resource.resource_name)
        .bind(&resource.region)
        .fetch_all(&self.pool)
        .await?;

        let mut latest = HashMap::with_capacity(rows.len());
        for (metric_name, statistic, period, ts) in rows {
            let statistic: Statistic = statistic
                .parse()
                .map_err(|e| StoreError::invalid_data(format!("{}", e)))?;
            let period = u32::try_from(period)
                .map_err(|_| StoreError::invalid_data(format!("period {} out of range", period)))?;
            latest.insert(MetricKey::new(metric_name, statistic, period), parse_ts(&ts)?);
        }
        Ok(latest)
    }
}

/// Fixed-width UTC text so lexical order matches time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::invalid_data(format!("timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert!(format_ts(early) < format_ts(late));
        assert_eq!(parse_ts(&format_ts(late)).unwrap(), late);
    }

    #[tokio::test]
    async fn test_empty_store_has_no_latest() {
        let store = SqliteMetricStore::in_memory().await.unwrap();
        let resource = Resource::table("123", "orders", "us-east-1");
        assert!(store
            .latest_timestamps_for(&resource)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.count_points().await.unwrap(), 0);
    }
}
