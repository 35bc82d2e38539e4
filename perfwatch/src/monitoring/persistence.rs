//! Best-effort asynchronous persistence of recorded samples
//!
//! Records are handed to a bounded queue and written by a background task.
//! A full queue or a failing sink drops records; in-memory alerting never
//! depends on the backing store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::detectors::ThresholdEvaluator;
use crate::samples::{tags, MetricSample, Threshold};
use crate::{InsightCategory, MonitorError, Result};

/// One persisted metric row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: Uuid,
    pub name: String,
    pub value: f64,

    /// Warning threshold at the time of recording
    pub target: Option<f64>,

    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub organization_id: Option<String>,
    pub user_id: Option<String>,

    /// Tags and context of the sample
    pub metadata: serde_json::Value,

    pub category: String,

    /// Threshold severity the value reached, if any
    pub severity: Option<String>,
}

impl MetricRecord {
    pub fn from_sample(
        sample: &MetricSample,
        threshold: Option<&Threshold>,
        category: InsightCategory,
        default_organization: Option<&str>,
    ) -> Self {
        let severity = threshold
            .and_then(|t| ThresholdEvaluator::classify(t, sample.value))
            .map(|(severity, _)| severity.as_str().to_lowercase());

        Self {
            id: Uuid::new_v4(),
            name: sample.name.clone(),
            value: sample.value,
            target: threshold.map(|t| t.warning),
            unit: sample.unit.clone(),
            timestamp: sample.timestamp,
            organization_id: sample
                .tag(tags::ORGANIZATION_ID)
                .or(default_organization)
                .map(str::to_string),
            user_id: sample.tag(tags::USER_ID).map(str::to_string),
            metadata: serde_json::json!({
                "tags": sample.tags,
                "context": sample.context,
            }),
            category: sample
                .tag(tags::CATEGORY)
                .unwrap_or(category.as_str())
                .to_string(),
            severity,
        }
    }
}

/// Destination for persisted metric records
#[async_trait]
pub trait MetricSink: Send + Sync {
    async fn write(&self, record: &MetricRecord) -> Result<()>;
}

/// Appends records to the `performance_metrics` Postgres table
pub struct PostgresMetricSink {
    pool: PgPool,
}

impl PostgresMetricSink {
    /// Connect and make sure the table exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        let sink = Self::from_pool(pool);
        sink.ensure_schema().await?;
        info!("Connected metric persistence to Postgres");
        Ok(sink)
    }

    /// Sink over an existing pool; the schema is not checked
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS performance_metrics (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                value DOUBLE PRECISION NOT NULL,
                target DOUBLE PRECISION,
                unit TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL,
                organization_id TEXT,
                user_id TEXT,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                category TEXT NOT NULL,
                severity TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS performance_metrics_name_ts ON performance_metrics (name, timestamp)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetricSink for PostgresMetricSink {
    async fn write(&self, record: &MetricRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO performance_metrics
                (id, name, value, target, unit, timestamp, organization_id, user_id, metadata, category, severity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(record.value)
        .bind(record.target)
        .bind(&record.unit)
        .bind(record.timestamp)
        .bind(&record.organization_id)
        .bind(&record.user_id)
        .bind(record.metadata.to_string())
        .bind(&record.category)
        .bind(&record.severity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Bounded hand-off queue feeding a background sink writer
pub struct MetricWriter {
    tx: mpsc::Sender<MetricRecord>,
    handle: JoinHandle<()>,
}

impl MetricWriter {
    /// Start the writer task on the current runtime
    pub fn spawn(sink: Arc<dyn MetricSink>, capacity: usize) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| MonitorError::internal("metric writer requires a tokio runtime"))?;
        let (tx, mut rx) = mpsc::channel::<MetricRecord>(capacity.max(1));

        let handle = runtime.spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = sink.write(&record).await {
                    warn!(metric = %record.name, error = %e, "Failed to persist metric, dropping");
                }
            }
            debug!("Metric writer drained");
        });

        Ok(Self { tx, handle })
    }

    /// Queue a record without waiting. Returns false when it was dropped.
    pub fn submit(&self, record: MetricRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                warn!(metric = %record.name, "Persistence queue full, dropping record");
                metrics::increment_counter!("perfwatch_persistence_dropped_total");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Close the queue and wait for queued records to be written
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Metric writer ended abnormally");
        }
    }
}
