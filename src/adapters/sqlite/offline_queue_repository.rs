//! SQLite implementation of the OfflineQueueRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{QueuedChange, QueuedChangeStatus};
use crate::domain::ports::OfflineQueueRepository;

#[derive(Debug, FromRow)]
struct QueuedChangeRow {
    id: String,
    sync_version: i64,
    status: String,
    attempt_count: i64,
    last_error: Option<String>,
    next_attempt_at: String,
    created_at: String,
}

fn parse_status(s: &str) -> Result<QueuedChangeStatus, SwarmError> {
    match s {
        "pending" => Ok(QueuedChangeStatus::Pending),
        "in_flight" => Ok(QueuedChangeStatus::InFlight),
        "failed" => Ok(QueuedChangeStatus::Failed),
        "delivered" => Ok(QueuedChangeStatus::Delivered),
        other => Err(SwarmError::ConstraintViolation(format!("unknown queued change status: {other}"))),
    }
}

impl TryFrom<QueuedChangeRow> for QueuedChange {
    type Error = SwarmError;

    fn try_from(row: QueuedChangeRow) -> Result<Self, Self::Error> {
        Ok(QueuedChange {
            id: row.id,
            sync_version: row.sync_version as u64,
            status: parse_status(&row.status)?,
            attempt_count: row.attempt_count as u32,
            last_error: row.last_error,
            next_attempt_at: DateTime::parse_from_rfc3339(&row.next_attempt_at)?.with_timezone(&Utc),
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
        })
    }
}

#[derive(Clone)]
pub struct SqliteOfflineQueueRepository {
    pool: SqlitePool,
}

impl SqliteOfflineQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfflineQueueRepository for SqliteOfflineQueueRepository {
    async fn enqueue(&self, change: &QueuedChange) -> SwarmResult<()> {
        sqlx::query(
            "INSERT INTO offline_queue (id, sync_version, status, attempt_count, last_error, next_attempt_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&change.id)
        .bind(change.sync_version as i64)
        .bind(change.status.as_str())
        .bind(change.attempt_count as i64)
        .bind(&change.last_error)
        .bind(change.next_attempt_at.to_rfc3339())
        .bind(change.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: u32) -> SwarmResult<Vec<QueuedChange>> {
        let rows: Vec<QueuedChangeRow> = sqlx::query_as(
            "SELECT * FROM offline_queue WHERE status IN ('pending', 'failed') AND next_attempt_at <= ?
             ORDER BY sync_version ASC LIMIT ?",
        )
        .bind(now.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(QueuedChange::try_from).collect()
    }

    async fn update(&self, change: &QueuedChange) -> SwarmResult<()> {
        let result = sqlx::query(
            "UPDATE offline_queue SET status = ?, attempt_count = ?, last_error = ?, next_attempt_at = ? WHERE id = ?",
        )
        .bind(change.status.as_str())
        .bind(change.attempt_count as i64)
        .bind(&change.last_error)
        .bind(change.next_attempt_at.to_rfc3339())
        .bind(&change.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("queued change {}", change.id)));
        }
        Ok(())
    }

    async fn count_pending(&self) -> SwarmResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue WHERE status IN ('pending', 'failed')").fetch_one(&self.pool).await?;
        Ok(row.0 as u64)
    }
}
