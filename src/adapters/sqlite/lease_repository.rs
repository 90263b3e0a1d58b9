//! SQLite implementation of the LeaseRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::Lease;
use crate::domain::ports::LeaseRepository;

#[derive(Debug, FromRow)]
struct LeaseRow {
    file_path: String,
    agent_id: String,
    task_id: Option<String>,
    acquired_at: String,
    expires_at: String,
    renewed_count: i64,
}

impl TryFrom<LeaseRow> for Lease {
    type Error = SwarmError;

    fn try_from(row: LeaseRow) -> Result<Self, Self::Error> {
        Ok(Lease {
            file_path: row.file_path,
            agent_id: row.agent_id,
            task_id: row.task_id,
            acquired_at: DateTime::parse_from_rfc3339(&row.acquired_at)?.with_timezone(&Utc),
            expires_at: DateTime::parse_from_rfc3339(&row.expires_at)?.with_timezone(&Utc),
            renewed_count: row.renewed_count as u32,
        })
    }
}

#[derive(Clone)]
pub struct SqliteLeaseRepository {
    pool: SqlitePool,
}

impl SqliteLeaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseRepository for SqliteLeaseRepository {
    async fn acquire(&self, lease: &Lease) -> SwarmResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing: Option<LeaseRow> = sqlx::query_as("SELECT * FROM leases WHERE file_path = ?")
            .bind(&lease.file_path)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(row) = existing {
            let existing_lease: Lease = row.try_into()?;
            if existing_lease.is_live(now) {
                tx.rollback().await?;
                return Err(SwarmError::LeaseHeld(lease.file_path.clone()));
            }
        }

        sqlx::query(
            "INSERT INTO leases (file_path, agent_id, task_id, acquired_at, expires_at, renewed_count)
             VALUES (?, ?, ?, ?, ?, 0)
             ON CONFLICT(file_path) DO UPDATE SET agent_id = excluded.agent_id, task_id = excluded.task_id,
             acquired_at = excluded.acquired_at, expires_at = excluded.expires_at, renewed_count = 0",
        )
        .bind(&lease.file_path)
        .bind(&lease.agent_id)
        .bind(&lease.task_id)
        .bind(lease.acquired_at.to_rfc3339())
        .bind(lease.expires_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, file_path: &str) -> SwarmResult<Option<Lease>> {
        let row: Option<LeaseRow> = sqlx::query_as("SELECT * FROM leases WHERE file_path = ?").bind(file_path).fetch_optional(&self.pool).await?;
        row.map(Lease::try_from).transpose()
    }

    async fn check(&self, file_path: &str) -> SwarmResult<Option<Lease>> {
        let Some(lease) = self.get(file_path).await? else { return Ok(None) };
        if lease.is_live(Utc::now()) {
            Ok(Some(lease))
        } else {
            sqlx::query("DELETE FROM leases WHERE file_path = ?").bind(file_path).execute(&self.pool).await?;
            Ok(None)
        }
    }

    async fn renew(&self, file_path: &str, agent_id: &str, extend_by_ms: i64) -> SwarmResult<Lease> {
        let current = self.get(file_path).await?.ok_or_else(|| SwarmError::NotFound(format!("lease on {file_path}")))?;
        if current.agent_id != agent_id {
            return Err(SwarmError::LeaseHeld(file_path.to_string()));
        }
        let new_expiry = current.expires_at + chrono::Duration::milliseconds(extend_by_ms);

        let result = sqlx::query("UPDATE leases SET expires_at = ?, renewed_count = renewed_count + 1 WHERE file_path = ? AND agent_id = ?")
            .bind(new_expiry.to_rfc3339())
            .bind(file_path)
            .bind(agent_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("lease on {file_path} held by {agent_id}")));
        }

        self.get(file_path).await?.ok_or_else(|| SwarmError::NotFound(format!("lease on {file_path}")))
    }

    async fn release(&self, file_path: &str, agent_id: &str) -> SwarmResult<()> {
        let result = sqlx::query("DELETE FROM leases WHERE file_path = ? AND agent_id = ?").bind(file_path).bind(agent_id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("lease on {file_path} held by {agent_id}")));
        }
        Ok(())
    }

    async fn force_release(&self, file_path: &str) -> SwarmResult<()> {
        sqlx::query("DELETE FROM leases WHERE file_path = ?").bind(file_path).execute(&self.pool).await?;
        Ok(())
    }

    async fn list_by_agent(&self, agent_id: &str) -> SwarmResult<Vec<Lease>> {
        let rows: Vec<LeaseRow> = sqlx::query_as("SELECT * FROM leases WHERE agent_id = ?").bind(agent_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(Lease::try_from).collect()
    }

    async fn release_all(&self, agent_id: &str) -> SwarmResult<u64> {
        let result = sqlx::query("DELETE FROM leases WHERE agent_id = ?").bind(agent_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> SwarmResult<u64> {
        let result = sqlx::query("DELETE FROM leases WHERE expires_at <= ?").bind(now.to_rfc3339()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
