//! SQLite implementation of the ChangeLogRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{ChangeLogEntry, ChangeOp, EntityKind};
use crate::domain::ports::ChangeLogRepository;

#[derive(Debug, FromRow)]
struct ChangeLogRow {
    sync_version: i64,
    entity_kind: String,
    entity_id: String,
    op: String,
    payload: String,
    origin: String,
    created_at: String,
}

fn parse_entity_kind(s: &str) -> Result<EntityKind, SwarmError> {
    match s {
        "task" => Ok(EntityKind::Task),
        "agent" => Ok(EntityKind::Agent),
        "lease" => Ok(EntityKind::Lease),
        "message" => Ok(EntityKind::Message),
        "quality_snapshot" => Ok(EntityKind::QualitySnapshot),
        other => Err(SwarmError::ConstraintViolation(format!("unknown entity kind: {other}"))),
    }
}

fn parse_change_op(s: &str) -> Result<ChangeOp, SwarmError> {
    match s {
        "insert" => Ok(ChangeOp::Insert),
        "update" => Ok(ChangeOp::Update),
        "delete" => Ok(ChangeOp::Delete),
        other => Err(SwarmError::ConstraintViolation(format!("unknown change op: {other}"))),
    }
}

impl TryFrom<ChangeLogRow> for ChangeLogEntry {
    type Error = SwarmError;

    fn try_from(row: ChangeLogRow) -> Result<Self, Self::Error> {
        Ok(ChangeLogEntry {
            sync_version: row.sync_version as u64,
            entity_kind: parse_entity_kind(&row.entity_kind)?,
            entity_id: row.entity_id,
            op: parse_change_op(&row.op)?,
            payload: serde_json::from_str(&row.payload)?,
            origin: row.origin,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
        })
    }
}

#[derive(Clone)]
pub struct SqliteChangeLogRepository {
    pool: SqlitePool,
}

impl SqliteChangeLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeLogRepository for SqliteChangeLogRepository {
    async fn append(&self, entry: &ChangeLogEntry) -> SwarmResult<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        sqlx::query(
            "INSERT INTO change_log (sync_version, entity_kind, entity_id, op, payload, origin, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.sync_version as i64)
        .bind(entry.entity_kind.as_str())
        .bind(&entry.entity_id)
        .bind(entry.op.as_str())
        .bind(&payload)
        .bind(&entry.origin)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_since(&self, since: u64, limit: u32) -> SwarmResult<Vec<ChangeLogEntry>> {
        let rows: Vec<ChangeLogRow> = sqlx::query_as("SELECT * FROM change_log WHERE sync_version > ? ORDER BY sync_version ASC LIMIT ?")
            .bind(since as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ChangeLogEntry::try_from).collect()
    }

    async fn latest_version(&self) -> SwarmResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(sync_version), 0) FROM change_log").fetch_one(&self.pool).await?;
        Ok(row.0 as u64)
    }

    async fn list_for_entity(&self, kind: EntityKind, entity_id: &str) -> SwarmResult<Vec<ChangeLogEntry>> {
        let rows: Vec<ChangeLogRow> = sqlx::query_as("SELECT * FROM change_log WHERE entity_kind = ? AND entity_id = ? ORDER BY sync_version ASC")
            .bind(kind.as_str())
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ChangeLogEntry::try_from).collect()
    }

    async fn latest_changes_since(&self, since: u64, entity_types: &[EntityKind]) -> SwarmResult<Vec<ChangeLogEntry>> {
        let rows: Vec<ChangeLogRow> = if entity_types.is_empty() {
            sqlx::query_as(
                "SELECT c.* FROM change_log c
                 INNER JOIN (SELECT entity_kind, entity_id, MAX(sync_version) AS max_version
                             FROM change_log WHERE sync_version > ? GROUP BY entity_kind, entity_id) latest
                 ON c.entity_kind = latest.entity_kind AND c.entity_id = latest.entity_id AND c.sync_version = latest.max_version
                 ORDER BY c.sync_version ASC",
            )
            .bind(since as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            let kinds: Vec<&'static str> = entity_types.iter().map(EntityKind::as_str).collect();
            let placeholders = kinds.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!(
                "SELECT c.* FROM change_log c
                 INNER JOIN (SELECT entity_kind, entity_id, MAX(sync_version) AS max_version
                             FROM change_log WHERE sync_version > ? AND entity_kind IN ({placeholders}) GROUP BY entity_kind, entity_id) latest
                 ON c.entity_kind = latest.entity_kind AND c.entity_id = latest.entity_id AND c.sync_version = latest.max_version
                 ORDER BY c.sync_version ASC"
            );
            let mut query = sqlx::query_as(&sql).bind(since as i64);
            for kind in &kinds {
                query = query.bind(*kind);
            }
            query.fetch_all(&self.pool).await?
        };
        rows.into_iter().map(ChangeLogEntry::try_from).collect()
    }

    async fn compact(&self, before_version: u64) -> SwarmResult<u64> {
        let result = sqlx::query(
            "DELETE FROM change_log WHERE sync_version <= ? AND sync_version NOT IN
             (SELECT MAX(sync_version) FROM change_log GROUP BY entity_kind, entity_id)",
        )
        .bind(before_version as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> SwarmResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM change_log").fetch_one(&self.pool).await?;
        Ok(row.0 as u64)
    }
}
