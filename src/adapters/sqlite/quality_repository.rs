//! SQLite implementation of the QualityRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{QualityBaseline, QualitySnapshot};
use crate::domain::ports::QualityRepository;

#[derive(Debug, FromRow)]
struct SnapshotRow {
    id: String,
    task_id: Option<String>,
    agent_id: Option<String>,
    build_success: Option<i64>,
    build_time_ms: Option<i64>,
    type_errors: i64,
    lint_errors: i64,
    lint_warnings: i64,
    tests_passing: i64,
    tests_failing: i64,
    tests_skipped: i64,
    test_coverage: Option<f64>,
    test_time_ms: Option<i64>,
    raw_output: Option<String>,
    recorded_at: String,
}

impl TryFrom<SnapshotRow> for QualitySnapshot {
    type Error = SwarmError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(QualitySnapshot {
            id: row.id,
            task_id: row.task_id,
            agent_id: row.agent_id,
            build_success: row.build_success.map(|v| v != 0),
            build_time_ms: row.build_time_ms.map(|v| v as u64),
            type_errors: row.type_errors as u32,
            lint_errors: row.lint_errors as u32,
            lint_warnings: row.lint_warnings as u32,
            tests_passing: row.tests_passing as u32,
            tests_failing: row.tests_failing as u32,
            tests_skipped: row.tests_skipped as u32,
            test_coverage: row.test_coverage,
            test_time_ms: row.test_time_ms.map(|v| v as u64),
            raw_output: row.raw_output.map(|s| serde_json::from_str(&s)).transpose()?,
            recorded_at: DateTime::parse_from_rfc3339(&row.recorded_at)?.with_timezone(&Utc),
        })
    }
}

#[derive(Debug, FromRow)]
struct BaselineRow {
    scope: String,
    snapshot_id: String,
    build_success: Option<i64>,
    type_errors: i64,
    lint_errors: i64,
    lint_warnings: i64,
    tests_passing: i64,
    tests_failing: i64,
    tests_skipped: i64,
    test_coverage: Option<f64>,
    set_by: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<BaselineRow> for QualityBaseline {
    type Error = SwarmError;

    fn try_from(row: BaselineRow) -> Result<Self, Self::Error> {
        Ok(QualityBaseline {
            scope: row.scope,
            snapshot_id: row.snapshot_id,
            build_success: row.build_success.map(|v| v != 0),
            type_errors: row.type_errors as u32,
            lint_errors: row.lint_errors as u32,
            lint_warnings: row.lint_warnings as u32,
            tests_passing: row.tests_passing as u32,
            tests_failing: row.tests_failing as u32,
            tests_skipped: row.tests_skipped as u32,
            test_coverage: row.test_coverage,
            set_by: row.set_by,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(&row.updated_at)?.with_timezone(&Utc),
        })
    }
}

#[derive(Clone)]
pub struct SqliteQualityRepository {
    pool: SqlitePool,
}

impl SqliteQualityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QualityRepository for SqliteQualityRepository {
    async fn record_snapshot(&self, snapshot: &QualitySnapshot) -> SwarmResult<()> {
        let raw_output = snapshot.raw_output.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"INSERT INTO quality_snapshots (id, task_id, agent_id, build_success, build_time_ms, type_errors,
               lint_errors, lint_warnings, tests_passing, tests_failing, tests_skipped, test_coverage,
               test_time_ms, raw_output, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&snapshot.id)
        .bind(&snapshot.task_id)
        .bind(&snapshot.agent_id)
        .bind(snapshot.build_success.map(|v| v as i64))
        .bind(snapshot.build_time_ms.map(|v| v as i64))
        .bind(snapshot.type_errors as i64)
        .bind(snapshot.lint_errors as i64)
        .bind(snapshot.lint_warnings as i64)
        .bind(snapshot.tests_passing as i64)
        .bind(snapshot.tests_failing as i64)
        .bind(snapshot.tests_skipped as i64)
        .bind(snapshot.test_coverage)
        .bind(snapshot.test_time_ms.map(|v| v as i64))
        .bind(raw_output)
        .bind(snapshot.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_snapshot(&self, id: &str) -> SwarmResult<Option<QualitySnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as("SELECT * FROM quality_snapshots WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.map(QualitySnapshot::try_from).transpose()
    }

    async fn list_snapshots_for_task(&self, task_id: &str) -> SwarmResult<Vec<QualitySnapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as("SELECT * FROM quality_snapshots WHERE task_id = ? ORDER BY recorded_at DESC")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(QualitySnapshot::try_from).collect()
    }

    async fn get_baseline(&self, scope: &str) -> SwarmResult<Option<QualityBaseline>> {
        let row: Option<BaselineRow> = sqlx::query_as("SELECT * FROM quality_baselines WHERE scope = ?").bind(scope).fetch_optional(&self.pool).await?;
        row.map(QualityBaseline::try_from).transpose()
    }

    async fn set_baseline(&self, baseline: &QualityBaseline) -> SwarmResult<()> {
        sqlx::query(
            r#"INSERT INTO quality_baselines (scope, snapshot_id, build_success, type_errors, lint_errors, lint_warnings,
               tests_passing, tests_failing, tests_skipped, test_coverage, set_by, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(scope) DO UPDATE SET snapshot_id = excluded.snapshot_id, build_success = excluded.build_success,
               type_errors = excluded.type_errors, lint_errors = excluded.lint_errors, lint_warnings = excluded.lint_warnings,
               tests_passing = excluded.tests_passing, tests_failing = excluded.tests_failing, tests_skipped = excluded.tests_skipped,
               test_coverage = excluded.test_coverage, set_by = excluded.set_by, updated_at = excluded.updated_at"#,
        )
        .bind(&baseline.scope)
        .bind(&baseline.snapshot_id)
        .bind(baseline.build_success.map(|v| v as i64))
        .bind(baseline.type_errors as i64)
        .bind(baseline.lint_errors as i64)
        .bind(baseline.lint_warnings as i64)
        .bind(baseline.tests_passing as i64)
        .bind(baseline.tests_failing as i64)
        .bind(baseline.tests_skipped as i64)
        .bind(baseline.test_coverage)
        .bind(&baseline.set_by)
        .bind(baseline.created_at.to_rfc3339())
        .bind(baseline.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
