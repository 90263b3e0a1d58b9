//! Row <-> domain conversions for the `tasks` table.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::error::SwarmError;
use crate::domain::models::{FailureType, Task, TaskPriority, TaskStatus};

#[derive(Debug, FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub task_type: String,
    pub required_skills: String,
    pub dependencies: String,
    pub blockers: String,
    pub files: String,
    pub assigned_agent: Option<String>,
    pub claimed_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub estimated_minutes: Option<f64>,
    pub actual_minutes: Option<f64>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub last_error: Option<String>,
    pub failure_type: Option<String>,
    pub next_retry_at: Option<String>,
    pub previous_agents: String,
    pub result: Option<String>,
    pub branch: Option<String>,
    pub quality_snapshot_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_version: i64,
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, SwarmError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_opt_ts(s: &Option<String>) -> Result<Option<DateTime<Utc>>, SwarmError> {
    s.as_deref().map(parse_ts).transpose()
}

impl TryFrom<TaskRow> for Task {
    type Error = SwarmError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            title: row.title,
            description: row.description,
            status: TaskStatus::from_str(&row.status).ok_or_else(|| SwarmError::ConstraintViolation(format!("unknown task status: {}", row.status)))?,
            priority: TaskPriority::from_str(&row.priority).ok_or_else(|| SwarmError::ConstraintViolation(format!("unknown task priority: {}", row.priority)))?,
            task_type: row.task_type,
            required_skills: serde_json::from_str(&row.required_skills)?,
            dependencies: serde_json::from_str(&row.dependencies)?,
            blockers: serde_json::from_str(&row.blockers)?,
            files: serde_json::from_str(&row.files)?,
            assigned_agent: row.assigned_agent,
            claimed_at: parse_opt_ts(&row.claimed_at)?,
            started_at: parse_opt_ts(&row.started_at)?,
            completed_at: parse_opt_ts(&row.completed_at)?,
            estimated_minutes: row.estimated_minutes,
            actual_minutes: row.actual_minutes,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            last_error: row.last_error,
            failure_type: row.failure_type.as_deref().and_then(FailureType::from_str),
            next_retry_at: parse_opt_ts(&row.next_retry_at)?,
            previous_agents: serde_json::from_str(&row.previous_agents)?,
            result: row.result.map(|r| serde_json::from_str(&r)).transpose()?,
            branch: row.branch,
            quality_snapshot_id: row.quality_snapshot_id,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            sync_version: row.sync_version,
        })
    }
}
