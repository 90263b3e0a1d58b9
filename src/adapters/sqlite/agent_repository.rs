//! SQLite implementation of the AgentRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{Agent, AgentStatus, CapabilityFlags, MachineInfo, TaskPhase};
use crate::domain::ports::AgentRepository;

#[derive(Debug, FromRow)]
struct AgentRow {
    id: String,
    name: String,
    agent_type: String,
    status: String,
    skills: String,
    runs_tests: i64,
    runs_build: i64,
    runs_browser: i64,
    max_task_minutes: Option<i64>,
    last_heartbeat: String,
    heartbeat_count: i64,
    current_task_id: Option<String>,
    current_task_progress: f64,
    current_task_phase: Option<String>,
    tasks_completed: i64,
    tasks_failed: i64,
    total_runtime_minutes: f64,
    hostname: Option<String>,
    os: Option<String>,
    arch: Option<String>,
    pid: Option<i64>,
    registered_at: String,
    last_active_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = SwarmError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Agent {
            id: row.id,
            name: row.name,
            agent_type: row.agent_type,
            status: AgentStatus::from_str(&row.status).ok_or_else(|| SwarmError::ConstraintViolation(format!("unknown agent status: {}", row.status)))?,
            skills: serde_json::from_str(&row.skills)?,
            capabilities: CapabilityFlags { runs_tests: row.runs_tests != 0, runs_build: row.runs_build != 0, runs_browser: row.runs_browser != 0 },
            max_task_minutes: row.max_task_minutes.map(|v| v as u32),
            last_heartbeat: DateTime::parse_from_rfc3339(&row.last_heartbeat)?.with_timezone(&Utc),
            heartbeat_count: row.heartbeat_count as u64,
            current_task_id: row.current_task_id,
            current_task_progress: row.current_task_progress as f32,
            current_task_phase: row.current_task_phase.as_deref().and_then(TaskPhase::from_str),
            tasks_completed: row.tasks_completed as u64,
            tasks_failed: row.tasks_failed as u64,
            total_runtime_minutes: row.total_runtime_minutes,
            machine: MachineInfo { hostname: row.hostname, os: row.os, arch: row.arch },
            pid: row.pid.map(|v| v as u32),
            registered_at: DateTime::parse_from_rfc3339(&row.registered_at)?.with_timezone(&Utc),
            last_active_at: DateTime::parse_from_rfc3339(&row.last_active_at)?.with_timezone(&Utc),
        })
    }
}

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn register(&self, agent: &Agent) -> SwarmResult<()> {
        let skills = serde_json::to_string(&agent.skills)?;
        sqlx::query(
            r#"INSERT INTO agents (id, name, agent_type, status, skills, runs_tests, runs_build,
               runs_browser, max_task_minutes, last_heartbeat, heartbeat_count, current_task_id,
               current_task_progress, current_task_phase, tasks_completed, tasks_failed,
               total_runtime_minutes, hostname, os, arch, pid, registered_at, last_active_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET status = excluded.status, last_heartbeat = excluded.last_heartbeat"#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.agent_type)
        .bind(agent.status.as_str())
        .bind(&skills)
        .bind(agent.capabilities.runs_tests as i64)
        .bind(agent.capabilities.runs_build as i64)
        .bind(agent.capabilities.runs_browser as i64)
        .bind(agent.max_task_minutes.map(|v| v as i64))
        .bind(agent.last_heartbeat.to_rfc3339())
        .bind(agent.heartbeat_count as i64)
        .bind(&agent.current_task_id)
        .bind(agent.current_task_progress as f64)
        .bind(agent.current_task_phase.map(|p| p.as_str()))
        .bind(agent.tasks_completed as i64)
        .bind(agent.tasks_failed as i64)
        .bind(agent.total_runtime_minutes)
        .bind(&agent.machine.hostname)
        .bind(&agent.machine.os)
        .bind(&agent.machine.arch)
        .bind(agent.pid.map(|v| v as i64))
        .bind(agent.registered_at.to_rfc3339())
        .bind(agent.last_active_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> SwarmResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.map(Agent::try_from).transpose()
    }

    async fn update(&self, agent: &Agent) -> SwarmResult<()> {
        let skills = serde_json::to_string(&agent.skills)?;
        let result = sqlx::query(
            r#"UPDATE agents SET name = ?, agent_type = ?, status = ?, skills = ?, runs_tests = ?,
               runs_build = ?, runs_browser = ?, max_task_minutes = ?, last_heartbeat = ?,
               heartbeat_count = ?, current_task_id = ?, current_task_progress = ?,
               current_task_phase = ?, tasks_completed = ?, tasks_failed = ?,
               total_runtime_minutes = ?, pid = ?, last_active_at = ? WHERE id = ?"#,
        )
        .bind(&agent.name)
        .bind(&agent.agent_type)
        .bind(agent.status.as_str())
        .bind(&skills)
        .bind(agent.capabilities.runs_tests as i64)
        .bind(agent.capabilities.runs_build as i64)
        .bind(agent.capabilities.runs_browser as i64)
        .bind(agent.max_task_minutes.map(|v| v as i64))
        .bind(agent.last_heartbeat.to_rfc3339())
        .bind(agent.heartbeat_count as i64)
        .bind(&agent.current_task_id)
        .bind(agent.current_task_progress as f64)
        .bind(agent.current_task_phase.map(|p| p.as_str()))
        .bind(agent.tasks_completed as i64)
        .bind(agent.tasks_failed as i64)
        .bind(agent.total_runtime_minutes)
        .bind(agent.pid.map(|v| v as i64))
        .bind(agent.last_active_at.to_rfc3339())
        .bind(&agent.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("agent {}", agent.id)));
        }
        Ok(())
    }

    async fn list(&self, status: Option<AgentStatus>) -> SwarmResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = match status {
            Some(s) => sqlx::query_as("SELECT * FROM agents WHERE status = ?").bind(s.as_str()).fetch_all(&self.pool).await?,
            None => sqlx::query_as("SELECT * FROM agents").fetch_all(&self.pool).await?,
        };
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn heartbeat(&self, id: &str, progress: Option<f32>, phase: Option<String>) -> SwarmResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE agents SET last_heartbeat = ?, heartbeat_count = heartbeat_count + 1, last_active_at = ?,
             current_task_progress = COALESCE(?, current_task_progress),
             current_task_phase = COALESCE(?, current_task_phase) WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(progress.map(|p| p as f64))
        .bind(phase)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("agent {id}")));
        }
        Ok(())
    }

    async fn list_stale(&self, threshold_ms: i64, now: DateTime<Utc>) -> SwarmResult<Vec<Agent>> {
        let cutoff = now - chrono::Duration::milliseconds(threshold_ms);
        let rows: Vec<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE status != 'offline' AND last_heartbeat < ?")
            .bind(cutoff.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn mark_offline(&self, id: &str) -> SwarmResult<()> {
        let result = sqlx::query("UPDATE agents SET status = 'offline' WHERE id = ?").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("agent {id}")));
        }
        Ok(())
    }

    async fn update_stats(&self, id: &str, completed: bool, runtime_minutes: f64) -> SwarmResult<()> {
        let result = if completed {
            sqlx::query("UPDATE agents SET tasks_completed = tasks_completed + 1, total_runtime_minutes = total_runtime_minutes + ? WHERE id = ?")
                .bind(runtime_minutes)
                .bind(id)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query("UPDATE agents SET tasks_failed = tasks_failed + 1, total_runtime_minutes = total_runtime_minutes + ? WHERE id = ?")
                .bind(runtime_minutes)
                .bind(id)
                .execute(&self.pool)
                .await?
        };

        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("agent {id}")));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> SwarmResult<()> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("agent {id}")));
        }
        Ok(())
    }
}
