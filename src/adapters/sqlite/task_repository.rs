//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{FailureType, Task, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

use super::task_row::TaskRow;

/// Emitted when a serialized task JSON column exceeds this size; a signal
/// that `result` or `files` may be growing unboundedly.
const JSON_SIZE_WARN_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> SwarmResult<()> {
        let required_skills = serde_json::to_string(&task.required_skills)?;
        let dependencies = serde_json::to_string(&task.dependencies)?;
        let blockers = serde_json::to_string(&task.blockers)?;
        let files = serde_json::to_string(&task.files)?;
        let previous_agents = serde_json::to_string(&task.previous_agents)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;
        if let Some(ref r) = result {
            if r.len() > JSON_SIZE_WARN_BYTES {
                tracing::warn!(task_id = %task.id, size_bytes = r.len(), "task result exceeds size threshold");
            }
        }

        sqlx::query(
            r#"INSERT INTO tasks (id, title, description, status, priority, task_type,
               required_skills, dependencies, blockers, files, assigned_agent, claimed_at,
               started_at, completed_at, estimated_minutes, actual_minutes, retry_count,
               max_retries, last_error, failure_type, next_retry_at, previous_agents, result,
               branch, quality_snapshot_id, created_at, updated_at, sync_version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.task_type)
        .bind(&required_skills)
        .bind(&dependencies)
        .bind(&blockers)
        .bind(&files)
        .bind(&task.assigned_agent)
        .bind(task.claimed_at.map(|t| t.to_rfc3339()))
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.estimated_minutes)
        .bind(task.actual_minutes)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(&task.last_error)
        .bind(task.failure_type.map(|f| f.as_str()))
        .bind(task.next_retry_at.map(|t| t.to_rfc3339()))
        .bind(&previous_agents)
        .bind(&result)
        .bind(&task.branch)
        .bind(&task.quality_snapshot_id)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> SwarmResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.map(Task::try_from).transpose()
    }

    async fn update(&self, task: &Task, expected_sync_version: i64) -> SwarmResult<()> {
        let required_skills = serde_json::to_string(&task.required_skills)?;
        let dependencies = serde_json::to_string(&task.dependencies)?;
        let blockers = serde_json::to_string(&task.blockers)?;
        let files = serde_json::to_string(&task.files)?;
        let previous_agents = serde_json::to_string(&task.previous_agents)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

        let update_result = sqlx::query(
            r#"UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?, task_type = ?,
               required_skills = ?, dependencies = ?, blockers = ?, files = ?, assigned_agent = ?,
               claimed_at = ?, started_at = ?, completed_at = ?, estimated_minutes = ?,
               actual_minutes = ?, retry_count = ?, max_retries = ?, last_error = ?,
               failure_type = ?, next_retry_at = ?, previous_agents = ?, result = ?, branch = ?,
               quality_snapshot_id = ?, updated_at = ?, sync_version = sync_version + 1
               WHERE id = ? AND sync_version = ?"#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.task_type)
        .bind(&required_skills)
        .bind(&dependencies)
        .bind(&blockers)
        .bind(&files)
        .bind(&task.assigned_agent)
        .bind(task.claimed_at.map(|t| t.to_rfc3339()))
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.estimated_minutes)
        .bind(task.actual_minutes)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(&task.last_error)
        .bind(task.failure_type.map(|f| f.as_str()))
        .bind(task.next_retry_at.map(|t| t.to_rfc3339()))
        .bind(&previous_agents)
        .bind(&result)
        .bind(&task.branch)
        .bind(&task.quality_snapshot_id)
        .bind(Utc::now().to_rfc3339())
        .bind(expected_sync_version)
        .bind(&task.id)
        .bind(expected_sync_version)
        .execute(&self.pool)
        .await?;

        if update_result.rows_affected() == 0 {
            return Err(SwarmError::Conflict(format!("task {} has moved past sync_version {}", task.id, expected_sync_version)));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> SwarmResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?").bind(id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    async fn upsert_from_sync(&self, task: &Task) -> SwarmResult<()> {
        let required_skills = serde_json::to_string(&task.required_skills)?;
        let dependencies = serde_json::to_string(&task.dependencies)?;
        let blockers = serde_json::to_string(&task.blockers)?;
        let files = serde_json::to_string(&task.files)?;
        let previous_agents = serde_json::to_string(&task.previous_agents)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO tasks (id, title, description, status, priority, task_type,
               required_skills, dependencies, blockers, files, assigned_agent, claimed_at,
               started_at, completed_at, estimated_minutes, actual_minutes, retry_count,
               max_retries, last_error, failure_type, next_retry_at, previous_agents, result,
               branch, quality_snapshot_id, created_at, updated_at, sync_version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET title = excluded.title, description = excluded.description,
               status = excluded.status, priority = excluded.priority, task_type = excluded.task_type,
               required_skills = excluded.required_skills, dependencies = excluded.dependencies,
               blockers = excluded.blockers, files = excluded.files, assigned_agent = excluded.assigned_agent,
               claimed_at = excluded.claimed_at, started_at = excluded.started_at, completed_at = excluded.completed_at,
               estimated_minutes = excluded.estimated_minutes, actual_minutes = excluded.actual_minutes,
               retry_count = excluded.retry_count, max_retries = excluded.max_retries, last_error = excluded.last_error,
               failure_type = excluded.failure_type, next_retry_at = excluded.next_retry_at,
               previous_agents = excluded.previous_agents, result = excluded.result, branch = excluded.branch,
               quality_snapshot_id = excluded.quality_snapshot_id, updated_at = excluded.updated_at,
               sync_version = excluded.sync_version"#,
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&task.task_type)
        .bind(&required_skills)
        .bind(&dependencies)
        .bind(&blockers)
        .bind(&files)
        .bind(&task.assigned_agent)
        .bind(task.claimed_at.map(|t| t.to_rfc3339()))
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.estimated_minutes)
        .bind(task.actual_minutes)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(&task.last_error)
        .bind(task.failure_type.map(|f| f.as_str()))
        .bind(task.next_retry_at.map(|t| t.to_rfc3339()))
        .bind(&previous_agents)
        .bind(&result)
        .bind(&task.branch)
        .bind(&task.quality_snapshot_id)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.sync_version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> SwarmResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(priority) = &filter.priority {
            query.push_str(" AND priority = ?");
            bindings.push(priority.as_str().to_string());
        }
        if let Some(agent) = &filter.assigned_agent {
            query.push_str(" AND assigned_agent = ?");
            bindings.push(agent.clone());
        }
        if let Some(skill) = &filter.required_skill {
            query.push_str(" AND required_skills LIKE ?");
            bindings.push(format!("%\"{skill}\"%"));
        }
        if let Some(task_type) = &filter.task_type {
            query.push_str(" AND task_type = ?");
            bindings.push(task_type.clone());
        }
        if let Some(branch) = &filter.branch {
            query.push_str(" AND branch = ?");
            bindings.push(branch.clone());
        }
        if !filter.exclude_ids.is_empty() {
            let placeholders = filter.exclude_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            query.push_str(&format!(" AND id NOT IN ({placeholders})"));
            bindings.extend(filter.exclude_ids.iter().cloned());
        }

        query.push_str(" ORDER BY priority DESC, created_at ASC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = filter.offset {
                query.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn claim_specific(&self, task_id: &str, agent_id: &str) -> SwarmResult<Option<Task>> {
        let now = Utc::now();
        let update_result = sqlx::query(
            "UPDATE tasks SET status = 'claimed', assigned_agent = ?, claimed_at = ?, updated_at = ?, sync_version = sync_version + 1 WHERE id = ? AND status = 'ready'",
        )
        .bind(agent_id)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        if update_result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(task_id).await
    }

    async fn unblock_ready_dependents(&self, completed_task_id: &str) -> SwarmResult<Vec<String>> {
        let blocked: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE status = 'blocked' AND dependencies LIKE ?")
            .bind(format!("%\"{completed_task_id}\"%"))
            .fetch_all(&self.pool)
            .await?;

        let mut unblocked = Vec::new();
        for row in blocked {
            let task: Task = Task::try_from(row)?;
            let all_deps_complete = {
                let mut complete = true;
                for dep_id in &task.dependencies {
                    match self.get(dep_id).await? {
                        Some(dep) if dep.status == TaskStatus::Completed => {}
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                complete
            };

            if all_deps_complete {
                let result = sqlx::query("UPDATE tasks SET status = 'ready', updated_at = ?, sync_version = sync_version + 1 WHERE id = ? AND status = 'blocked'")
                    .bind(Utc::now().to_rfc3339())
                    .bind(&task.id)
                    .execute(&self.pool)
                    .await?;
                if result.rows_affected() > 0 {
                    unblocked.push(task.id);
                }
            }
        }
        Ok(unblocked)
    }

    async fn list_dependents(&self, task_id: &str) -> SwarmResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE dependencies LIKE ?")
            .bind(format!("%\"{task_id}\"%"))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn list_due_retries(&self, now: chrono::DateTime<chrono::Utc>) -> SwarmResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE status = 'pending_retry' AND next_retry_at <= ?")
            .bind(now.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn list_orphaned(&self, stale_agent_ids: &[String]) -> SwarmResult<Vec<Task>> {
        if stale_agent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = stale_agent_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let query = format!("SELECT * FROM tasks WHERE status IN ('claimed', 'in_progress') AND assigned_agent IN ({placeholders})");
        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for id in stale_agent_ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }
}
