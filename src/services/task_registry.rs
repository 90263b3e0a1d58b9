//! Task registry: create/claim/release/progress/complete/fail, with
//! dependency-cascade unblocking and retry scheduling.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{Agent, ChangeLogEntry, ChangeOp, EntityKind, Task, TaskFailure, TaskFilter, TaskStatus};
use crate::domain::ports::{ChangeLogRepository, TaskRepository};

use super::scheduler::Scheduler;
use super::sync_version::SyncVersionCounter;

pub struct TaskRegistry<T: TaskRepository, C: ChangeLogRepository> {
    tasks: Arc<T>,
    change_log: Arc<C>,
    scheduler: Scheduler<T>,
    sync_version: SyncVersionCounter,
}

impl<T: TaskRepository, C: ChangeLogRepository> TaskRegistry<T, C> {
    pub fn new(tasks: Arc<T>, change_log: Arc<C>, scheduler: Scheduler<T>, sync_version: SyncVersionCounter) -> Self {
        Self { tasks, change_log, scheduler, sync_version }
    }

    async fn record_change(&self, kind: EntityKind, id: &str, op: ChangeOp, payload: serde_json::Value) -> SwarmResult<()> {
        let version = self.sync_version.next().await;
        self.change_log.append(&ChangeLogEntry::new(version, kind, id, op, payload, "local")).await
    }

    /// `base * 2^exponent` plus jitter, capped at `max_ms` (S3: 30s, 60s, ...
    /// for successive retries with a configured base of 30s).
    fn retry_delay_ms(base_ms: u64, max_ms: u64, exponent: u32) -> u64 {
        let raw = base_ms.saturating_mul(1u64 << exponent);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let jitter = u64::from(nanos % (raw.max(1) as u32).min(1_000));
        raw.saturating_add(jitter).min(max_ms)
    }

    pub async fn create(&self, task: Task) -> SwarmResult<Task> {
        task.validate().map_err(SwarmError::ConstraintViolation)?;
        self.tasks.create(&task).await?;
        self.record_change(EntityKind::Task, &task.id, ChangeOp::Insert, serde_json::to_value(&task)?).await?;
        tracing::info!(task_id = %task.id, status = task.status.as_str(), "task created");
        Ok(task)
    }

    pub async fn get(&self, id: &str) -> SwarmResult<Option<Task>> {
        self.tasks.get(id).await
    }

    /// Delete a task outright. Cascades only to the change log (marks a
    /// delete); dependents are left as-is per spec.md §4.2.
    pub async fn delete(&self, id: &str) -> SwarmResult<()> {
        self.tasks.delete(id).await?;
        self.record_change(EntityKind::Task, id, ChangeOp::Delete, serde_json::Value::Null).await?;
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }

    pub async fn list(&self, filter: TaskFilter) -> SwarmResult<Vec<Task>> {
        self.tasks.list(filter).await
    }

    /// Rank eligible ready tasks for `agent_id` and atomically claim the
    /// best-ranked one (P1), recording the claim in the change log.
    pub async fn claim(&self, agent_id: &str, skills: &[String]) -> SwarmResult<Option<Task>> {
        let agent = Agent::new(agent_id, "", "", skills.to_vec());
        let claimed = self.scheduler.next_for(&agent).await?;
        if let Some(ref task) = claimed {
            self.record_change(EntityKind::Task, &task.id, ChangeOp::Update, serde_json::to_value(task)?).await?;
            tracing::info!(task_id = %task.id, %agent_id, "task claimed");
        }
        Ok(claimed)
    }

    pub async fn release(&self, id: &str, reason: &str) -> SwarmResult<Task> {
        let mut task = self.tasks.get(id).await?.ok_or_else(|| SwarmError::NotFound(format!("task {id}")))?;
        let expected_version = task.sync_version;
        task.release(reason).map_err(SwarmError::InvalidState)?;
        self.tasks.update(&task, expected_version).await?;
        self.record_change(EntityKind::Task, &task.id, ChangeOp::Update, serde_json::to_value(&task)?).await?;
        Ok(task)
    }

    pub async fn update_progress(&self, id: &str) -> SwarmResult<Task> {
        let mut task = self.tasks.get(id).await?.ok_or_else(|| SwarmError::NotFound(format!("task {id}")))?;
        let expected_version = task.sync_version;
        task.update_progress().map_err(SwarmError::InvalidState)?;
        self.tasks.update(&task, expected_version).await?;
        self.record_change(EntityKind::Task, &task.id, ChangeOp::Update, serde_json::to_value(&task)?).await?;
        Ok(task)
    }

    /// Complete a task and cascade-unblock its dependents (S1).
    pub async fn complete(&self, id: &str, result: Option<serde_json::Value>) -> SwarmResult<Task> {
        let mut task = self.tasks.get(id).await?.ok_or_else(|| SwarmError::NotFound(format!("task {id}")))?;
        let expected_version = task.sync_version;
        task.complete(result).map_err(SwarmError::InvalidState)?;
        self.tasks.update(&task, expected_version).await?;
        self.record_change(EntityKind::Task, &task.id, ChangeOp::Update, serde_json::to_value(&task)?).await?;

        let unblocked = self.tasks.unblock_ready_dependents(id).await?;
        for dependent_id in &unblocked {
            if let Some(dependent) = self.tasks.get(dependent_id).await? {
                self.record_change(EntityKind::Task, dependent_id, ChangeOp::Update, serde_json::to_value(&dependent)?).await?;
            }
        }
        tracing::info!(task_id = %task.id, unblocked_count = unblocked.len(), "task completed");
        Ok(task)
    }

    /// Fail a task. Recoverable failures within the retry budget (P3) move
    /// to `pending_retry` with exponential backoff; others terminate.
    pub async fn fail(&self, id: &str, failure: TaskFailure, backoff_base_ms: u64, backoff_max_ms: u64) -> SwarmResult<Task> {
        let mut task = self.tasks.get(id).await?.ok_or_else(|| SwarmError::NotFound(format!("task {id}")))?;
        let expected_version = task.sync_version;

        if failure.recoverable && task.can_retry() {
            let exponent = task.retry_count.min(16);
            task.retry_count += 1;
            task.failure_type = Some(failure.failure_type);
            let delay_ms = Self::retry_delay_ms(backoff_base_ms, backoff_max_ms, exponent);
            let next_retry_at = Utc::now() + chrono::Duration::milliseconds(delay_ms as i64);
            task.schedule_retry(&failure.message, next_retry_at).map_err(SwarmError::InvalidState)?;
        } else {
            task.last_error = Some(failure.message.clone());
            task.failure_type = Some(failure.failure_type);
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
        }

        self.tasks.update(&task, expected_version).await?;
        self.record_change(EntityKind::Task, &task.id, ChangeOp::Update, serde_json::to_value(&task)?).await?;
        tracing::warn!(task_id = %task.id, status = task.status.as_str(), "task failed");
        Ok(task)
    }

    /// Move due `pending_retry` tasks back to `ready` (driven by the
    /// runtime governor's poll loop).
    pub async fn promote_due_retries(&self) -> SwarmResult<Vec<String>> {
        let due = self.tasks.list_due_retries(Utc::now()).await?;
        let mut promoted = Vec::new();
        for mut task in due {
            let expected_version = task.sync_version;
            task.next_retry_at = None;
            task.status = TaskStatus::Ready;
            task.updated_at = Utc::now();
            self.tasks.update(&task, expected_version).await?;
            self.record_change(EntityKind::Task, &task.id, ChangeOp::Update, serde_json::to_value(&task)?).await?;
            promoted.push(task.id);
        }
        Ok(promoted)
    }

    /// Release tasks orphaned by agents whose heartbeat went stale.
    pub async fn reclaim_orphaned(&self, stale_agent_ids: &[String]) -> SwarmResult<Vec<String>> {
        let orphaned = self.tasks.list_orphaned(stale_agent_ids).await?;
        let mut reclaimed = Vec::new();
        for mut task in orphaned {
            let expected_version = task.sync_version;
            task.release("agent went stale").map_err(SwarmError::InvalidState)?;
            self.tasks.update(&task, expected_version).await?;
            self.record_change(EntityKind::Task, &task.id, ChangeOp::Update, serde_json::to_value(&task)?).await?;
            reclaimed.push(task.id);
        }
        Ok(reclaimed)
    }
}
