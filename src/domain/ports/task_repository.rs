//! Task repository port.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::{Task, TaskPriority, TaskStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assigned_agent: Option<String>,
    pub required_skill: Option<String>,
    pub task_type: Option<String>,
    pub branch: Option<String>,
    /// Task IDs to omit from the result, regardless of other predicates.
    pub exclude_ids: Vec<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> SwarmResult<()>;

    async fn get(&self, id: &str) -> SwarmResult<Option<Task>>;

    /// Persist `task`, requiring the stored row's `sync_version` to equal
    /// `expected_sync_version` (optimistic concurrency for non-claim
    /// updates). Returns `SwarmError::Conflict` if it has moved on.
    async fn update(&self, task: &Task, expected_sync_version: i64) -> SwarmResult<()>;

    async fn delete(&self, id: &str) -> SwarmResult<()>;

    /// Insert-or-overwrite `task` verbatim, bypassing the `sync_version`
    /// gate and status-transition invariants. Used only by the sync
    /// engine once `ConflictResolver` has already picked a winner.
    async fn upsert_from_sync(&self, task: &Task) -> SwarmResult<()>;

    async fn list(&self, filter: TaskFilter) -> SwarmResult<Vec<Task>>;

    /// Atomically claim one specific `ready` task by id, used by the
    /// scheduler once it has already ranked candidates. Returns `None`
    /// (not an error) if another claimant won the race first.
    async fn claim_specific(&self, task_id: &str, agent_id: &str) -> SwarmResult<Option<Task>>;

    /// Recompute `blocked` -> `ready` transitions for tasks whose
    /// dependencies have all completed (S1 cascade).
    async fn unblock_ready_dependents(&self, completed_task_id: &str) -> SwarmResult<Vec<String>>;

    /// All tasks directly or transitively depending on `task_id`.
    async fn list_dependents(&self, task_id: &str) -> SwarmResult<Vec<Task>>;

    /// Tasks whose `next_retry_at` has elapsed and are in `pending_retry`.
    async fn list_due_retries(&self, now: chrono::DateTime<chrono::Utc>) -> SwarmResult<Vec<Task>>;

    /// Tasks claimed/in_progress by agents now considered stale.
    async fn list_orphaned(&self, stale_agent_ids: &[String]) -> SwarmResult<Vec<Task>>;
}
