//! Agent repository port.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::{Agent, AgentStatus};

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn register(&self, agent: &Agent) -> SwarmResult<()>;

    async fn get(&self, id: &str) -> SwarmResult<Option<Agent>>;

    async fn update(&self, agent: &Agent) -> SwarmResult<()>;

    async fn list(&self, status: Option<AgentStatus>) -> SwarmResult<Vec<Agent>>;

    /// Bump `last_heartbeat`/`heartbeat_count` and optionally the reported
    /// task progress/phase, in one round trip.
    async fn heartbeat(&self, id: &str, progress: Option<f32>, phase: Option<String>) -> SwarmResult<()>;

    /// Agents whose `last_heartbeat` is older than `threshold_ms` and are
    /// not already `offline`.
    async fn list_stale(&self, threshold_ms: i64, now: chrono::DateTime<chrono::Utc>) -> SwarmResult<Vec<Agent>>;

    async fn mark_offline(&self, id: &str) -> SwarmResult<()>;

    /// Atomically bump `tasks_completed` or `tasks_failed` (depending on
    /// `completed`) and add `runtime_minutes` to `total_runtime_minutes`.
    async fn update_stats(&self, id: &str, completed: bool, runtime_minutes: f64) -> SwarmResult<()>;

    /// Delete the agent row outright. Callers must cascade-release its
    /// leases in the same logical operation (AgentRegistry::deregister).
    async fn delete(&self, id: &str) -> SwarmResult<()>;
}
