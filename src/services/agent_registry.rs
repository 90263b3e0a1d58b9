//! Agent registry: registration, heartbeating, and staleness reaping.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{Agent, AgentStatus, ChangeLogEntry, ChangeOp, EntityKind};
use crate::domain::ports::{AgentRepository, ChangeLogRepository, LeaseRepository};

use super::sync_version::SyncVersionCounter;

pub struct AgentRegistry<A: AgentRepository, C: ChangeLogRepository, L: LeaseRepository> {
    agents: Arc<A>,
    change_log: Arc<C>,
    leases: Arc<L>,
    sync_version: SyncVersionCounter,
    stale_threshold_ms: i64,
}

impl<A: AgentRepository, C: ChangeLogRepository, L: LeaseRepository> AgentRegistry<A, C, L> {
    pub fn new(agents: Arc<A>, change_log: Arc<C>, leases: Arc<L>, sync_version: SyncVersionCounter, stale_threshold_ms: i64) -> Self {
        Self { agents, change_log, leases, sync_version, stale_threshold_ms }
    }

    async fn record_change(&self, id: &str, op: ChangeOp, payload: serde_json::Value) -> SwarmResult<()> {
        let version = self.sync_version.next().await;
        self.change_log.append(&ChangeLogEntry::new(version, EntityKind::Agent, id, op, payload, "local")).await
    }

    pub async fn register(&self, agent: Agent) -> SwarmResult<Agent> {
        self.agents.register(&agent).await?;
        self.record_change(&agent.id, ChangeOp::Insert, serde_json::to_value(&agent)?).await?;
        tracing::info!(agent_id = %agent.id, name = %agent.name, "agent registered");
        Ok(agent)
    }

    pub async fn get(&self, id: &str) -> SwarmResult<Option<Agent>> {
        self.agents.get(id).await
    }

    pub async fn list(&self, status: Option<AgentStatus>) -> SwarmResult<Vec<Agent>> {
        self.agents.list(status).await
    }

    pub async fn heartbeat(&self, id: &str, progress: Option<f32>, phase: Option<String>) -> SwarmResult<()> {
        self.agents.heartbeat(id, progress, phase).await
    }

    /// Find agents whose heartbeat has gone stale and mark them offline
    /// (driven by the runtime governor's poll loop).
    pub async fn reap_stale(&self) -> SwarmResult<Vec<String>> {
        let stale = self.agents.list_stale(self.stale_threshold_ms, Utc::now()).await?;
        let mut reaped = Vec::new();
        for agent in stale {
            self.agents.mark_offline(&agent.id).await?;
            self.record_change(&agent.id, ChangeOp::Update, serde_json::json!({ "status": "offline" })).await?;
            tracing::warn!(agent_id = %agent.id, "agent marked offline after stale heartbeat");
            reaped.push(agent.id);
        }
        Ok(reaped)
    }

    pub async fn stale_agent_ids(&self) -> SwarmResult<Vec<String>> {
        Ok(self.agents.list_stale(self.stale_threshold_ms, Utc::now()).await?.into_iter().map(|a| a.id).collect())
    }

    pub async fn require(&self, id: &str) -> SwarmResult<Agent> {
        self.agents.get(id).await?.ok_or_else(|| SwarmError::NotFound(format!("agent {id}")))
    }

    /// Atomic increments of `tasks_completed`/`tasks_failed` and
    /// `total_runtime_minutes`, recorded for a completed or failed task run.
    pub async fn update_stats(&self, id: &str, completed: bool, runtime_minutes: f64) -> SwarmResult<()> {
        self.agents.update_stats(id, completed, runtime_minutes).await?;
        self.record_change(id, ChangeOp::Update, serde_json::json!({ "completed": completed, "runtime_minutes": runtime_minutes })).await
    }

    /// Delete the agent and cascade-release every lease it holds.
    pub async fn deregister(&self, id: &str) -> SwarmResult<()> {
        self.leases.release_all(id).await?;
        self.agents.delete(id).await?;
        self.record_change(id, ChangeOp::Delete, serde_json::Value::Null).await?;
        tracing::info!(agent_id = %id, "agent deregistered");
        Ok(())
    }
}
