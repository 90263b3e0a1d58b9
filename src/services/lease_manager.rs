//! Lease manager: exclusive, TTL-bounded file claims (P4).

use std::sync::Arc;

use chrono::Utc;

use crate::domain::error::SwarmResult;
use crate::domain::models::Lease;
use crate::domain::ports::LeaseRepository;

pub struct LeaseManager<L: LeaseRepository> {
    leases: Arc<L>,
    default_duration_ms: i64,
    max_duration_ms: i64,
}

impl<L: LeaseRepository> LeaseManager<L> {
    pub fn new(leases: Arc<L>, default_duration_ms: i64, max_duration_ms: i64) -> Self {
        Self { leases, default_duration_ms, max_duration_ms }
    }

    pub async fn acquire(&self, file_path: &str, agent_id: &str, task_id: Option<String>, duration_ms: Option<i64>) -> SwarmResult<Lease> {
        let duration = duration_ms.unwrap_or(self.default_duration_ms).min(self.max_duration_ms);
        let lease = Lease::new(file_path, agent_id, task_id, duration);
        self.leases.acquire(&lease).await?;
        tracing::info!(%file_path, %agent_id, "lease acquired");
        Ok(lease)
    }

    pub async fn renew(&self, file_path: &str, agent_id: &str, extend_by_ms: i64) -> SwarmResult<Lease> {
        let extend_by_ms = extend_by_ms.min(self.max_duration_ms);
        self.leases.renew(file_path, agent_id, extend_by_ms).await
    }

    /// The canonical live-read (S4): returns the lease only if it has not
    /// expired, deleting it first if it has.
    pub async fn check(&self, file_path: &str) -> SwarmResult<Option<Lease>> {
        self.leases.check(file_path).await
    }

    pub async fn release(&self, file_path: &str, agent_id: &str) -> SwarmResult<()> {
        self.leases.release(file_path, agent_id).await?;
        tracing::info!(%file_path, %agent_id, "lease released");
        Ok(())
    }

    /// Unconditional release regardless of holder, for cleanup sweeps and
    /// the agent deregister cascade.
    pub async fn force_release(&self, file_path: &str) -> SwarmResult<()> {
        self.leases.force_release(file_path).await?;
        tracing::info!(%file_path, "lease force-released");
        Ok(())
    }

    pub async fn list_for_agent(&self, agent_id: &str) -> SwarmResult<Vec<Lease>> {
        self.leases.list_by_agent(agent_id).await
    }

    /// Release every lease held by `agent_id` (agent deregister cascade).
    pub async fn release_all(&self, agent_id: &str) -> SwarmResult<u64> {
        let count = self.leases.release_all(agent_id).await?;
        if count > 0 {
            tracing::info!(%agent_id, count, "all leases released for agent");
        }
        Ok(count)
    }

    /// Delete every lease past its TTL (driven by the runtime governor's
    /// poll loop, since expired leases are logically absent but a stale
    /// row would otherwise linger until the next `acquire` on that path).
    pub async fn reap_expired(&self) -> SwarmResult<u64> {
        let count = self.leases.reap_expired(Utc::now()).await?;
        if count > 0 {
            tracing::debug!(count, "expired leases reaped");
        }
        Ok(count)
    }
}
