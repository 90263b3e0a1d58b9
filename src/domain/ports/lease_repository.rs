//! File lease repository port.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::Lease;

#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Acquire an exclusive lease on `file_path`, failing with
    /// `SwarmError::LeaseHeld` if a live lease already exists for it
    /// (P4). Expired leases are treated as absent and silently replaced.
    async fn acquire(&self, lease: &Lease) -> SwarmResult<()>;

    async fn get(&self, file_path: &str) -> SwarmResult<Option<Lease>>;

    /// The canonical live-read: if the stored lease's `expires_at` has
    /// passed, delete it and return absent; otherwise return it. Every
    /// other reader of lease state should route through this rather than
    /// `get`, which does not delete-on-read.
    async fn check(&self, file_path: &str) -> SwarmResult<Option<Lease>>;

    async fn renew(&self, file_path: &str, agent_id: &str, extend_by_ms: i64) -> SwarmResult<Lease>;

    async fn release(&self, file_path: &str, agent_id: &str) -> SwarmResult<()>;

    /// Unconditional delete, regardless of holder. Used by cleanup sweeps
    /// and the agent deregister cascade.
    async fn force_release(&self, file_path: &str) -> SwarmResult<()>;

    async fn list_by_agent(&self, agent_id: &str) -> SwarmResult<Vec<Lease>>;

    /// Unconditional delete of every lease held by `agent_id`.
    async fn release_all(&self, agent_id: &str) -> SwarmResult<u64>;

    /// Delete every lease whose `expires_at` has passed.
    async fn reap_expired(&self, now: chrono::DateTime<chrono::Utc>) -> SwarmResult<u64>;
}
