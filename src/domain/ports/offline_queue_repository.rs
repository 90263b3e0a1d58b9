//! Offline queue repository port.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::QueuedChange;

#[async_trait]
pub trait OfflineQueueRepository: Send + Sync {
    async fn enqueue(&self, change: &QueuedChange) -> SwarmResult<()>;

    /// Due entries (`status` in `{pending, failed}` and `next_attempt_at`
    /// elapsed), ordered by `sync_version` ascending.
    async fn list_due(&self, now: chrono::DateTime<chrono::Utc>, limit: u32) -> SwarmResult<Vec<QueuedChange>>;

    async fn update(&self, change: &QueuedChange) -> SwarmResult<()>;

    async fn count_pending(&self) -> SwarmResult<u64>;
}
