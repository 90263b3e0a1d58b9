//! Offline queue drain: feeds due entries to the sync engine's push path
//! and records success/failure with exponential backoff (C9).

use std::sync::Arc;

use chrono::Utc;

use crate::domain::error::SwarmResult;
use crate::domain::models::{BackoffPolicy, QueuedChange};
use crate::domain::ports::OfflineQueueRepository;

pub struct OfflineQueueService<O: OfflineQueueRepository> {
    queue: Arc<O>,
    backoff: BackoffPolicy,
}

impl<O: OfflineQueueRepository> OfflineQueueService<O> {
    pub fn new(queue: Arc<O>, backoff: BackoffPolicy) -> Self {
        Self { queue, backoff }
    }

    pub async fn enqueue(&self, sync_version: u64) -> SwarmResult<()> {
        self.queue.enqueue(&QueuedChange::new(sync_version)).await
    }

    pub async fn due(&self, limit: u32) -> SwarmResult<Vec<QueuedChange>> {
        self.queue.list_due(Utc::now(), limit).await
    }

    pub async fn mark_delivered(&self, mut change: QueuedChange) -> SwarmResult<()> {
        change.mark_delivered();
        self.queue.update(&change).await
    }

    pub async fn mark_failed(&self, mut change: QueuedChange, error: impl Into<String>) -> SwarmResult<()> {
        change.mark_failed(error, &self.backoff);
        tracing::warn!(change_id = %change.id, attempt = change.attempt_count, next_attempt_at = %change.next_attempt_at, "offline push attempt failed");
        self.queue.update(&change).await
    }

    pub async fn pending_count(&self) -> SwarmResult<u64> {
        self.queue.count_pending().await
    }
}
