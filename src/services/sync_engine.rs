//! Sync engine: pushes local change-log entries to a remote replica and
//! pulls remote deltas back, resolving conflicts deterministically (C11).
//!
//! Remote deltas are applied back through the same registries that
//! produced them locally: `task` changes merge through `TaskRegistry`'s
//! conflict-aware path, `message`/`quality_snapshot` changes are
//! idempotent inserts (both are append-only logs, never updated in
//! place, so there is nothing for the conflict resolver to adjudicate).
//! `agent`/`lease` changes are node-local runtime state and are pushed
//! for audit only; they are never pulled back.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{ChangeLogEntry, ConflictSide, EntityKind, Message, QualitySnapshot, Task};
use crate::domain::ports::{ChangeLogRepository, MessageRepository, OfflineQueueRepository, PullResponse, PushRequest, QualityRepository, SyncClient, TaskRepository};

use super::conflict_resolver::ConflictResolver;
use super::offline_queue_service::OfflineQueueService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Syncing,
    Error,
    Offline,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    pub pushed: u64,
    pub pulled: u64,
    pub conflicts: u64,
}

/// Durable sync cursor, persisted as a small JSON file under the sync
/// directory rather than in the primary store (spec.md §4.11 point 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSyncState {
    last_pushed_version: u64,
    last_pulled_cursor: Option<String>,
    last_synced_at: Option<chrono::DateTime<Utc>>,
}

impl Default for PersistedSyncState {
    fn default() -> Self {
        Self { last_pushed_version: 0, last_pulled_cursor: None, last_synced_at: None }
    }
}

pub struct SyncEngineConfig {
    pub client_id: String,
    pub batch_size: u32,
    pub pull_limit: u32,
    pub max_retries: u32,
    pub state_file_path: PathBuf,
}

pub struct SyncEngine<T: TaskRepository, C: ChangeLogRepository, O: OfflineQueueRepository, S: SyncClient, M: MessageRepository, Q: QualityRepository> {
    tasks: Arc<T>,
    change_log: Arc<C>,
    offline_queue: OfflineQueueService<O>,
    client: Arc<S>,
    resolver: Arc<ConflictResolver>,
    messages: Arc<M>,
    quality: Arc<Q>,
    config: SyncEngineConfig,
    syncing: AtomicBool,
}

impl<T: TaskRepository, C: ChangeLogRepository, O: OfflineQueueRepository, S: SyncClient, M: MessageRepository, Q: QualityRepository> SyncEngine<T, C, O, S, M, Q> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<T>,
        change_log: Arc<C>,
        offline_queue: OfflineQueueService<O>,
        client: Arc<S>,
        resolver: Arc<ConflictResolver>,
        messages: Arc<M>,
        quality: Arc<Q>,
        config: SyncEngineConfig,
    ) -> Self {
        Self { tasks, change_log, offline_queue, client, resolver, messages, quality, config, syncing: AtomicBool::new(false) }
    }

    fn load_state(&self) -> PersistedSyncState {
        std::fs::read_to_string(&self.config.state_file_path).ok().and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
    }

    fn save_state(&self, state: &PersistedSyncState) {
        if let Some(parent) = self.config.state_file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(state) {
            if let Err(err) = std::fs::write(&self.config.state_file_path, json) {
                tracing::warn!(%err, "failed to persist sync state");
            }
        }
    }

    /// Run one full push+pull cycle. Concurrent calls fail fast rather
    /// than queueing (spec.md §5: an instance-level mutex on `sync()`).
    pub async fn sync(&self) -> SwarmResult<SyncOutcome> {
        if self.syncing.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(SwarmError::ConstraintViolation("sync already in progress".to_string()));
        }
        let result = self.sync_inner().await;
        self.syncing.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_inner(&self) -> SwarmResult<SyncOutcome> {
        let mut state = self.load_state();
        let mut outcome = SyncOutcome::default();

        match self.push(&mut state).await {
            Ok(pushed) => outcome.pushed = pushed,
            Err(err) => return self.handle_sync_error(err, &state).await,
        }

        match self.pull(&mut state).await {
            Ok((pulled, conflicts)) => {
                outcome.pulled = pulled;
                outcome.conflicts = conflicts;
            }
            Err(err) => return self.handle_sync_error(err, &state).await,
        }

        state.last_synced_at = Some(Utc::now());
        self.save_state(&state);
        Ok(outcome)
    }

    async fn handle_sync_error(&self, err: SwarmError, state: &PersistedSyncState) -> SwarmResult<SyncOutcome> {
        self.save_state(state);
        if matches!(err, SwarmError::NetworkError(_) | SwarmError::Timeout(_)) {
            tracing::warn!(%err, "sync offline, queueing pending changes");
        } else {
            tracing::error!(%err, "sync failed");
        }
        Err(err)
    }

    async fn push(&self, state: &mut PersistedSyncState) -> SwarmResult<u64> {
        let mut pushed = 0u64;
        loop {
            let batch = self.change_log.list_since(state.last_pushed_version, self.config.batch_size).await?;
            if batch.is_empty() {
                break;
            }

            let request = PushRequest { changes: batch.clone() };
            let response = self.push_with_retry(request).await;

            match response {
                Ok(response) => {
                    pushed += response.accepted;
                    state.last_pushed_version = batch.last().map(|c| c.sync_version).unwrap_or(state.last_pushed_version);
                }
                Err(err) => {
                    for change in &batch {
                        if let Err(enqueue_err) = self.offline_queue.enqueue(change.sync_version).await {
                            tracing::error!(%enqueue_err, "failed to enqueue change for offline retry");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(pushed)
    }

    async fn push_with_retry(&self, request: PushRequest) -> SwarmResult<crate::domain::ports::PushResponse> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(std::time::Duration::from_secs(1))
            .with_max_elapsed_time(Some(std::time::Duration::from_secs(1 << self.config.max_retries.min(10))))
            .build();

        retry(backoff, || {
            let request = request.clone();
            async move {
                self.client.push(request).await.map_err(|err| {
                    if err.is_retryable() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        })
        .await
    }

    async fn pull(&self, state: &mut PersistedSyncState) -> SwarmResult<(u64, u64)> {
        let mut pulled = 0u64;
        let mut conflicts = 0u64;
        let mut cursor = state.last_pulled_cursor.clone();

        loop {
            let PullResponse { changes, next_cursor } = self.client.pull(cursor.clone(), self.config.pull_limit).await?;
            if changes.is_empty() {
                if let Some(next) = next_cursor {
                    cursor = Some(next);
                    continue;
                }
                break;
            }

            for change in &changes {
                if self.apply_remote_change(change).await? {
                    conflicts += 1;
                }
                pulled += 1;
            }

            state.last_pulled_cursor = next_cursor.clone();
            if next_cursor.is_none() {
                break;
            }
            cursor = next_cursor;
        }

        Ok((pulled, conflicts))
    }

    /// Apply one remote change, returning whether it required conflict
    /// resolution against a pre-existing local entity.
    async fn apply_remote_change(&self, change: &ChangeLogEntry) -> SwarmResult<bool> {
        match change.entity_kind {
            EntityKind::Task => self.apply_remote_task(change).await,
            EntityKind::Message => {
                let remote_message: Message = serde_json::from_value(change.payload.clone())?;
                self.messages.append_if_absent(&remote_message).await?;
                Ok(false)
            }
            EntityKind::QualitySnapshot => {
                let remote_snapshot: QualitySnapshot = serde_json::from_value(change.payload.clone())?;
                if self.quality.get_snapshot(&remote_snapshot.id).await?.is_none() {
                    self.quality.record_snapshot(&remote_snapshot).await?;
                }
                Ok(false)
            }
            EntityKind::Agent | EntityKind::Lease => {
                tracing::debug!(entity_kind = change.entity_kind.as_str(), entity_id = %change.entity_id, "remote change recorded for audit only, node-local state is never pulled back");
                Ok(false)
            }
        }
    }

    async fn apply_remote_task(&self, change: &ChangeLogEntry) -> SwarmResult<bool> {
        let remote_task: Task = serde_json::from_value(change.payload.clone())?;
        let local_task = self.tasks.get(&change.entity_id).await?;

        let Some(local_task) = local_task else {
            self.tasks.upsert_from_sync(&remote_task).await?;
            return Ok(false);
        };

        let local_payload = serde_json::to_value(&local_task)?;
        let remote_payload = serde_json::to_value(&remote_task)?;
        if crate::domain::models::diff_fields(&local_payload, &remote_payload).is_empty() {
            return Ok(false);
        }

        let local_side = ConflictSide::new(local_task.updated_at, local_payload);
        let remote_side = ConflictSide::new(remote_task.updated_at, remote_payload);
        let winner = self.resolver.resolve(&change.entity_id, &local_side, &remote_side);

        if winner == crate::domain::models::ConflictWinner::Remote {
            self.tasks.upsert_from_sync(&remote_task).await?;
        }
        Ok(true)
    }
}
