//! Thin read-side wrapper over the change log, consumed by the sync
//! engine to page through local history. Appends happen inline inside
//! each registry's own change-recording path, under the shared
//! [`super::sync_version::SyncVersionCounter`].

use std::sync::Arc;

use crate::domain::error::SwarmResult;
use crate::domain::models::{ChangeLogEntry, EntityKind};
use crate::domain::ports::ChangeLogRepository;

pub struct ChangeLogService<C: ChangeLogRepository> {
    change_log: Arc<C>,
}

impl<C: ChangeLogRepository> ChangeLogService<C> {
    pub fn new(change_log: Arc<C>) -> Self {
        Self { change_log }
    }

    pub async fn since(&self, cursor: u64, limit: u32) -> SwarmResult<Vec<ChangeLogEntry>> {
        self.change_log.list_since(cursor, limit).await
    }

    pub async fn latest_version(&self) -> SwarmResult<u64> {
        self.change_log.latest_version().await
    }

    pub async fn history_for(&self, kind: EntityKind, entity_id: &str) -> SwarmResult<Vec<ChangeLogEntry>> {
        self.change_log.list_for_entity(kind, entity_id).await
    }

    /// Per-entity deduplicated view of everything since `since_version`,
    /// restricted to `entity_types` when non-empty.
    pub async fn get_latest_changes(&self, since_version: u64, entity_types: &[EntityKind]) -> SwarmResult<Vec<ChangeLogEntry>> {
        self.change_log.latest_changes_since(since_version, entity_types).await
    }

    /// Delete rows at or below `before_version`, keeping the newest row per
    /// entity so full-state reconstruction remains possible.
    pub async fn compact(&self, before_version: u64) -> SwarmResult<u64> {
        let deleted = self.change_log.compact(before_version).await?;
        if deleted > 0 {
            tracing::debug!(deleted, before_version, "change log compacted");
        }
        Ok(deleted)
    }

    /// Default trigger for [`Self::adaptive_compact`]: compact once the
    /// table exceeds this many rows.
    pub const ADAPTIVE_COMPACT_THRESHOLD: u64 = 10_000;

    /// When the change log exceeds [`Self::ADAPTIVE_COMPACT_THRESHOLD`]
    /// rows, compact everything up to the current latest version, which
    /// collapses the table to one row per entity.
    pub async fn adaptive_compact(&self) -> SwarmResult<u64> {
        if self.change_log.count().await? <= Self::ADAPTIVE_COMPACT_THRESHOLD {
            return Ok(0);
        }
        let latest = self.change_log.latest_version().await?;
        self.compact(latest).await
    }
}
