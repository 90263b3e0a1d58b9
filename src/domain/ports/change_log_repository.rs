//! Change log repository port: the append-only journal that drives sync.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::{ChangeLogEntry, EntityKind};

#[async_trait]
pub trait ChangeLogRepository: Send + Sync {
    /// Append `entry` under the caller-held monotonic sequence guarantee
    /// (spec.md §5: single-writer lock around sequence assignment).
    async fn append(&self, entry: &ChangeLogEntry) -> SwarmResult<()>;

    /// Entries with `sync_version > since`, ascending, capped at `limit`.
    async fn list_since(&self, since: u64, limit: u32) -> SwarmResult<Vec<ChangeLogEntry>>;

    async fn latest_version(&self) -> SwarmResult<u64>;

    async fn list_for_entity(&self, kind: EntityKind, entity_id: &str) -> SwarmResult<Vec<ChangeLogEntry>>;

    /// Entries with `sync_version > since`, restricted to `entity_types`
    /// when non-empty, deduplicated to the newest row per (entity_type,
    /// entity_id).
    async fn latest_changes_since(&self, since: u64, entity_types: &[EntityKind]) -> SwarmResult<Vec<ChangeLogEntry>>;

    /// Delete rows with `sync_version <= before_version` except the newest
    /// row per entity. Returns the number of rows deleted.
    async fn compact(&self, before_version: u64) -> SwarmResult<u64>;

    /// Total row count, used to decide whether `adaptiveCompact` should run.
    async fn count(&self) -> SwarmResult<u64>;
}
