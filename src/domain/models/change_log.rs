//! Change-log entries: the append-only record that drives sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which table a change-log entry pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Task,
    Agent,
    Lease,
    Message,
    QualitySnapshot,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Agent => "agent",
            Self::Lease => "lease",
            Self::Message => "message",
            Self::QualitySnapshot => "quality_snapshot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One row of the append-only change log. `sync_version` is a monotonic,
/// process-wide sequence number (spec.md §5, C8) assigned at insert time
/// under the single-writer lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub sync_version: u64,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub op: ChangeOp,
    pub payload: serde_json::Value,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    pub fn new(sync_version: u64, entity_kind: EntityKind, entity_id: impl Into<String>, op: ChangeOp, payload: serde_json::Value, origin: impl Into<String>) -> Self {
        Self {
            sync_version,
            entity_kind,
            entity_id: entity_id.into(),
            op,
            payload,
            origin: origin.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips() {
        assert_eq!(EntityKind::Task.as_str(), "task");
        assert_eq!(EntityKind::QualitySnapshot.as_str(), "quality_snapshot");
    }

    #[test]
    fn constructs_with_given_version() {
        let e = ChangeLogEntry::new(42, EntityKind::Agent, "a1", ChangeOp::Update, serde_json::json!({}), "local");
        assert_eq!(e.sync_version, 42);
        assert_eq!(e.op.as_str(), "update");
    }
}
