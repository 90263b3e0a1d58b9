//! Sync cursor bookkeeping and deterministic conflict resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracks this node's progress against the remote replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub last_pushed_version: u64,
    pub last_pulled_cursor: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_pushed_version: 0,
            last_pulled_cursor: None,
            last_synced_at: None,
            last_error: None,
        }
    }
}

/// Strategy used to pick a winner when local and remote both changed the
/// same entity since the last sync (spec.md §5, C10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    LastWriteWins,
    FirstWriteWins,
    PreferLocal,
    PreferRemote,
}

/// One side of a conflicting change: its timestamps and an opaque
/// payload snapshot. `updated_at` is optional because an entity pulled
/// from a legacy or partial source may carry no update timestamp at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSide {
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
}

impl ConflictSide {
    pub fn new(updated_at: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self { updated_at: Some(updated_at), deleted_at: None, payload }
    }

    pub fn deleted(deleted_at: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self { updated_at: None, deleted_at: Some(deleted_at), payload }
    }
}

/// Outcome of resolving a conflict: which side won and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConflictWinner {
    Local,
    Remote,
}

/// Pure, deterministic conflict resolution (property P7): given the same
/// `(local, remote, strategy)` triple, always returns the same winner.
pub fn resolve_conflict(local: &ConflictSide, remote: &ConflictSide, strategy: ConflictStrategy) -> ConflictWinner {
    match strategy {
        ConflictStrategy::LastWriteWins => resolve_lww(local, remote),
        ConflictStrategy::FirstWriteWins => {
            match (local.updated_at, remote.updated_at) {
                (Some(l), Some(r)) if r < l => ConflictWinner::Remote,
                _ => ConflictWinner::Local,
            }
        }
        ConflictStrategy::PreferLocal => ConflictWinner::Local,
        ConflictStrategy::PreferRemote => ConflictWinner::Remote,
    }
}

/// Deletion-aware last-write-wins (spec.md §4.10, rules 1-3).
fn resolve_lww(local: &ConflictSide, remote: &ConflictSide) -> ConflictWinner {
    match (local.deleted_at, remote.deleted_at) {
        (Some(l_del), Some(r_del)) => {
            // Both sides deleted: the newer deletion wins, local on a tie.
            if r_del > l_del {
                ConflictWinner::Remote
            } else {
                ConflictWinner::Local
            }
        }
        (Some(l_del), None) => {
            // Only local deleted: confirmed if the deletion is at least as
            // new as remote's last update, otherwise remote resurrects it.
            match remote.updated_at {
                Some(r_upd) if l_del < r_upd => ConflictWinner::Remote,
                _ => ConflictWinner::Local,
            }
        }
        (None, Some(r_del)) => match local.updated_at {
            Some(l_upd) if r_del < l_upd => ConflictWinner::Local,
            _ => ConflictWinner::Remote,
        },
        (None, None) => match (local.updated_at, remote.updated_at) {
            (None, None) => ConflictWinner::Local,
            (None, Some(_)) => ConflictWinner::Remote,
            (Some(_), None) => ConflictWinner::Local,
            (Some(l), Some(r)) => {
                if r > l {
                    ConflictWinner::Remote
                } else {
                    ConflictWinner::Local
                }
            }
        },
    }
}

/// One field that differs between the two sides of a resolved conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub local: serde_json::Value,
    pub remote: serde_json::Value,
}

/// Fields ignored by [`diff_fields`]: bookkeeping timestamps that always
/// differ and carry no semantic conflict of their own.
const IGNORED_FIELDS: &[&str] = &["updated_at", "created_at", "deleted_at", "last_accessed"];

/// Deep, top-level-key diff between two JSON object payloads, skipping
/// [`IGNORED_FIELDS`]. Keys present on only one side count as a conflict
/// against a JSON `null` on the other.
pub fn diff_fields(local: &serde_json::Value, remote: &serde_json::Value) -> Vec<FieldConflict> {
    let mut fields: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
    if let Some(obj) = local.as_object() {
        fields.extend(obj.keys().map(String::as_str));
    }
    if let Some(obj) = remote.as_object() {
        fields.extend(obj.keys().map(String::as_str));
    }

    fields
        .into_iter()
        .filter(|f| !IGNORED_FIELDS.contains(f))
        .filter_map(|field| {
            let l = local.get(field).cloned().unwrap_or(serde_json::Value::Null);
            let r = remote.get(field).cloned().unwrap_or(serde_json::Value::Null);
            if l != r {
                Some(FieldConflict { field: field.to_string(), local: l, remote: r })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(secs_ago: i64) -> ConflictSide {
        ConflictSide::new(Utc::now() - chrono::Duration::seconds(secs_ago), serde_json::json!({}))
    }

    #[test]
    fn last_write_wins_picks_newer() {
        let local = side(10);
        let remote = side(1);
        assert_eq!(resolve_conflict(&local, &remote, ConflictStrategy::LastWriteWins), ConflictWinner::Remote);
    }

    #[test]
    fn first_write_wins_picks_older() {
        let local = side(10);
        let remote = side(1);
        assert_eq!(resolve_conflict(&local, &remote, ConflictStrategy::FirstWriteWins), ConflictWinner::Local);
    }

    #[test]
    fn prefer_strategies_ignore_timestamps() {
        let local = side(1);
        let remote = side(10);
        assert_eq!(resolve_conflict(&local, &remote, ConflictStrategy::PreferLocal), ConflictWinner::Local);
        assert_eq!(resolve_conflict(&local, &remote, ConflictStrategy::PreferRemote), ConflictWinner::Remote);
    }

    #[test]
    fn resolution_is_deterministic() {
        let local = side(5);
        let remote = side(5);
        let a = resolve_conflict(&local, &remote, ConflictStrategy::LastWriteWins);
        let b = resolve_conflict(&local, &remote, ConflictStrategy::LastWriteWins);
        assert_eq!(a, b);
    }

    #[test]
    fn local_deletion_confirmed_when_newer_than_remote_update() {
        let now = Utc::now();
        let local = ConflictSide::deleted(now, serde_json::json!({}));
        let remote = ConflictSide::new(now - chrono::Duration::seconds(5), serde_json::json!({}));
        assert_eq!(resolve_lww(&local, &remote), ConflictWinner::Local);
    }

    #[test]
    fn remote_update_resurrects_a_stale_local_deletion() {
        let now = Utc::now();
        let local = ConflictSide::deleted(now - chrono::Duration::seconds(10), serde_json::json!({}));
        let remote = ConflictSide::new(now, serde_json::json!({}));
        assert_eq!(resolve_lww(&local, &remote), ConflictWinner::Remote);
    }

    #[test]
    fn both_deleted_newer_deletion_wins_local_on_tie() {
        let t = Utc::now();
        let local = ConflictSide::deleted(t, serde_json::json!({}));
        let remote = ConflictSide::deleted(t, serde_json::json!({}));
        assert_eq!(resolve_lww(&local, &remote), ConflictWinner::Local);
    }

    #[test]
    fn missing_timestamps_default_to_local() {
        let local = ConflictSide { updated_at: None, deleted_at: None, payload: serde_json::json!({}) };
        let remote = ConflictSide { updated_at: None, deleted_at: None, payload: serde_json::json!({}) };
        assert_eq!(resolve_lww(&local, &remote), ConflictWinner::Local);
    }

    #[test]
    fn diff_fields_ignores_bookkeeping_timestamps() {
        let local = serde_json::json!({"status": "ready", "updated_at": "a", "title": "x"});
        let remote = serde_json::json!({"status": "claimed", "updated_at": "b", "title": "x"});
        let diffs = diff_fields(&local, &remote);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "status");
    }
}
