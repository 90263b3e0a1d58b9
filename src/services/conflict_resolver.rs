//! Conflict resolver: wraps the pure [`resolve_conflict`]/[`diff_fields`]
//! functions with a bounded in-memory diagnostics log (C10).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::models::{diff_fields, resolve_conflict, ConflictSide, ConflictStrategy, ConflictWinner, FieldConflict};

/// Most recent conflict resolutions retained for diagnostics (spec.md §4.10).
const MAX_LOG_ENTRIES: usize = 1_000;

#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub entity_id: String,
    pub winner: ConflictWinner,
    pub fields: Vec<FieldConflict>,
    pub resolved_at: DateTime<Utc>,
}

pub struct ConflictResolver {
    strategy: ConflictStrategy,
    log: Mutex<VecDeque<ConflictRecord>>,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy, log: Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES)) }
    }

    /// Resolve one entity's local/remote conflict and append a diagnostic
    /// record, evicting the oldest entry once the log is at capacity.
    pub fn resolve(&self, entity_id: &str, local: &ConflictSide, remote: &ConflictSide) -> ConflictWinner {
        let winner = resolve_conflict(local, remote, self.strategy);
        let fields = diff_fields(&local.payload, &remote.payload);

        if !fields.is_empty() {
            tracing::info!(entity_id, ?winner, field_count = fields.len(), "conflict resolved");
        }

        let record = ConflictRecord { entity_id: entity_id.to_string(), winner: winner.clone(), fields, resolved_at: Utc::now() };
        let mut log = self.log.lock().expect("conflict log mutex poisoned");
        if log.len() == MAX_LOG_ENTRIES {
            log.pop_front();
        }
        log.push_back(record);

        winner
    }

    pub fn recent(&self) -> Vec<ConflictRecord> {
        self.log.lock().expect("conflict log mutex poisoned").iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_records_field_diffs() {
        let resolver = ConflictResolver::new(ConflictStrategy::LastWriteWins);
        let now = Utc::now();
        let local = ConflictSide::new(now - chrono::Duration::seconds(10), serde_json::json!({"status": "ready"}));
        let remote = ConflictSide::new(now, serde_json::json!({"status": "claimed"}));

        let winner = resolver.resolve("task-1", &local, &remote);
        assert_eq!(winner, ConflictWinner::Remote);

        let recent = resolver.recent();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].fields.len(), 1);
        assert_eq!(recent[0].fields[0].field, "status");
    }

    #[test]
    fn p7_batch_resolution_equals_element_wise_resolution() {
        let now = Utc::now();
        let pairs = [
            (ConflictSide::new(now - chrono::Duration::seconds(10), serde_json::json!({"a": 1})), ConflictSide::new(now, serde_json::json!({"a": 2}))),
            (ConflictSide::new(now, serde_json::json!({"b": 1})), ConflictSide::new(now - chrono::Duration::seconds(10), serde_json::json!({"b": 2}))),
            (ConflictSide::new(now, serde_json::json!({"c": 1})), ConflictSide::new(now, serde_json::json!({"c": 1}))),
        ];

        let batch_resolver = ConflictResolver::new(ConflictStrategy::LastWriteWins);
        let batch_winners: Vec<ConflictWinner> = pairs.iter().enumerate().map(|(i, (local, remote))| batch_resolver.resolve(&format!("e{i}"), local, remote)).collect();

        let elementwise_winners: Vec<ConflictWinner> = pairs
            .iter()
            .enumerate()
            .map(|(i, (local, remote))| ConflictResolver::new(ConflictStrategy::LastWriteWins).resolve(&format!("e{i}"), local, remote))
            .collect();

        assert_eq!(batch_winners, elementwise_winners, "resolving as a batch must not change any individual outcome");
    }

    #[test]
    fn log_evicts_oldest_beyond_capacity() {
        let resolver = ConflictResolver::new(ConflictStrategy::PreferLocal);
        let side = ConflictSide::new(Utc::now(), serde_json::json!({}));
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            resolver.resolve(&format!("entity-{i}"), &side, &side);
        }
        let recent = resolver.recent();
        assert_eq!(recent.len(), MAX_LOG_ENTRIES);
        assert_eq!(recent[0].entity_id, "entity-5");
    }
}
