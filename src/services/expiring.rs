//! TTL-bounded dedup set (C13): tracks recently-seen keys with automatic
//! eviction either by elapsed TTL or by a maximum-size, oldest-first bound.
//! Used for per-receiver message delivery dedup (C6) and sync-side
//! idempotency tracking (C11).

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

pub struct ExpiringSet<K: Eq + Hash + Clone> {
    entries: HashMap<K, DateTime<Utc>>,
    ttl: Duration,
    max_entries: usize,
}

impl<K: Eq + Hash + Clone> ExpiringSet<K> {
    pub fn new(ttl_ms: i64, max_entries: usize) -> Self {
        Self { entries: HashMap::new(), ttl: Duration::milliseconds(ttl_ms), max_entries }
    }

    /// Insert `key` as seen now. If the set is at capacity, the single
    /// oldest entry is evicted first regardless of whether it has expired.
    pub fn insert(&mut self, key: K) {
        self.sweep(Utc::now());
        if self.entries.len() >= self.max_entries {
            if let Some(oldest) = self.entries.iter().min_by_key(|(_, seen_at)| **seen_at).map(|(k, _)| k.clone()) {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, Utc::now());
    }

    /// Whether `key` was inserted and has not since expired.
    pub fn contains(&mut self, key: &K) -> bool {
        self.sweep(Utc::now());
        self.entries.contains_key(key)
    }

    /// Insert-if-absent, returning whether this is the first time `key`
    /// has been seen within its TTL window (the dedup check-and-set).
    pub fn check_and_insert(&mut self, key: K) -> bool {
        if self.contains(&key) {
            false
        } else {
            self.insert(key);
            true
        }
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, seen_at| now.signed_duration_since(*seen_at) < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_and_insert_is_true_only_first_time() {
        let mut set: ExpiringSet<String> = ExpiringSet::new(60_000, 100);
        assert!(set.check_and_insert("a".to_string()));
        assert!(!set.check_and_insert("a".to_string()));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut set: ExpiringSet<String> = ExpiringSet::new(0, 100);
        set.insert("a".to_string());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(!set.contains(&"a".to_string()));
    }

    #[test]
    fn oldest_entry_evicted_at_capacity() {
        let mut set: ExpiringSet<String> = ExpiringSet::new(60_000, 2);
        set.insert("a".to_string());
        set.insert("b".to_string());
        set.insert("c".to_string());
        assert_eq!(set.len(), 2);
        assert!(!set.contains(&"a".to_string()));
        assert!(set.contains(&"c".to_string()));
    }
}
