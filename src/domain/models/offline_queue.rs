//! Offline queue: change-log entries pending push to the remote replica
//! while connectivity is degraded, with exponential backoff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuedChangeStatus {
    Pending,
    InFlight,
    Failed,
    Delivered,
}

impl QueuedChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Failed => "failed",
            Self::Delivered => "delivered",
        }
    }
}

/// A change-log entry awaiting delivery to the remote replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedChange {
    pub id: String,
    pub sync_version: u64,
    pub status: QueuedChangeStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Backoff schedule parameters (spec.md §5, C9).
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self { base_ms: 1_000, max_ms: 60_000, multiplier: 2.0 }
    }
}

impl BackoffPolicy {
    /// Delay before the `(attempt_count + 1)`th attempt: `base * multiplier^attempts`
    /// plus jitter, capped at `max_ms`. The project has no `rand` dependency, so
    /// jitter is drawn from sub-nanosecond system time rather than a PRNG.
    pub fn delay_ms(&self, attempt_count: u32) -> u64 {
        let raw = self.base_ms as f64 * self.multiplier.powi(attempt_count as i32);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let jitter = (nanos % raw.max(1.0) as u32) as f64;
        (raw + jitter).min(self.max_ms as f64) as u64
    }
}

impl QueuedChange {
    pub fn new(sync_version: u64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sync_version,
            status: QueuedChangeStatus::Pending,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, QueuedChangeStatus::Pending | QueuedChangeStatus::Failed) && self.next_attempt_at <= now
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, policy: &BackoffPolicy) {
        self.attempt_count += 1;
        self.last_error = Some(error.into());
        self.status = QueuedChangeStatus::Failed;
        self.next_attempt_at = Utc::now() + chrono::Duration::milliseconds(policy.delay_ms(self.attempt_count) as i64);
    }

    pub fn mark_delivered(&mut self) {
        self.status = QueuedChangeStatus::Delivered;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let p = BackoffPolicy::default();
        assert!(p.delay_ms(0) >= 1_000 && p.delay_ms(0) < 2_000);
        assert!(p.delay_ms(1) >= 2_000 && p.delay_ms(1) < 4_000);
        assert!(p.delay_ms(2) >= 4_000 && p.delay_ms(2) < 8_000);
        assert_eq!(p.delay_ms(20), p.max_ms);
    }

    #[test]
    fn newly_queued_change_is_due_immediately() {
        let c = QueuedChange::new(1);
        assert!(c.is_due(Utc::now()));
    }

    #[test]
    fn failed_change_is_not_due_until_backoff_elapses() {
        let mut c = QueuedChange::new(1);
        let policy = BackoffPolicy::default();
        c.mark_failed("boom", &policy);
        assert!(!c.is_due(Utc::now()));
        assert!(c.is_due(Utc::now() + chrono::Duration::seconds(5)));
    }

    #[test]
    fn delivered_change_is_never_due_again() {
        let mut c = QueuedChange::new(1);
        c.mark_delivered();
        assert!(!c.is_due(Utc::now() + chrono::Duration::days(1)));
    }
}
