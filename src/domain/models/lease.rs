//! File lease model: an exclusive, TTL-bounded claim on a file path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lease {
    pub file_path: String,
    pub agent_id: String,
    pub task_id: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub renewed_count: u32,
}

impl Lease {
    pub fn new(file_path: impl Into<String>, agent_id: impl Into<String>, task_id: Option<String>, duration_ms: i64) -> Self {
        let now = Utc::now();
        Self {
            file_path: file_path.into(),
            agent_id: agent_id.into(),
            task_id,
            acquired_at: now,
            expires_at: now + chrono::Duration::milliseconds(duration_ms),
            renewed_count: 0,
        }
    }

    /// A lease is considered absent once `now > expires_at` (spec.md §3).
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
