//! Agent domain model: a live worker process that claims and runs tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
    ShuttingDown,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Error => "error",
            Self::Offline => "offline",
            Self::ShuttingDown => "shutting_down",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "busy" => Some(Self::Busy),
            "error" => Some(Self::Error),
            "offline" => Some(Self::Offline),
            "shutting_down" => Some(Self::ShuttingDown),
            _ => None,
        }
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Phase of the current task the agent reports itself in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Analyzing,
    Planning,
    Implementing,
    Testing,
    Reviewing,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Testing => "testing",
            Self::Reviewing => "reviewing",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "analyzing" => Some(Self::Analyzing),
            "planning" => Some(Self::Planning),
            "implementing" => Some(Self::Implementing),
            "testing" => Some(Self::Testing),
            "reviewing" => Some(Self::Reviewing),
            _ => None,
        }
    }
}

/// Declared execution capabilities, consulted by task routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub runs_tests: bool,
    pub runs_build: bool,
    pub runs_browser: bool,
}

/// Host machine info reported at registration, for diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
}

/// A live worker process that registers, heartbeats, and claims tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub agent_type: String,
    pub status: AgentStatus,
    pub skills: Vec<String>,
    pub capabilities: CapabilityFlags,
    pub max_task_minutes: Option<u32>,
    pub last_heartbeat: DateTime<Utc>,
    pub heartbeat_count: u64,
    pub current_task_id: Option<String>,
    pub current_task_progress: f32,
    pub current_task_phase: Option<TaskPhase>,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_runtime_minutes: f64,
    pub machine: MachineInfo,
    pub pid: Option<u32>,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_type: impl Into<String>, skills: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            status: AgentStatus::Idle,
            skills,
            capabilities: CapabilityFlags::default(),
            max_task_minutes: None,
            last_heartbeat: now,
            heartbeat_count: 0,
            current_task_id: None,
            current_task_progress: 0.0,
            current_task_phase: None,
            tasks_completed: 0,
            tasks_failed: 0,
            total_runtime_minutes: 0.0,
            machine: MachineInfo::default(),
            pid: None,
            registered_at: now,
            last_active_at: now,
        }
    }

    /// Whether `skills` contains every entry of `required`, by exact
    /// string equality after normalization (lowercase, trimmed) — the
    /// hard eligibility gate per spec.md §4.4 step 2.
    pub fn has_all_skills(&self, required: &[String]) -> bool {
        required.iter().all(|req| {
            let req_norm = normalize_skill(req);
            self.skills.iter().any(|s| normalize_skill(s) == req_norm)
        })
    }

    /// `now - last_heartbeat > threshold_ms` per spec.md §3 Agent invariants.
    pub fn is_stale(&self, threshold_ms: i64, now: DateTime<Utc>) -> bool {
        self.status != AgentStatus::Offline && (now - self.last_heartbeat).num_milliseconds() > threshold_ms
    }
}

/// Normalize a skill string for case/whitespace-insensitive comparison.
pub fn normalize_skill(skill: &str) -> String {
    skill.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_all_skills_exact_match() {
        let a = Agent::new("a1", "n", "worker", vec!["typescript".into(), "rust".into()]);
        assert!(a.has_all_skills(&["rust".into()]));
        assert!(!a.has_all_skills(&["python".into()]));
    }

    #[test]
    fn has_all_skills_normalizes_case() {
        let a = Agent::new("a1", "n", "worker", vec!["TypeScript".into()]);
        assert!(a.has_all_skills(&["typescript".into()]));
    }

    #[test]
    fn staleness_detection() {
        let mut a = Agent::new("a1", "n", "worker", vec![]);
        a.last_heartbeat = Utc::now() - chrono::Duration::seconds(120);
        assert!(a.is_stale(60_000, Utc::now()));
        assert!(!a.is_stale(180_000, Utc::now()));
    }

    #[test]
    fn offline_agents_are_never_stale() {
        let mut a = Agent::new("a1", "n", "worker", vec![]);
        a.status = AgentStatus::Offline;
        a.last_heartbeat = Utc::now() - chrono::Duration::hours(10);
        assert!(!a.is_stale(60_000, Utc::now()));
    }
}
