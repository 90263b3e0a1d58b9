//! Task domain model: the unit of work agents claim and execute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task.
///
/// `Pending` is reachable only in principle (spec.md §3): `create()`
/// always resolves a new task directly to `Blocked` or `Ready` per
/// invariant I2, so no engine path in this crate ever produces `Pending`.
/// It is kept in the enum for fidelity with the data model and for any
/// external producer that inserts a task row directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Claimed,
    InProgress,
    PendingRetry,
    Blocked,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Claimed => "claimed",
            Self::InProgress => "in_progress",
            Self::PendingRetry => "pending_retry",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "claimed" => Some(Self::Claimed),
            "in_progress" => Some(Self::InProgress),
            "pending_retry" => Some(Self::PendingRetry),
            "blocked" => Some(Self::Blocked),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses per invariant I5: `completed`/`failed` do not
    /// transition further except via `release`, which only applies to
    /// `claimed`/`in_progress` tasks and never to a terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Blocked, Self::Ready],
            Self::Blocked => &[Self::Ready],
            Self::Ready => &[Self::Claimed],
            Self::Claimed => &[Self::InProgress, Self::Ready, Self::PendingRetry],
            Self::InProgress => &[Self::Completed, Self::Failed, Self::PendingRetry, Self::Ready],
            Self::PendingRetry => &[Self::Ready],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Priority level. `Ord` ranks `Critical` highest, matching the
/// priority-desc ordering required by `list`/`claim`/the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Why a task failed, used to decide recoverability and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    TaskError,
    TaskTimeout,
    DependencyError,
    QualityFailure,
    ResourceError,
    AgentCrash,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskError => "task_error",
            Self::TaskTimeout => "task_timeout",
            Self::DependencyError => "dependency_error",
            Self::QualityFailure => "quality_failure",
            Self::ResourceError => "resource_error",
            Self::AgentCrash => "agent_crash",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task_error" => Some(Self::TaskError),
            "task_timeout" => Some(Self::TaskTimeout),
            "dependency_error" => Some(Self::DependencyError),
            "quality_failure" => Some(Self::QualityFailure),
            "resource_error" => Some(Self::ResourceError),
            "agent_crash" => Some(Self::AgentCrash),
            _ => None,
        }
    }
}

/// A reported task failure, passed into `TaskRegistry::fail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub failure_type: FailureType,
    pub message: String,
    pub recoverable: bool,
}

/// A discrete unit of work an agent can claim and execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub task_type: String,
    pub required_skills: Vec<String>,
    pub dependencies: Vec<String>,
    pub blockers: Vec<String>,
    pub files: Vec<String>,
    pub assigned_agent: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_minutes: Option<f64>,
    pub actual_minutes: Option<f64>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub failure_type: Option<FailureType>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub previous_agents: Vec<String>,
    pub result: Option<serde_json::Value>,
    pub branch: Option<String>,
    pub quality_snapshot_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sync_version: i64,
}

impl Task {
    /// Default retry budget per spec.md §3.
    pub const DEFAULT_MAX_RETRIES: u32 = 2;

    /// Create a new task. Status is resolved per invariant I2: `blocked`
    /// if `dependencies` is non-empty, `ready` otherwise. Callers that
    /// want to supply `dependencies` after construction should call
    /// [`Task::resolve_initial_status`] before persisting.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Ready,
            priority: TaskPriority::default(),
            task_type: "standard".to_string(),
            required_skills: Vec::new(),
            dependencies: Vec::new(),
            blockers: Vec::new(),
            files: Vec::new(),
            assigned_agent: None,
            claimed_at: None,
            started_at: None,
            completed_at: None,
            estimated_minutes: None,
            actual_minutes: None,
            retry_count: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            last_error: None,
            failure_type: None,
            next_retry_at: None,
            previous_agents: Vec::new(),
            result: None,
            branch: None,
            quality_snapshot_id: None,
            created_at: now,
            updated_at: now,
            sync_version: 0,
        }
    }

    pub fn with_dependency(mut self, task_id: impl Into<String>) -> Self {
        let id = task_id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self.resolve_initial_status();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_required_skills(mut self, skills: Vec<String>) -> Self {
        self.required_skills = skills;
        self
    }

    /// Apply invariant I2 to a freshly-constructed task (dependencies
    /// non-empty ⇒ blocked, else ready). Only meaningful before claim.
    pub fn resolve_initial_status(&mut self) {
        if self.status == TaskStatus::Ready || self.status == TaskStatus::Blocked {
            self.status = if self.dependencies.is_empty() { TaskStatus::Ready } else { TaskStatus::Blocked };
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("task title cannot be empty".to_string());
        }
        if self.dependencies.contains(&self.id) {
            return Err("task cannot depend on itself".to_string());
        }
        if self.max_retries < self.retry_count {
            return Err("max_retries cannot be less than retry_count".to_string());
        }
        Ok(())
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!("cannot transition from {} to {}", self.status.as_str(), new_status.as_str()));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Invariant I1: `assigned_agent` is set iff status ∈ {claimed, in_progress}.
    pub fn claim(&mut self, agent_id: impl Into<String>) -> Result<(), String> {
        self.transition_to(TaskStatus::Claimed)?;
        self.assigned_agent = Some(agent_id.into());
        self.claimed_at = Some(self.updated_at);
        Ok(())
    }

    /// `release` per spec.md §4.2: claimed/in_progress → ready, clearing
    /// assignment. The agent that lost the task is appended to
    /// `previous_agents` so the scheduler can exclude it on the next pass.
    pub fn release(&mut self, reason: &str) -> Result<(), String> {
        if self.status != TaskStatus::Claimed && self.status != TaskStatus::InProgress {
            return Err(format!("cannot release task in status {}", self.status.as_str()));
        }
        if let Some(agent) = self.assigned_agent.take() {
            if !self.previous_agents.contains(&agent) {
                self.previous_agents.push(agent);
            }
        }
        self.claimed_at = None;
        self.last_error = Some(reason.to_string());
        self.transition_to(TaskStatus::Ready)
    }

    /// `updateProgress` per spec.md §4.2: claimed → in_progress once;
    /// idempotent once already in_progress.
    pub fn update_progress(&mut self) -> Result<(), String> {
        if self.status == TaskStatus::InProgress {
            return Ok(());
        }
        self.transition_to(TaskStatus::InProgress)?;
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    /// `complete` per spec.md §4.2. `actual_minutes` is left `None` when
    /// `started_at` was never set (Open Question #3 in SPEC_FULL.md §9).
    pub fn complete(&mut self, result: Option<serde_json::Value>) -> Result<(), String> {
        self.transition_to(TaskStatus::Completed)?;
        self.completed_at = Some(self.updated_at);
        self.actual_minutes = self
            .started_at
            .map(|started| (self.completed_at.unwrap() - started).num_seconds() as f64 / 60.0);
        self.result = result;
        Ok(())
    }

    /// Whether this task is eligible for another retry attempt (P3: total
    /// attempts ≤ max_retries + 1).
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Schedule a retry after a recoverable failure: clears the
    /// assignment (recording the losing agent in `previous_agents`, same
    /// as [`Task::release`]) and moves to `pending_retry`.
    pub fn schedule_retry(&mut self, error: &str, next_retry_at: DateTime<Utc>) -> Result<(), String> {
        self.transition_to(TaskStatus::PendingRetry)?;
        if let Some(agent) = self.assigned_agent.take() {
            if !self.previous_agents.contains(&agent) {
                self.previous_agents.push(agent);
            }
        }
        self.claimed_at = None;
        self.last_error = Some(error.to_string());
        self.next_retry_at = Some(next_retry_at);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_without_deps_is_ready() {
        let t = Task::new("t", "d");
        assert_eq!(t.status, TaskStatus::Ready);
    }

    #[test]
    fn dependency_blocks_task() {
        let t = Task::new("t", "d").with_dependency("dep-1");
        assert_eq!(t.status, TaskStatus::Blocked);
    }

    #[test]
    fn claim_sets_assignment_invariant() {
        let mut t = Task::new("t", "d");
        t.claim("agent-1").unwrap();
        assert_eq!(t.status, TaskStatus::Claimed);
        assert_eq!(t.assigned_agent.as_deref(), Some("agent-1"));
        assert!(t.claimed_at.is_some());
    }

    #[test]
    fn release_clears_assignment_and_records_previous_agent() {
        let mut t = Task::new("t", "d");
        t.claim("agent-1").unwrap();
        t.release("crashed").unwrap();
        assert_eq!(t.status, TaskStatus::Ready);
        assert!(t.assigned_agent.is_none());
        assert_eq!(t.previous_agents, vec!["agent-1".to_string()]);
        assert_eq!(t.last_error.as_deref(), Some("crashed"));
    }

    #[test]
    fn release_rejects_non_claimed_task() {
        let mut t = Task::new("t", "d");
        assert!(t.release("x").is_err());
    }

    #[test]
    fn complete_without_progress_leaves_actual_minutes_none() {
        let mut t = Task::new("t", "d");
        t.claim("a1").unwrap();
        t.complete(None).unwrap();
        assert!(t.actual_minutes.is_none());
        assert!(t.is_terminal());
    }

    #[test]
    fn complete_after_progress_computes_actual_minutes() {
        let mut t = Task::new("t", "d");
        t.claim("a1").unwrap();
        t.update_progress().unwrap();
        t.started_at = Some(Utc::now() - chrono::Duration::minutes(5));
        t.complete(None).unwrap();
        let minutes = t.actual_minutes.unwrap();
        assert!(minutes >= 4.9 && minutes <= 5.1, "got {minutes}");
    }

    #[test]
    fn terminal_statuses_reject_transitions() {
        let mut t = Task::new("t", "d");
        t.claim("a1").unwrap();
        t.complete(None).unwrap();
        assert!(!t.can_transition_to(TaskStatus::Ready));
    }

    #[test]
    fn validate_rejects_empty_title() {
        let mut t = Task::new("", "d");
        assert!(t.validate().is_err());
        t.title = "ok".into();
        assert!(t.validate().is_ok());
    }

    #[test]
    fn schedule_retry_clears_assignment_and_sets_next_retry_at() {
        let mut t = Task::new("t", "d");
        t.claim("agent-1").unwrap();
        let when = Utc::now() + chrono::Duration::seconds(30);
        t.schedule_retry("flaky", when).unwrap();
        assert_eq!(t.status, TaskStatus::PendingRetry);
        assert!(t.assigned_agent.is_none());
        assert_eq!(t.previous_agents, vec!["agent-1".to_string()]);
        assert_eq!(t.next_retry_at, Some(when));
    }

    #[test]
    fn validate_rejects_self_dependency() {
        let mut t = Task::new("t", "d");
        let id = t.id.clone();
        t.dependencies.push(id);
        assert!(t.validate().is_err());
    }
}
