//! Message model for the inter-agent message bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed vocabulary of wire message types (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskCreated,
    TaskClaimed,
    TaskAssigned,
    TaskProgress,
    TaskCompleted,
    TaskFailed,
    TaskHelpNeeded,
    TaskHandoff,
    FileLockRequest,
    FileLockGranted,
    FileLockDenied,
    CoordinationSync,
    CoordinationResponse,
    InfoDiscovery,
    AgentStarted,
    AgentStopped,
    SystemShutdown,
    Heartbeat,
    Custom(String),
}

impl MessageType {
    pub fn as_str(&self) -> String {
        match self {
            Self::TaskCreated => "task.created".to_string(),
            Self::TaskClaimed => "task.claimed".to_string(),
            Self::TaskAssigned => "task.assigned".to_string(),
            Self::TaskProgress => "task.progress".to_string(),
            Self::TaskCompleted => "task.completed".to_string(),
            Self::TaskFailed => "task.failed".to_string(),
            Self::TaskHelpNeeded => "task.help_needed".to_string(),
            Self::TaskHandoff => "task.handoff".to_string(),
            Self::FileLockRequest => "file.lock_request".to_string(),
            Self::FileLockGranted => "file.lock_granted".to_string(),
            Self::FileLockDenied => "file.lock_denied".to_string(),
            Self::CoordinationSync => "coordination.sync".to_string(),
            Self::CoordinationResponse => "coordination.response".to_string(),
            Self::InfoDiscovery => "info.discovery".to_string(),
            Self::AgentStarted => "agent.started".to_string(),
            Self::AgentStopped => "agent.stopped".to_string(),
            Self::SystemShutdown => "system.shutdown".to_string(),
            Self::Heartbeat => "heartbeat".to_string(),
            Self::Custom(s) => format!("custom.{s}"),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "task.created" => Self::TaskCreated,
            "task.claimed" => Self::TaskClaimed,
            "task.assigned" => Self::TaskAssigned,
            "task.progress" => Self::TaskProgress,
            "task.completed" => Self::TaskCompleted,
            "task.failed" => Self::TaskFailed,
            "task.help_needed" => Self::TaskHelpNeeded,
            "task.handoff" => Self::TaskHandoff,
            "file.lock_request" => Self::FileLockRequest,
            "file.lock_granted" => Self::FileLockGranted,
            "file.lock_denied" => Self::FileLockDenied,
            "coordination.sync" => Self::CoordinationSync,
            "coordination.response" => Self::CoordinationResponse,
            "info.discovery" => Self::InfoDiscovery,
            "agent.started" => Self::AgentStarted,
            "agent.stopped" => Self::AgentStopped,
            "system.shutdown" => Self::SystemShutdown,
            "heartbeat" => Self::Heartbeat,
            other => Self::Custom(other.strip_prefix("custom.").unwrap_or(other).to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: MessageType,
    pub from_agent: String,
    /// Absent for broadcasts. This implementation always sets `None` for
    /// broadcasts (SPEC_FULL.md §9, Open Question #2) rather than the
    /// `to_agent = self` variant observed elsewhere.
    pub to_agent: Option<String>,
    pub payload: serde_json::Value,
    pub ack_required: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(from_agent: impl Into<String>, to_agent: Option<String>, message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            from_agent: from_agent.into(),
            to_agent,
            payload,
            ack_required: false,
            acknowledged_at: None,
            acknowledged_by: None,
            delivered_at: None,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn broadcast(from_agent: impl Into<String>, message_type: MessageType, payload: serde_json::Value) -> Self {
        Self::new(from_agent, None, message_type, payload)
    }

    pub fn with_ack_required(mut self) -> Self {
        self.ack_required = true;
        self
    }

    pub fn with_expiry(mut self, ttl_ms: i64) -> Self {
        self.expires_at = Some(self.created_at + chrono::Duration::milliseconds(ttl_ms));
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp < now).unwrap_or(false)
    }

    /// Whether `agent_id` is a legitimate receiver of this message:
    /// broadcasts (`to_agent = None`) reach everyone; directed messages
    /// reach only their addressee.
    pub fn is_receivable_by(&self, agent_id: &str) -> bool {
        match &self.to_agent {
            None => true,
            Some(addr) => addr == agent_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_has_no_addressee() {
        let m = Message::broadcast("a1", MessageType::SystemShutdown, serde_json::json!({}));
        assert!(m.to_agent.is_none());
        assert!(m.is_receivable_by("a2"));
        assert!(m.is_receivable_by("a1"));
    }

    #[test]
    fn directed_message_excludes_others() {
        let m = Message::new("a1", Some("a2".into()), MessageType::TaskAssigned, serde_json::json!({}));
        assert!(m.is_receivable_by("a2"));
        assert!(!m.is_receivable_by("a3"));
    }

    #[test]
    fn message_type_round_trips() {
        for s in ["task.created", "file.lock_granted", "coordination.sync", "heartbeat", "system.shutdown"] {
            assert_eq!(MessageType::parse(s).as_str(), s);
        }
        assert_eq!(MessageType::parse("custom.ping").as_str(), "custom.ping");
    }

    #[test]
    fn expiry_check() {
        let m = Message::new("a1", None, MessageType::Heartbeat, serde_json::json!({})).with_expiry(-1);
        assert!(m.is_expired(Utc::now()));
    }
}
