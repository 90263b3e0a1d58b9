//! Message bus persistence port (durable backlog behind the in-process
//! broadcast channel, so late subscribers can still page through history).

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::Message;

/// Filter criteria for paging through message history.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub to_agent: Option<String>,
    pub since_sequence: Option<u64>,
    pub limit: Option<u32>,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: &Message, sequence: u64) -> SwarmResult<()>;

    /// Insert `message` with a freshly-assigned sequence unless a message
    /// with the same id already exists. Returns whether it was inserted.
    /// Used to merge a message pulled from a remote replica without
    /// disturbing local ordering.
    async fn append_if_absent(&self, message: &Message) -> SwarmResult<bool>;

    async fn get(&self, id: &str) -> SwarmResult<Option<Message>>;

    async fn list(&self, filter: MessageFilter) -> SwarmResult<Vec<Message>>;

    async fn acknowledge(&self, id: &str, agent_id: &str) -> SwarmResult<()>;

    /// Stamp `delivered_at = now` for a directed message that hasn't been
    /// delivered yet. Broadcasts have no durable delivery mark.
    async fn mark_delivered(&self, id: &str) -> SwarmResult<()>;

    /// Delete messages past their `expires_at`.
    async fn reap_expired(&self, now: chrono::DateTime<chrono::Utc>) -> SwarmResult<u64>;
}
