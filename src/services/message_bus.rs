//! Message bus: in-process broadcast distribution backed by a durable
//! append log (at-most-once delivery — a subscriber that isn't listening
//! when a message is sent misses it, but never receives it twice).

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{ChangeLogEntry, ChangeOp, EntityKind, Message};
use crate::domain::ports::{ChangeLogRepository, MessageFilter, MessageRepository};

use super::expiring::ExpiringSet;
use super::sync_version::SyncVersionCounter;

const DEFAULT_DELIVERY_DEDUP_TTL_MS: i64 = 24 * 60 * 60 * 1000;
const MAX_DELIVERY_DEDUP_ENTRIES: usize = 100_000;

pub struct MessageBus<M: MessageRepository, C: ChangeLogRepository> {
    messages: Arc<M>,
    change_log: Arc<C>,
    sender: broadcast::Sender<Message>,
    sequence: SyncVersionCounter,
    /// Per-receiver delivery dedup, keyed by `(agent_id, message_id)`.
    /// In-memory only: durable `delivered_at` is written only for
    /// directed messages (spec.md §4.6).
    delivered: Mutex<ExpiringSet<(String, String)>>,
}

impl<M: MessageRepository, C: ChangeLogRepository> MessageBus<M, C> {
    pub fn new(messages: Arc<M>, change_log: Arc<C>, channel_capacity: usize, sequence: SyncVersionCounter) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        let delivered = Mutex::new(ExpiringSet::new(DEFAULT_DELIVERY_DEDUP_TTL_MS, MAX_DELIVERY_DEDUP_ENTRIES));
        Self { messages, change_log, sender, sequence, delivered }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Append `message` to the durable log and broadcast it to current
    /// subscribers. Subscribers that connect afterward must page through
    /// [`MessageBus::receive`] instead.
    pub async fn send(&self, message: Message) -> SwarmResult<()> {
        let sequence = self.sequence.next().await;
        self.messages.append(&message, sequence).await?;
        let change_version = self.sequence.next().await;
        self.change_log
            .append(&ChangeLogEntry::new(change_version, EntityKind::Message, &message.id, ChangeOp::Insert, serde_json::to_value(&message)?, "local"))
            .await?;
        tracing::debug!(message_id = %message.id, from = %message.from_agent, to = ?message.to_agent, "message sent");
        // A broadcast send error just means there are no live subscribers
        // right now; the message is already durable, so this is not a loss.
        let _ = self.sender.send(message);
        Ok(())
    }

    /// Page through durable history addressed to `agent_id` (broadcasts
    /// included), oldest first, excluding anything already expired.
    pub async fn receive(&self, agent_id: &str, since_sequence: Option<u64>, limit: Option<u32>) -> SwarmResult<Vec<Message>> {
        let filter = MessageFilter { to_agent: Some(agent_id.to_string()), since_sequence, limit };
        let now = Utc::now();
        Ok(self.messages.list(filter).await?.into_iter().filter(|m| !m.is_expired(now)).collect())
    }

    /// Mark `ids` delivered to `agent_id`: a durable `delivered_at` write
    /// for directed messages, and an in-memory dedup entry for all
    /// messages (including broadcasts, which never get a durable mark).
    /// Already-delivered ids are skipped. Returns the count newly marked.
    pub async fn mark_delivered(&self, ids: &[String], agent_id: &str) -> SwarmResult<u64> {
        let mut count = 0u64;
        for id in ids {
            let key = (agent_id.to_string(), id.clone());
            let first_time = {
                let mut delivered = self.delivered.lock().expect("delivery dedup mutex poisoned");
                delivered.check_and_insert(key)
            };
            if !first_time {
                continue;
            }

            if let Some(message) = self.messages.get(id).await? {
                if !message.is_receivable_by(agent_id) {
                    continue;
                }
                if message.to_agent.is_some() && message.delivered_at.is_none() {
                    self.messages.mark_delivered(id).await?;
                }
                count += 1;
            }
        }
        Ok(count)
    }

    /// Requires `ack_required`; a second acknowledgement on an
    /// already-acknowledged message is a no-op.
    pub async fn acknowledge(&self, id: &str, agent_id: &str) -> SwarmResult<()> {
        let message = self.messages.get(id).await?.ok_or_else(|| SwarmError::NotFound(format!("message {id}")))?;
        if !message.ack_required {
            return Err(SwarmError::ConstraintViolation(format!("message {id} does not require acknowledgement")));
        }
        if message.acknowledged_at.is_some() {
            return Ok(());
        }
        self.messages.acknowledge(id, agent_id).await
    }

    pub async fn history(&self, filter: MessageFilter) -> SwarmResult<Vec<Message>> {
        self.messages.list(filter).await
    }

    pub async fn reap_expired(&self) -> SwarmResult<u64> {
        self.messages.reap_expired(chrono::Utc::now()).await
    }
}
