//! SQLite implementation of the MessageRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{Message, MessageType};
use crate::domain::ports::{MessageFilter, MessageRepository};

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    message_type: String,
    from_agent: String,
    to_agent: Option<String>,
    payload: String,
    ack_required: i64,
    acknowledged_at: Option<String>,
    acknowledged_by: Option<String>,
    delivered_at: Option<String>,
    expires_at: Option<String>,
    created_at: String,
}

fn parse_opt_ts(s: &Option<String>) -> Result<Option<DateTime<Utc>>, SwarmError> {
    s.as_deref().map(|s| DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc))).transpose().map_err(SwarmError::from)
}

impl TryFrom<MessageRow> for Message {
    type Error = SwarmError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id,
            message_type: MessageType::parse(&row.message_type),
            from_agent: row.from_agent,
            to_agent: row.to_agent,
            payload: serde_json::from_str(&row.payload)?,
            ack_required: row.ack_required != 0,
            acknowledged_at: parse_opt_ts(&row.acknowledged_at)?,
            acknowledged_by: row.acknowledged_by,
            delivered_at: parse_opt_ts(&row.delivered_at)?,
            expires_at: parse_opt_ts(&row.expires_at)?,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
        })
    }
}

#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn append(&self, message: &Message, sequence: u64) -> SwarmResult<()> {
        let payload = serde_json::to_string(&message.payload)?;
        sqlx::query(
            r#"INSERT INTO messages (id, sequence, message_type, from_agent, to_agent, payload,
               ack_required, acknowledged_at, acknowledged_by, delivered_at, expires_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&message.id)
        .bind(sequence as i64)
        .bind(message.message_type.as_str())
        .bind(&message.from_agent)
        .bind(&message.to_agent)
        .bind(&payload)
        .bind(message.ack_required as i64)
        .bind(message.acknowledged_at.map(|t| t.to_rfc3339()))
        .bind(&message.acknowledged_by)
        .bind(message.delivered_at.map(|t| t.to_rfc3339()))
        .bind(message.expires_at.map(|t| t.to_rfc3339()))
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_if_absent(&self, message: &Message) -> SwarmResult<bool> {
        if self.get(&message.id).await?.is_some() {
            return Ok(false);
        }
        let payload = serde_json::to_string(&message.payload)?;
        let result = sqlx::query(
            r#"INSERT INTO messages (id, sequence, message_type, from_agent, to_agent, payload,
               ack_required, acknowledged_at, acknowledged_by, delivered_at, expires_at, created_at)
               SELECT ?, COALESCE(MAX(sequence), 0) + 1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ? FROM messages"#,
        )
        .bind(&message.id)
        .bind(message.message_type.as_str())
        .bind(&message.from_agent)
        .bind(&message.to_agent)
        .bind(&payload)
        .bind(message.ack_required as i64)
        .bind(message.acknowledged_at.map(|t| t.to_rfc3339()))
        .bind(&message.acknowledged_by)
        .bind(message.delivered_at.map(|t| t.to_rfc3339()))
        .bind(message.expires_at.map(|t| t.to_rfc3339()))
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: &str) -> SwarmResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?").bind(id).fetch_optional(&self.pool).await?;
        row.map(Message::try_from).transpose()
    }

    async fn list(&self, filter: MessageFilter) -> SwarmResult<Vec<Message>> {
        let mut query = String::from("SELECT * FROM messages WHERE 1=1");
        if filter.to_agent.is_some() {
            query.push_str(" AND (to_agent IS NULL OR to_agent = ?)");
        }
        if filter.since_sequence.is_some() {
            query.push_str(" AND sequence > ?");
        }
        query.push_str(" ORDER BY sequence ASC");
        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, MessageRow>(&query);
        if let Some(ref to_agent) = filter.to_agent {
            q = q.bind(to_agent);
        }
        if let Some(since) = filter.since_sequence {
            q = q.bind(since as i64);
        }
        if let Some(limit) = filter.limit {
            q = q.bind(limit as i64);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn acknowledge(&self, id: &str, agent_id: &str) -> SwarmResult<()> {
        let result = sqlx::query("UPDATE messages SET acknowledged_at = ?, acknowledged_by = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(agent_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("message {id}")));
        }
        Ok(())
    }

    async fn mark_delivered(&self, id: &str) -> SwarmResult<()> {
        let result = sqlx::query("UPDATE messages SET delivered_at = ? WHERE id = ? AND delivered_at IS NULL")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SwarmError::NotFound(format!("message {id}")));
        }
        Ok(())
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> SwarmResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE expires_at IS NOT NULL AND expires_at <= ?").bind(now.to_rfc3339()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
