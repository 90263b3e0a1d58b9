use std::sync::Arc;

use abathur_swarm::adapters::sqlite::{self, SqliteChangeLogRepository, SqliteMessageRepository};
use abathur_swarm::domain::models::{Message, MessageType};
use abathur_swarm::domain::ports::MessageFilter;
use abathur_swarm::services::{MessageBus, SyncVersionCounter};

async fn bus() -> MessageBus<SqliteMessageRepository, SqliteChangeLogRepository> {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let messages = Arc::new(SqliteMessageRepository::new(pool.clone()));
    let change_log = Arc::new(SqliteChangeLogRepository::new(pool));
    MessageBus::new(messages, change_log, 1_024, SyncVersionCounter::starting_at(0))
}

#[tokio::test]
async fn s5_broadcast_reaches_every_registered_agent_exactly_once() {
    let bus = bus().await;
    let agents = ["a1", "a2", "a3"];

    let message = Message::broadcast("a1", MessageType::SystemShutdown, serde_json::json!({})).with_ack_required();
    let message_id = message.id.clone();
    bus.send(message).await.unwrap();

    for agent in agents {
        let inbox = bus.receive(agent, None, None).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, message_id);

        let delivered = bus.mark_delivered(&[message_id.clone()], agent).await.unwrap();
        assert_eq!(delivered, 1, "first delivery mark for this agent must count");

        let redelivered = bus.mark_delivered(&[message_id.clone()], agent).await.unwrap();
        assert_eq!(redelivered, 0, "a repeat delivery to the same agent must not be re-counted (at-most-once)");
    }

    for agent in agents {
        bus.acknowledge(&message_id, agent).await.unwrap();
    }

    // A second ack from any agent (already acknowledged) is a no-op, not
    // an error, and acknowledged_at stays set from the first ack.
    bus.acknowledge(&message_id, "a1").await.unwrap();

    let history = bus.history(MessageFilter { to_agent: None, since_sequence: None, limit: None }).await.unwrap();
    let stored = history.into_iter().find(|m| m.id == message_id).unwrap();
    assert!(stored.acknowledged_at.is_some());
    assert!(stored.acknowledged_by.is_some());
}

#[tokio::test]
async fn directed_message_is_invisible_to_other_agents() {
    let bus = bus().await;
    let message = Message::new("a1", Some("a2".to_string()), MessageType::TaskAssigned, serde_json::json!({"task": "t1"}));
    bus.send(message).await.unwrap();

    assert!(bus.receive("a3", None, None).await.unwrap().is_empty());
    let inbox = bus.receive("a2", None, None).await.unwrap();
    assert_eq!(inbox.len(), 1);
}

#[tokio::test]
async fn acknowledge_without_ack_required_is_rejected() {
    let bus = bus().await;
    let message = Message::new("a1", Some("a2".to_string()), MessageType::Heartbeat, serde_json::json!({}));
    let id = message.id.clone();
    bus.send(message).await.unwrap();

    assert!(bus.acknowledge(&id, "a2").await.is_err());
}

#[tokio::test]
async fn expired_messages_are_not_received() {
    let bus = bus().await;
    let message = Message::new("a1", Some("a2".to_string()), MessageType::Heartbeat, serde_json::json!({})).with_expiry(0);
    bus.send(message).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert!(bus.receive("a2", None, None).await.unwrap().is_empty());
}
