use std::sync::Arc;

use abathur_swarm::adapters::sqlite::{self, SqliteAgentRepository, SqliteChangeLogRepository, SqliteLeaseRepository};
use abathur_swarm::domain::models::{Agent, AgentStatus};
use abathur_swarm::domain::ports::AgentRepository;
use abathur_swarm::services::{AgentRegistry, SyncVersionCounter};

async fn setup() -> (AgentRegistry<SqliteAgentRepository, SqliteChangeLogRepository, SqliteLeaseRepository>, Arc<SqliteAgentRepository>) {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let change_log = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
    let leases = Arc::new(SqliteLeaseRepository::new(pool));
    let registry = AgentRegistry::new(agents.clone(), change_log, leases, SyncVersionCounter::starting_at(0), 90_000);
    (registry, agents)
}

#[tokio::test]
async fn register_then_heartbeat_updates_activity() {
    let (registry, _) = setup().await;
    let agent = registry.register(Agent::new("a1", "worker-1", "claude", vec!["rust".to_string()])).await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);

    registry.heartbeat("a1", Some(0.5), Some("implementing".to_string())).await.unwrap();
    let fetched = registry.get("a1").await.unwrap().unwrap();
    assert_eq!(fetched.heartbeat_count, 1);
    assert_eq!(fetched.current_task_progress, 0.5);
}

#[tokio::test]
async fn reap_stale_marks_agents_offline_and_excludes_them_thereafter() {
    let (registry, agents) = setup().await;
    let agent = registry.register(Agent::new("a1", "worker-1", "claude", vec![])).await.unwrap();

    let mut stale_agent = agent.clone();
    stale_agent.last_heartbeat = chrono::Utc::now() - chrono::Duration::milliseconds(200_000);
    agents.update(&stale_agent).await.unwrap();

    let reaped = registry.reap_stale().await.unwrap();
    assert_eq!(reaped, vec!["a1".to_string()]);

    let after = registry.get("a1").await.unwrap().unwrap();
    assert_eq!(after.status, AgentStatus::Offline);

    // An already-offline agent is never reported stale again (no
    // unbounded reap-loop re-processing the same row every cycle).
    assert!(registry.stale_agent_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn active_agents_are_not_considered_stale() {
    let (registry, _) = setup().await;
    registry.register(Agent::new("a1", "worker-1", "claude", vec![])).await.unwrap();
    assert!(registry.stale_agent_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_stats_increments_completed_or_failed_and_runtime() {
    let (registry, _) = setup().await;
    registry.register(Agent::new("a1", "worker-1", "claude", vec![])).await.unwrap();

    registry.update_stats("a1", true, 12.5).await.unwrap();
    let after_success = registry.get("a1").await.unwrap().unwrap();
    assert_eq!(after_success.tasks_completed, 1);
    assert_eq!(after_success.tasks_failed, 0);
    assert!((after_success.total_runtime_minutes - 12.5).abs() < f64::EPSILON);

    registry.update_stats("a1", false, 3.0).await.unwrap();
    let after_failure = registry.get("a1").await.unwrap().unwrap();
    assert_eq!(after_failure.tasks_completed, 1);
    assert_eq!(after_failure.tasks_failed, 1);
    assert!((after_failure.total_runtime_minutes - 15.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn deregister_deletes_the_agent_and_releases_its_leases() {
    use abathur_swarm::services::LeaseManager;

    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let agent_repo = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let change_log = Arc::new(sqlite::SqliteChangeLogRepository::new(pool.clone()));
    let lease_repo = Arc::new(sqlite::SqliteLeaseRepository::new(pool));
    let registry = AgentRegistry::new(
        agent_repo,
        change_log,
        lease_repo.clone(),
        abathur_swarm::services::SyncVersionCounter::starting_at(0),
        90_000,
    );
    let leases = LeaseManager::new(lease_repo, 60_000, 3_600_000);

    registry.register(Agent::new("a1", "worker-1", "claude", vec![])).await.unwrap();
    leases.acquire("src/x.ts", "a1", None, Some(60_000)).await.unwrap();
    leases.acquire("src/y.ts", "a1", None, Some(60_000)).await.unwrap();

    registry.deregister("a1").await.unwrap();

    assert!(registry.get("a1").await.unwrap().is_none());
    assert!(leases.list_for_agent("a1").await.unwrap().is_empty());
}
