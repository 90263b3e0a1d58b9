use std::sync::Arc;

use abathur_swarm::adapters::sqlite::{self, SqliteAgentRepository, SqliteChangeLogRepository, SqliteLeaseRepository, SqliteTaskRepository};
use abathur_swarm::domain::models::{Agent, EntityKind, Task};
use abathur_swarm::services::{AgentRegistry, ChangeLogService, Scheduler, SchedulerConfig, SyncVersionCounter, TaskRegistry};

fn task_registry(
    task_repo: Arc<SqliteTaskRepository>,
    change_log_repo: Arc<SqliteChangeLogRepository>,
    sequence: SyncVersionCounter,
) -> TaskRegistry<SqliteTaskRepository, SqliteChangeLogRepository> {
    let scheduler = Scheduler::new(task_repo.clone(), SchedulerConfig::default());
    TaskRegistry::new(task_repo, change_log_repo, scheduler, sequence)
}

#[tokio::test]
async fn p5_sync_version_is_strictly_increasing_across_entity_kinds() {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();

    let change_log_repo = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
    let sequence = SyncVersionCounter::starting_at(0);

    let tasks = task_registry(Arc::new(SqliteTaskRepository::new(pool.clone())), change_log_repo.clone(), sequence.clone());
    let agents = AgentRegistry::new(
        Arc::new(SqliteAgentRepository::new(pool.clone())),
        change_log_repo.clone(),
        Arc::new(SqliteLeaseRepository::new(pool.clone())),
        sequence.clone(),
        90_000,
    );
    let change_log = ChangeLogService::new(change_log_repo);

    tasks.create(Task::new("t1", "first")).await.unwrap();
    agents.register(Agent::new("a1", "worker-1", "claude", vec![])).await.unwrap();
    tasks.create(Task::new("t2", "second")).await.unwrap();

    let entries = change_log.since(0, 100).await.unwrap();
    assert_eq!(entries.len(), 3);

    let versions: Vec<u64> = entries.iter().map(|e| e.sync_version).collect();
    let mut sorted = versions.clone();
    sorted.sort_unstable();
    assert_eq!(versions, sorted, "sync_version must already be emitted in increasing order");
    assert!(versions.windows(2).all(|w| w[0] < w[1]), "no two entries may share a sync_version");

    assert_eq!(change_log.latest_version().await.unwrap(), *versions.last().unwrap());
}

#[tokio::test]
async fn concurrent_writers_never_duplicate_a_sync_version() {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let change_log_repo = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
    let sequence = SyncVersionCounter::starting_at(0);
    let tasks = Arc::new(task_registry(Arc::new(SqliteTaskRepository::new(pool)), change_log_repo.clone(), sequence));

    let mut handles = Vec::new();
    for i in 0..20 {
        let tasks = tasks.clone();
        handles.push(tokio::spawn(async move {
            tasks.create(Task::new(format!("t{i}"), "concurrent")).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let change_log = ChangeLogService::new(change_log_repo);
    let entries = change_log.since(0, 100).await.unwrap();
    let mut versions: Vec<u64> = entries.iter().map(|e| e.sync_version).collect();
    versions.sort_unstable();
    versions.dedup();
    assert_eq!(versions.len(), 20);
}

#[tokio::test]
async fn compact_keeps_one_row_per_entity() {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let change_log_repo = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
    let sequence = SyncVersionCounter::starting_at(0);
    let tasks = task_registry(Arc::new(SqliteTaskRepository::new(pool)), change_log_repo.clone(), sequence);
    let change_log = ChangeLogService::new(change_log_repo);

    let t1 = tasks.create(Task::new("t1", "first")).await.unwrap();
    tasks.claim("agent-1", &[]).await.unwrap();
    tasks.update_progress(&t1.id).await.unwrap();
    tasks.update_progress(&t1.id).await.unwrap();

    let before = change_log.since(0, 100).await.unwrap();
    assert_eq!(before.len(), 4, "create + claim + two progress updates");

    let latest = change_log.latest_version().await.unwrap();
    let deleted = change_log.compact(latest).await.unwrap();
    assert_eq!(deleted, 3, "only the newest row per entity survives compaction");

    let after = change_log.since(0, 100).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].sync_version, latest);
}

#[tokio::test]
async fn get_latest_changes_dedups_per_entity_and_filters_by_kind() {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let change_log_repo = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
    let sequence = SyncVersionCounter::starting_at(0);
    let tasks = task_registry(Arc::new(SqliteTaskRepository::new(pool.clone())), change_log_repo.clone(), sequence.clone());
    let agents = AgentRegistry::new(
        Arc::new(SqliteAgentRepository::new(pool.clone())),
        change_log_repo.clone(),
        Arc::new(SqliteLeaseRepository::new(pool)),
        sequence,
        90_000,
    );
    let change_log = ChangeLogService::new(change_log_repo);

    let t1 = tasks.create(Task::new("t1", "first")).await.unwrap();
    tasks.claim("agent-1", &[]).await.unwrap();
    tasks.update_progress(&t1.id).await.unwrap();
    agents.register(Agent::new("a1", "worker-1", "claude", vec![])).await.unwrap();

    let latest_all = change_log.get_latest_changes(0, &[]).await.unwrap();
    assert_eq!(latest_all.len(), 2, "one row per entity regardless of how many times it mutated");

    let latest_tasks_only = change_log.get_latest_changes(0, &[EntityKind::Task]).await.unwrap();
    assert_eq!(latest_tasks_only.len(), 1);
    assert_eq!(latest_tasks_only[0].entity_id, t1.id);
}

#[tokio::test]
async fn adaptive_compact_is_a_no_op_below_the_threshold() {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let change_log_repo = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
    let sequence = SyncVersionCounter::starting_at(0);
    let tasks = task_registry(Arc::new(SqliteTaskRepository::new(pool)), change_log_repo.clone(), sequence);
    let change_log = ChangeLogService::new(change_log_repo);

    tasks.create(Task::new("t1", "first")).await.unwrap();
    assert_eq!(change_log.adaptive_compact().await.unwrap(), 0);
    assert_eq!(change_log.since(0, 100).await.unwrap().len(), 1);
}
