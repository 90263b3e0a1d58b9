use std::sync::Arc;

use abathur_swarm::adapters::sqlite::{self, SqliteChangeLogRepository, SqliteTaskRepository};
use abathur_swarm::domain::models::{Task, TaskFailure, FailureType, TaskPriority, TaskStatus};
use abathur_swarm::domain::ports::TaskFilter;
use abathur_swarm::services::{Scheduler, SchedulerConfig, SyncVersionCounter, TaskRegistry};

async fn registry() -> TaskRegistry<SqliteTaskRepository, SqliteChangeLogRepository> {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let change_log = Arc::new(SqliteChangeLogRepository::new(pool));
    let scheduler = Scheduler::new(tasks.clone(), SchedulerConfig::default());
    TaskRegistry::new(tasks, change_log, scheduler, SyncVersionCounter::starting_at(0))
}

#[tokio::test]
async fn p1_single_winner_claim_under_concurrency() {
    let registry = Arc::new(registry().await);
    let task = registry.create(Task::new("shared task", "one ready task")).await.unwrap();
    assert_eq!(task.status, TaskStatus::Ready);

    let r1 = registry.clone();
    let r2 = registry.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { r1.claim("agent-1", &[]).await.unwrap() }),
        tokio::spawn(async move { r2.claim("agent-2", &[]).await.unwrap() }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let winners: Vec<_> = [a, b].into_iter().flatten().collect();
    assert_eq!(winners.len(), 1, "exactly one concurrent claim must succeed");
    let winner = &winners[0];
    assert_eq!(winner.id, task.id);
    assert_eq!(winner.status, TaskStatus::Claimed);
    assert!(winner.assigned_agent.is_some());

    // A further claim against the now-empty pool returns nothing (S2).
    let loser_agent = if winner.assigned_agent.as_deref() == Some("agent-1") { "agent-2" } else { "agent-1" };
    assert!(registry.claim(loser_agent, &[]).await.unwrap().is_none());
}

#[tokio::test]
async fn s1_blocked_to_ready_cascade() {
    let registry = registry().await;

    let t1 = registry.create(Task::new("t1", "no deps")).await.unwrap();
    let t2 = registry.create(Task::new("t2", "depends on t1").with_dependency(&t1.id)).await.unwrap();
    let t3 = registry.create(Task::new("t3", "depends on t2").with_dependency(&t2.id)).await.unwrap();

    assert_eq!(t1.status, TaskStatus::Ready);
    assert_eq!(t2.status, TaskStatus::Blocked);
    assert_eq!(t3.status, TaskStatus::Blocked);

    let claimed = registry.claim("agent-1", &[]).await.unwrap().unwrap();
    assert_eq!(claimed.id, t1.id);
    registry.complete(&t1.id, None).await.unwrap();

    let t2_after = registry.get(&t2.id).await.unwrap().unwrap();
    let t3_after = registry.get(&t3.id).await.unwrap().unwrap();
    assert_eq!(t2_after.status, TaskStatus::Ready);
    assert_eq!(t3_after.status, TaskStatus::Blocked);

    let claimed2 = registry.claim("agent-1", &[]).await.unwrap().unwrap();
    assert_eq!(claimed2.id, t2.id);
    registry.complete(&t2.id, None).await.unwrap();

    let t3_final = registry.get(&t3.id).await.unwrap().unwrap();
    assert_eq!(t3_final.status, TaskStatus::Ready);
}

#[tokio::test]
async fn p2_dependency_gate_blocks_until_all_deps_complete() {
    let registry = registry().await;

    let t1 = registry.create(Task::new("t1", "dep a")).await.unwrap();
    let t2 = registry.create(Task::new("t2", "dep b")).await.unwrap();
    let t3 = registry
        .create(Task::new("t3", "depends on both").with_dependency(&t1.id).with_dependency(&t2.id))
        .await
        .unwrap();
    assert_eq!(t3.status, TaskStatus::Blocked);

    registry.claim("agent-1", &[]).await.unwrap();
    registry.complete(&t1.id, None).await.unwrap();

    // Only one of two dependencies completed: still blocked.
    let still_blocked = registry.get(&t3.id).await.unwrap().unwrap();
    assert_eq!(still_blocked.status, TaskStatus::Blocked);

    let claimed_t2 = registry.claim("agent-2", &[]).await.unwrap().unwrap();
    assert_eq!(claimed_t2.id, t2.id);
    registry.complete(&t2.id, None).await.unwrap();

    let now_ready = registry.get(&t3.id).await.unwrap().unwrap();
    assert_eq!(now_ready.status, TaskStatus::Ready);
}

/// Directly back-date `next_retry_at` so `promote_due_retries` treats it
/// as due, bypassing a real sleep in the test.
async fn force_retry_due(tasks: &SqliteTaskRepository, task_id: &str) {
    use abathur_swarm::domain::ports::TaskRepository;
    let mut task = tasks.get(task_id).await.unwrap().unwrap();
    let expected_version = task.sync_version;
    task.next_retry_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
    tasks.update(&task, expected_version).await.unwrap();
}

#[tokio::test]
async fn p3_retry_budget_caps_attempts_at_max_retries_plus_one() {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let change_log = Arc::new(SqliteChangeLogRepository::new(pool));
    let scheduler = Scheduler::new(task_repo.clone(), SchedulerConfig::default());
    let registry = TaskRegistry::new(task_repo.clone(), change_log, scheduler, SyncVersionCounter::starting_at(0));

    let mut task = Task::new("flaky", "fails three times");
    task.max_retries = 2;
    task.priority = TaskPriority::High;
    let task = registry.create(task).await.unwrap();
    let failure = |msg: &str| TaskFailure { failure_type: FailureType::TaskError, message: msg.to_string(), recoverable: true };

    registry.claim("agent-1", &[]).await.unwrap();
    let before_fail_1 = chrono::Utc::now();
    let after_fail_1 = registry.fail(&task.id, failure("first"), 30_000, 1_800_000).await.unwrap();
    assert_eq!(after_fail_1.status, TaskStatus::PendingRetry);
    assert_eq!(after_fail_1.retry_count, 1);
    assert_eq!(after_fail_1.previous_agents, vec!["agent-1".to_string()]);
    // S3: first failure backs off ~30_000ms (base * 2^0) plus jitter.
    let delay_1 = (after_fail_1.next_retry_at.unwrap() - before_fail_1).num_milliseconds();
    assert!((30_000..31_000).contains(&delay_1), "expected ~30s backoff, got {delay_1}ms");

    assert!(registry.claim("agent-1", &[]).await.unwrap().is_none(), "pending_retry is not claimable");

    force_retry_due(&task_repo, &task.id).await;
    let promoted = registry.promote_due_retries().await.unwrap();
    assert_eq!(promoted, vec![task.id.clone()]);

    let claimed_2 = registry.claim("agent-2", &[]).await.unwrap().unwrap();
    assert_eq!(claimed_2.assigned_agent.as_deref(), Some("agent-2"));
    let before_fail_2 = chrono::Utc::now();
    let after_fail_2 = registry.fail(&task.id, failure("second"), 30_000, 1_800_000).await.unwrap();
    assert_eq!(after_fail_2.status, TaskStatus::PendingRetry);
    assert_eq!(after_fail_2.retry_count, 2);
    // S3: second failure backs off ~60_000ms (base * 2^1) plus jitter.
    let delay_2 = (after_fail_2.next_retry_at.unwrap() - before_fail_2).num_milliseconds();
    assert!((60_000..61_000).contains(&delay_2), "expected ~60s backoff, got {delay_2}ms");

    force_retry_due(&task_repo, &task.id).await;
    registry.promote_due_retries().await.unwrap();
    registry.claim("agent-3", &[]).await.unwrap();

    // Third recoverable failure exceeds the budget (retry_count would
    // reach 3 with max_retries=2): the task terminates instead.
    let after_fail_3 = registry.fail(&task.id, failure("third"), 30_000, 1_800_000).await.unwrap();
    assert_eq!(after_fail_3.status, TaskStatus::Failed);
    assert_eq!(after_fail_3.retry_count, 2);
}

#[tokio::test]
async fn failing_with_non_recoverable_terminates_immediately() {
    let registry = registry().await;
    let task = registry.create(Task::new("brittle", "hard failure")).await.unwrap();
    registry.claim("agent-1", &[]).await.unwrap();

    let failure = TaskFailure { failure_type: FailureType::AgentCrash, message: "unrecoverable".to_string(), recoverable: false };
    let failed = registry.fail(&task.id, failure, 1_000, 60_000).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn list_filters_by_status() {
    let registry = registry().await;
    registry.create(Task::new("a", "ready a")).await.unwrap();
    registry.create(Task::new("b", "ready b")).await.unwrap();

    let ready = registry.list(TaskFilter { status: Some(TaskStatus::Ready), ..Default::default() }).await.unwrap();
    assert_eq!(ready.len(), 2);
}
