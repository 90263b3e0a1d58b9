use std::sync::Arc;

use abathur_swarm::adapters::sqlite::{self, SqliteLeaseRepository};
use abathur_swarm::services::LeaseManager;

async fn manager() -> LeaseManager<SqliteLeaseRepository> {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let leases = Arc::new(SqliteLeaseRepository::new(pool));
    LeaseManager::new(leases, 60_000, 3_600_000)
}

#[tokio::test]
async fn s4_lease_exclusion_and_expiry() {
    let manager = manager().await;

    manager.acquire("src/x.ts", "agent-1", None, Some(60_000)).await.unwrap();

    let denied = manager.acquire("src/x.ts", "agent-2", None, Some(60_000)).await;
    assert!(denied.is_err(), "a second agent must not acquire a held lease");

    // check() is the canonical live-read.
    let checked = manager.check("src/x.ts").await.unwrap().unwrap();
    assert_eq!(checked.agent_id, "agent-1");

    let held_by_1 = manager.list_for_agent("agent-1").await.unwrap();
    assert_eq!(held_by_1.len(), 1);
    assert_eq!(held_by_1[0].file_path, "src/x.ts");

    manager.release("src/x.ts", "agent-1").await.unwrap();
    let acquired_by_2 = manager.acquire("src/x.ts", "agent-2", None, Some(60_000)).await.unwrap();
    assert_eq!(acquired_by_2.agent_id, "agent-2");
}

#[tokio::test]
async fn check_deletes_and_returns_absent_once_expired() {
    let manager = manager().await;
    manager.acquire("src/z.ts", "agent-1", None, Some(0)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    assert!(manager.check("src/z.ts").await.unwrap().is_none());
    // The expired row was deleted by check(), so a fresh acquire succeeds.
    manager.acquire("src/z.ts", "agent-2", None, Some(60_000)).await.unwrap();
}

#[tokio::test]
async fn force_release_ignores_holder() {
    let manager = manager().await;
    manager.acquire("src/w.ts", "agent-1", None, Some(60_000)).await.unwrap();

    manager.force_release("src/w.ts").await.unwrap();
    assert!(manager.check("src/w.ts").await.unwrap().is_none());
    manager.acquire("src/w.ts", "agent-2", None, Some(60_000)).await.unwrap();
}

#[tokio::test]
async fn release_all_sweeps_every_lease_for_an_agent() {
    let manager = manager().await;
    manager.acquire("src/a.ts", "agent-1", None, Some(60_000)).await.unwrap();
    manager.acquire("src/b.ts", "agent-1", None, Some(60_000)).await.unwrap();
    manager.acquire("src/c.ts", "agent-2", None, Some(60_000)).await.unwrap();

    let released = manager.release_all("agent-1").await.unwrap();
    assert_eq!(released, 2);
    assert!(manager.list_for_agent("agent-1").await.unwrap().is_empty());
    assert_eq!(manager.list_for_agent("agent-2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn p4_only_one_agent_ever_observes_a_live_lease() {
    let manager = Arc::new(manager().await);
    manager.acquire("src/shared.rs", "agent-1", None, None).await.unwrap();

    let m1 = manager.clone();
    let m2 = manager.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { m1.acquire("src/shared.rs", "agent-2", None, None).await }),
        tokio::spawn(async move { m2.acquire("src/shared.rs", "agent-3", None, None).await }),
    );

    let successes = [a.unwrap(), b.unwrap()].into_iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 0, "the path is already held by agent-1, neither concurrent caller should win it");
}

#[tokio::test]
async fn reaping_removes_expired_leases_so_the_path_becomes_acquirable_again() {
    let manager = manager().await;
    // A duration of 0ms means the lease is already expired by the time we
    // check it.
    manager.acquire("src/y.ts", "agent-1", None, Some(0)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let reaped = manager.reap_expired().await.unwrap();
    assert_eq!(reaped, 1);

    manager.acquire("src/y.ts", "agent-2", None, Some(60_000)).await.unwrap();
}
