use std::sync::Arc;

use abathur_swarm::adapters::sqlite::{self, SqliteChangeLogRepository, SqliteQualityRepository};
use abathur_swarm::domain::models::{QualitySnapshot, RegressionThresholds};
use abathur_swarm::services::{QualityLedger, SyncVersionCounter};

async fn ledger() -> QualityLedger<SqliteQualityRepository, SqliteChangeLogRepository> {
    let pool = sqlite::create_test_pool().await.unwrap();
    sqlite::Migrator::new(pool.clone()).run_embedded_migrations(sqlite::all_embedded_migrations()).await.unwrap();
    let quality = Arc::new(SqliteQualityRepository::new(pool.clone()));
    let change_log = Arc::new(SqliteChangeLogRepository::new(pool));
    QualityLedger::new(quality, change_log, SyncVersionCounter::starting_at(0), RegressionThresholds::default())
}

fn baseline_snapshot() -> QualitySnapshot {
    let mut snapshot = QualitySnapshot::new(Some("t1".to_string()), Some("agent-1".to_string()));
    snapshot.build_success = Some(true);
    snapshot.tests_passing = 20;
    snapshot.test_coverage = Some(80.0);
    snapshot
}

#[tokio::test]
async fn s7_recording_a_regressed_snapshot_against_a_promoted_baseline_flags_three_metrics() {
    let ledger = ledger().await;

    let baseline = baseline_snapshot();
    let initial = ledger.record(baseline.clone(), "goal-1").await.unwrap();
    assert!(initial.is_empty(), "nothing to regress against before a baseline exists");
    ledger.promote_baseline("goal-1", &baseline, "ci").await.unwrap();

    let mut candidate = QualitySnapshot::new(Some("t2".to_string()), Some("agent-1".to_string()));
    candidate.build_success = Some(true);
    candidate.type_errors = 2;
    candidate.tests_failing = 5;
    candidate.test_coverage = Some(70.0);

    let entries = ledger.record(candidate, "goal-1").await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().any(|e| e.metric == "type_errors" && e.delta == 2.0));
    assert!(entries.iter().any(|e| e.metric == "tests_failing" && e.delta == 5.0));
    assert!(entries.iter().any(|e| e.metric == "test_coverage" && e.delta == -10.0));
}

#[tokio::test]
async fn promoting_a_baseline_twice_keeps_one_row_per_scope() {
    let ledger = ledger().await;
    let snapshot = baseline_snapshot();

    ledger.promote_baseline("goal-1", &snapshot, "ci").await.unwrap();
    let first = ledger.baseline("goal-1").await.unwrap();

    let mut updated = snapshot.clone();
    updated.tests_passing = 25;
    ledger.promote_baseline("goal-1", &updated, "ci").await.unwrap();
    let second = ledger.baseline("goal-1").await.unwrap();

    assert_eq!(second.tests_passing, 25);
    assert_eq!(first.created_at, second.created_at, "created_at must survive an upsert");
}
