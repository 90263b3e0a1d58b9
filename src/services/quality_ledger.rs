//! Quality ledger: records snapshots and flags regressions against the
//! scope's current baseline.

use std::sync::Arc;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{detect_regressions, ChangeLogEntry, ChangeOp, EntityKind, QualityBaseline, QualitySnapshot, RegressionEntry, RegressionThresholds};
use crate::domain::ports::{ChangeLogRepository, QualityRepository};

use super::sync_version::SyncVersionCounter;

pub struct QualityLedger<Q: QualityRepository, C: ChangeLogRepository> {
    quality: Arc<Q>,
    change_log: Arc<C>,
    sync_version: SyncVersionCounter,
    thresholds: RegressionThresholds,
}

impl<Q: QualityRepository, C: ChangeLogRepository> QualityLedger<Q, C> {
    pub fn new(quality: Arc<Q>, change_log: Arc<C>, sync_version: SyncVersionCounter, thresholds: RegressionThresholds) -> Self {
        Self { quality, change_log, sync_version, thresholds }
    }

    /// Record `snapshot` and check it against `scope`'s current baseline.
    /// Does not move the baseline itself; call [`QualityLedger::promote_baseline`]
    /// once the candidate has been accepted.
    pub async fn record(&self, snapshot: QualitySnapshot, scope: &str) -> SwarmResult<Vec<RegressionEntry>> {
        self.quality.record_snapshot(&snapshot).await?;
        let version = self.sync_version.next().await;
        self.change_log
            .append(&ChangeLogEntry::new(version, EntityKind::QualitySnapshot, &snapshot.id, ChangeOp::Insert, serde_json::to_value(&snapshot)?, "local"))
            .await?;
        let baseline = self.quality.get_baseline(scope).await?;
        let entries = detect_regressions(&snapshot, baseline.as_ref(), self.thresholds);
        if entries.is_empty() {
            tracing::info!(snapshot_id = %snapshot.id, "quality snapshot recorded");
        } else {
            tracing::warn!(snapshot_id = %snapshot.id, regressions = ?entries, "quality regression detected");
        }
        Ok(entries)
    }

    pub async fn promote_baseline(&self, scope: &str, snapshot: &QualitySnapshot, set_by: &str) -> SwarmResult<()> {
        let created_at = match self.quality.get_baseline(scope).await? {
            Some(existing) => existing.created_at,
            None => chrono::Utc::now(),
        };
        let baseline = QualityBaseline {
            scope: scope.to_string(),
            snapshot_id: snapshot.id.clone(),
            build_success: snapshot.build_success,
            type_errors: snapshot.type_errors,
            lint_errors: snapshot.lint_errors,
            lint_warnings: snapshot.lint_warnings,
            tests_passing: snapshot.tests_passing,
            tests_failing: snapshot.tests_failing,
            tests_skipped: snapshot.tests_skipped,
            test_coverage: snapshot.test_coverage,
            set_by: set_by.to_string(),
            created_at,
            updated_at: chrono::Utc::now(),
        };
        self.quality.set_baseline(&baseline).await
    }

    pub async fn history(&self, task_id: &str) -> SwarmResult<Vec<QualitySnapshot>> {
        self.quality.list_snapshots_for_task(task_id).await
    }

    pub async fn baseline(&self, scope: &str) -> SwarmResult<QualityBaseline> {
        self.quality.get_baseline(scope).await?.ok_or_else(|| SwarmError::NotFound(format!("baseline for scope {scope}")))
    }
}
