//! Quality snapshot and regression-baseline tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single point-in-time measurement of code quality, scoped to a task
/// and/or the agent that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub id: String,
    pub task_id: Option<String>,
    pub agent_id: Option<String>,
    pub build_success: Option<bool>,
    pub build_time_ms: Option<u64>,
    pub type_errors: u32,
    pub lint_errors: u32,
    pub lint_warnings: u32,
    pub tests_passing: u32,
    pub tests_failing: u32,
    pub tests_skipped: u32,
    pub test_coverage: Option<f64>,
    pub test_time_ms: Option<u64>,
    pub raw_output: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl QualitySnapshot {
    pub fn new(task_id: Option<String>, agent_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id,
            agent_id,
            build_success: None,
            build_time_ms: None,
            type_errors: 0,
            lint_errors: 0,
            lint_warnings: 0,
            tests_passing: 0,
            tests_failing: 0,
            tests_skipped: 0,
            test_coverage: None,
            test_time_ms: None,
            raw_output: None,
            recorded_at: Utc::now(),
        }
    }
}

/// The current accepted baseline for a scope (goal, project, or branch),
/// used as the comparison point for regression detection. One row per
/// scope; `set_baseline` always upserts rather than inserting a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityBaseline {
    pub scope: String,
    pub snapshot_id: String,
    pub build_success: Option<bool>,
    pub type_errors: u32,
    pub lint_errors: u32,
    pub lint_warnings: u32,
    pub tests_passing: u32,
    pub tests_failing: u32,
    pub tests_skipped: u32,
    pub test_coverage: Option<f64>,
    pub set_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Thresholds beyond which a metric counts as regressed. `type_errors`,
/// `lint_errors` and `tests_failing` regress on any increase and take no
/// threshold; `test_coverage` is the one metric called out as needing a
/// tolerance band before it's worth flagging.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegressionThresholds {
    pub max_coverage_drop: f64,
}

impl Default for RegressionThresholds {
    fn default() -> Self {
        Self { max_coverage_drop: 5.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionEntry {
    pub metric: String,
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
    pub severity: RegressionSeverity,
}

/// Compare `candidate` against `baseline` under `thresholds`, returning one
/// entry per metric that regressed. A missing baseline can never produce a
/// regression — there is nothing to regress against.
pub fn detect_regressions(candidate: &QualitySnapshot, baseline: Option<&QualityBaseline>, thresholds: RegressionThresholds) -> Vec<RegressionEntry> {
    let Some(baseline) = baseline else {
        return Vec::new();
    };

    let mut entries = Vec::new();

    let baseline_build_ok = baseline.build_success.unwrap_or(true);
    let candidate_build_ok = candidate.build_success.unwrap_or(baseline_build_ok);
    if baseline_build_ok && !candidate_build_ok {
        entries.push(RegressionEntry {
            metric: "build".to_string(),
            baseline: 1.0,
            current: 0.0,
            delta: -1.0,
            severity: RegressionSeverity::Error,
        });
    }

    push_any_increase(&mut entries, "type_errors", baseline.type_errors, candidate.type_errors);
    push_any_increase(&mut entries, "lint_errors", baseline.lint_errors, candidate.lint_errors);
    push_any_increase(&mut entries, "tests_failing", baseline.tests_failing, candidate.tests_failing);

    if let (Some(baseline_coverage), Some(current_coverage)) = (baseline.test_coverage, candidate.test_coverage) {
        let delta = current_coverage - baseline_coverage;
        if -delta > thresholds.max_coverage_drop {
            entries.push(RegressionEntry {
                metric: "test_coverage".to_string(),
                baseline: baseline_coverage,
                current: current_coverage,
                delta,
                severity: RegressionSeverity::Warning,
            });
        }
    }

    entries
}

fn push_any_increase(entries: &mut Vec<RegressionEntry>, metric: &str, baseline: u32, current: u32) {
    if current > baseline {
        entries.push(RegressionEntry {
            metric: metric.to_string(),
            baseline: baseline as f64,
            current: current as f64,
            delta: (current as f64) - (baseline as f64),
            severity: RegressionSeverity::Error,
        });
    }
}
