//! Runtime governor: tracks the outer work loop's progress and decides
//! when it should stop (C12).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndState {
    ManualStop,
    MaxCyclesReached,
    MaxRuntimeReached,
    IdleTimeout,
    AllTasksComplete,
    MaxFailuresReached,
    ObjectiveComplete,
    FatalError,
}

impl EndState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualStop => "manual_stop",
            Self::MaxCyclesReached => "max_cycles_reached",
            Self::MaxRuntimeReached => "max_runtime_reached",
            Self::IdleTimeout => "idle_timeout",
            Self::AllTasksComplete => "all_tasks_complete",
            Self::MaxFailuresReached => "max_failures_reached",
            Self::ObjectiveComplete => "objective_complete",
            Self::FatalError => "fatal_error",
        }
    }
}

#[derive(Debug, Clone)]
pub enum GovernorEvent {
    CycleComplete { cycle: u64 },
    TaskComplete { task_id: String },
    TaskFailed { task_id: String },
    IdleDetected,
    LimitWarning { message: String },
    EndState(EndState),
}

#[derive(Debug, Clone, Copy)]
pub struct GovernorLimits {
    pub max_cycles: Option<u64>,
    pub max_runtime_ms: Option<i64>,
    pub idle_timeout_ms: Option<i64>,
    pub max_consecutive_failures: Option<u32>,
}

/// Snapshot of queue occupancy used to decide `all_tasks_complete` and
/// `idle_timeout` (queue empty is part of both conditions).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueCounts {
    pub ready: u64,
    pub claimed: u64,
    pub in_progress: u64,
    pub pending_retry: u64,
}

impl QueueCounts {
    pub fn is_empty(&self) -> bool {
        self.ready + self.claimed + self.in_progress + self.pending_retry == 0
    }
}

struct Counters {
    cycle_count: u64,
    tasks_completed: u64,
    tasks_failed: u64,
    consecutive_failures: u32,
    last_work_at: DateTime<Utc>,
}

pub struct RuntimeGovernor {
    started_at: DateTime<Utc>,
    limits: GovernorLimits,
    counters: Mutex<Counters>,
    manual_stop: AtomicU64,
    sender: broadcast::Sender<GovernorEvent>,
}

impl RuntimeGovernor {
    pub fn new(limits: GovernorLimits) -> Self {
        let (sender, _) = broadcast::channel(256);
        let now = Utc::now();
        Self {
            started_at: now,
            limits,
            counters: Mutex::new(Counters { cycle_count: 0, tasks_completed: 0, tasks_failed: 0, consecutive_failures: 0, last_work_at: now }),
            manual_stop: AtomicU64::new(0),
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GovernorEvent> {
        self.sender.subscribe()
    }

    fn emit(&self, event: GovernorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn request_stop(&self) {
        self.manual_stop.store(1, Ordering::SeqCst);
    }

    pub fn record_cycle(&self) {
        let cycle = {
            let mut c = self.counters.lock().expect("governor counters mutex poisoned");
            c.cycle_count += 1;
            c.cycle_count
        };
        self.emit(GovernorEvent::CycleComplete { cycle });
    }

    pub fn record_task_complete(&self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        {
            let mut c = self.counters.lock().expect("governor counters mutex poisoned");
            c.tasks_completed += 1;
            c.consecutive_failures = 0;
            c.last_work_at = Utc::now();
        }
        self.emit(GovernorEvent::TaskComplete { task_id });
    }

    pub fn record_task_failed(&self, task_id: impl Into<String>) {
        let task_id = task_id.into();
        {
            let mut c = self.counters.lock().expect("governor counters mutex poisoned");
            c.tasks_failed += 1;
            c.consecutive_failures += 1;
            c.last_work_at = Utc::now();
        }
        self.emit(GovernorEvent::TaskFailed { task_id });
    }

    /// Evaluate end-state conditions after a cycle. `objective_complete`
    /// is an externally-supplied predicate since only the caller knows
    /// what the swarm's objective actually is.
    pub fn evaluate(&self, queue: QueueCounts, objective_complete: bool) -> Option<EndState> {
        let now = Utc::now();
        let c = self.counters.lock().expect("governor counters mutex poisoned");

        let end_state = if self.manual_stop.load(Ordering::SeqCst) == 1 {
            Some(EndState::ManualStop)
        } else if objective_complete {
            Some(EndState::ObjectiveComplete)
        } else if self.limits.max_cycles.is_some_and(|max| c.cycle_count >= max) {
            Some(EndState::MaxCyclesReached)
        } else if self.limits.max_runtime_ms.is_some_and(|max| now.signed_duration_since(self.started_at).num_milliseconds() >= max) {
            Some(EndState::MaxRuntimeReached)
        } else if self.limits.max_consecutive_failures.is_some_and(|max| c.consecutive_failures >= max) {
            Some(EndState::MaxFailuresReached)
        } else if queue.is_empty() && c.cycle_count > 0 && (c.tasks_completed > 0 || c.tasks_failed > 0) {
            Some(EndState::AllTasksComplete)
        } else if self.limits.idle_timeout_ms.is_some_and(|idle| queue.is_empty() && now.signed_duration_since(c.last_work_at).num_milliseconds() >= idle) {
            Some(EndState::IdleTimeout)
        } else {
            None
        };

        drop(c);

        if let Some(state) = end_state {
            self.emit(GovernorEvent::EndState(state));
        } else if queue.is_empty() {
            self.emit(GovernorEvent::IdleDetected);
        }

        end_state
    }

    pub fn elapsed_ms(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> GovernorLimits {
        GovernorLimits { max_cycles: None, max_runtime_ms: None, idle_timeout_ms: None, max_consecutive_failures: None }
    }

    #[test]
    fn manual_stop_wins_over_everything() {
        let gov = RuntimeGovernor::new(limits());
        gov.request_stop();
        assert_eq!(gov.evaluate(QueueCounts::default(), false), Some(EndState::ManualStop));
    }

    #[test]
    fn max_cycles_triggers_end_state() {
        let gov = RuntimeGovernor::new(GovernorLimits { max_cycles: Some(2), ..limits() });
        gov.record_cycle();
        assert_eq!(gov.evaluate(QueueCounts { ready: 1, ..Default::default() }, false), None);
        gov.record_cycle();
        assert_eq!(gov.evaluate(QueueCounts { ready: 1, ..Default::default() }, false), Some(EndState::MaxCyclesReached));
    }

    #[test]
    fn max_failures_triggers_before_anything_else() {
        let gov = RuntimeGovernor::new(GovernorLimits { max_consecutive_failures: Some(1), ..limits() });
        gov.record_task_failed("t1");
        assert_eq!(gov.evaluate(QueueCounts { ready: 1, ..Default::default() }, false), Some(EndState::MaxFailuresReached));
    }

    #[test]
    fn empty_queue_with_completed_work_is_all_tasks_complete() {
        let gov = RuntimeGovernor::new(limits());
        gov.record_cycle();
        gov.record_task_complete("t1");
        assert_eq!(gov.evaluate(QueueCounts::default(), false), Some(EndState::AllTasksComplete));
    }

    #[test]
    fn objective_predicate_short_circuits() {
        let gov = RuntimeGovernor::new(limits());
        assert_eq!(gov.evaluate(QueueCounts { ready: 5, ..Default::default() }, true), Some(EndState::ObjectiveComplete));
    }
}
