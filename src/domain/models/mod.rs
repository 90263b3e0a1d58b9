pub mod agent;
pub mod change_log;
pub mod config;
pub mod duration;
pub mod lease;
pub mod message;
pub mod offline_queue;
pub mod quality;
pub mod sync_state;
pub mod task;

pub use agent::{normalize_skill, Agent, AgentStatus, CapabilityFlags, MachineInfo, TaskPhase};
pub use change_log::{ChangeLogEntry, ChangeOp, EntityKind};
pub use config::SwarmConfig;
pub use duration::{parse_duration_ms, render_duration, DurationParseError};
pub use lease::Lease;
pub use message::{Message, MessageType};
pub use offline_queue::{BackoffPolicy, QueuedChange, QueuedChangeStatus};
pub use quality::{detect_regressions, QualityBaseline, QualitySnapshot, RegressionEntry, RegressionSeverity, RegressionThresholds};
pub use sync_state::{diff_fields, resolve_conflict, ConflictSide, ConflictStrategy, ConflictWinner, FieldConflict, SyncState};
pub use task::{FailureType, Task, TaskFailure, TaskPriority, TaskStatus};
