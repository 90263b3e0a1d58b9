pub mod agent_registry;
pub mod change_log_service;
pub mod conflict_resolver;
pub mod expiring;
pub mod lease_manager;
pub mod message_bus;
pub mod offline_queue_service;
pub mod quality_ledger;
pub mod scheduler;
pub mod sync_engine;
pub mod sync_version;
pub mod task_registry;
pub mod runtime_governor;

pub use agent_registry::AgentRegistry;
pub use change_log_service::ChangeLogService;
pub use conflict_resolver::{ConflictRecord, ConflictResolver};
pub use expiring::ExpiringSet;
pub use lease_manager::LeaseManager;
pub use message_bus::MessageBus;
pub use offline_queue_service::OfflineQueueService;
pub use quality_ledger::QualityLedger;
pub use runtime_governor::{EndState, GovernorEvent, GovernorLimits, QueueCounts, RuntimeGovernor};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use sync_engine::{SyncEngine, SyncEngineConfig, SyncOutcome, SyncPhase};
pub use sync_version::SyncVersionCounter;
pub use task_registry::TaskRegistry;
