pub mod agent_repository;
pub mod change_log_repository;
pub mod lease_repository;
pub mod message_repository;
pub mod offline_queue_repository;
pub mod quality_repository;
pub mod sync_client;
pub mod task_repository;

pub use agent_repository::AgentRepository;
pub use change_log_repository::ChangeLogRepository;
pub use lease_repository::LeaseRepository;
pub use message_repository::{MessageFilter, MessageRepository};
pub use offline_queue_repository::OfflineQueueRepository;
pub use quality_repository::QualityRepository;
pub use sync_client::{PullResponse, PushRequest, PushResponse, SyncClient};
pub use task_repository::{TaskFilter, TaskRepository};
