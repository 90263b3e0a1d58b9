pub mod agent_repository;
pub mod change_log_repository;
pub mod connection;
pub mod lease_repository;
pub mod message_repository;
pub mod migrations;
pub mod offline_queue_repository;
pub mod quality_repository;
pub mod task_repository;
pub mod task_row;

pub use agent_repository::SqliteAgentRepository;
pub use change_log_repository::SqliteChangeLogRepository;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use lease_repository::SqliteLeaseRepository;
pub use message_repository::SqliteMessageRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use offline_queue_repository::SqliteOfflineQueueRepository;
pub use quality_repository::SqliteQualityRepository;
pub use task_repository::SqliteTaskRepository;
