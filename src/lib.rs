//! Coordination plane for a local swarm of autonomous worker agents:
//! durable task/agent store, skill-aware scheduler, exclusive file
//! leases, a pub/sub message bus, quality regression tracking, and
//! change-log-driven sync to a remote replica.
//!
//! This crate is library-first; `src/bin/swarmd.rs` is the thin daemon
//! that boots a [`CoordinationPlane`] and drives its governed work loop.

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod services;

use std::sync::Arc;

use sqlx::SqlitePool;

use adapters::http::HttpSyncClient;
use adapters::sqlite::{
    self, SqliteAgentRepository, SqliteChangeLogRepository, SqliteLeaseRepository,
    SqliteMessageRepository, SqliteOfflineQueueRepository, SqliteQualityRepository,
    SqliteTaskRepository,
};
use domain::models::{duration::parse_duration_ms, SwarmConfig};
use domain::ports::TaskFilter;
use domain::SwarmResult;
use infra::logging::LoggingGuard;
use services::{
    runtime_governor::{EndState, GovernorLimits, QueueCounts, RuntimeGovernor},
    AgentRegistry, ChangeLogService, ConflictResolver, LeaseManager, MessageBus,
    OfflineQueueService, QualityLedger, Scheduler, SyncEngine, SyncEngineConfig, SyncVersionCounter,
    TaskRegistry,
};

type Tasks = SqliteTaskRepository;
type Agents = SqliteAgentRepository;
type Leases = SqliteLeaseRepository;
type Messages = SqliteMessageRepository;
type Quality = SqliteQualityRepository;
type ChangeLog = SqliteChangeLogRepository;
type OfflineQueue = SqliteOfflineQueueRepository;

/// The sync engine is only assembled when `config.sync.remote_url` is set;
/// running without a remote replica (a single isolated swarm) is a normal
/// deployment mode, not a degraded one.
pub struct SyncHandle {
    pub engine: SyncEngine<Tasks, ChangeLog, OfflineQueue, HttpSyncClient, Messages, Quality>,
}

/// Owns every concrete adapter and service this process needs, wired
/// against one SQLite pool. Construct via [`CoordinationPlane::bootstrap`].
pub struct CoordinationPlane {
    pub config: SwarmConfig,
    pub pool: SqlitePool,
    pub tasks: TaskRegistry<Tasks, ChangeLog>,
    pub agents: AgentRegistry<Agents, ChangeLog, Leases>,
    pub leases: LeaseManager<Leases>,
    pub messages: MessageBus<Messages, ChangeLog>,
    pub quality: QualityLedger<Quality, ChangeLog>,
    pub change_log: ChangeLogService<ChangeLog>,
    pub offline_queue: OfflineQueueService<OfflineQueue>,
    pub conflict_resolver: Arc<ConflictResolver>,
    pub sync: Option<SyncHandle>,
    pub governor: RuntimeGovernor,
    _logging_guard: LoggingGuard,
}

impl CoordinationPlane {
    /// Load configuration, initialize logging, open the SQLite pool, run
    /// pending migrations, and wire every service. This is the one place
    /// all the concrete adapter types meet the service layer.
    pub async fn bootstrap() -> Result<Self, String> {
        let config = infra::ConfigLoader::load()?;
        let logging_guard = infra::logging::init(&config)?;
        Self::from_config(config, logging_guard).await
    }

    async fn from_config(config: SwarmConfig, logging_guard: LoggingGuard) -> Result<Self, String> {
        let pool_config = sqlite::PoolConfig {
            max_connections: config.store.max_connections,
            busy_timeout: std::time::Duration::from_millis(config.store.busy_timeout_ms),
            ..Default::default()
        };
        let pool = sqlite::create_pool(&config.store.database_path, Some(pool_config))
            .await
            .map_err(|e| format!("failed to open store: {e}"))?;

        sqlite::Migrator::new(pool.clone())
            .run_embedded_migrations(sqlite::all_embedded_migrations())
            .await
            .map_err(|e| format!("failed to run migrations: {e}"))?;

        let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let agent_repo = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let lease_repo = Arc::new(SqliteLeaseRepository::new(pool.clone()));
        let message_repo = Arc::new(SqliteMessageRepository::new(pool.clone()));
        let quality_repo = Arc::new(SqliteQualityRepository::new(pool.clone()));
        let change_log_repo = Arc::new(SqliteChangeLogRepository::new(pool.clone()));
        let offline_queue_repo = Arc::new(SqliteOfflineQueueRepository::new(pool.clone()));

        let sequence = SyncVersionCounter::starting_at(0);

        let stale_agent_threshold_ms =
            parse_duration_ms(&config.scheduler.stale_agent_threshold).map_err(|e| e.to_string())? as i64;
        let lease_default_ms = parse_duration_ms(&config.lease.default_duration).map_err(|e| e.to_string())? as i64;
        let lease_max_ms = parse_duration_ms(&config.lease.max_duration).map_err(|e| e.to_string())? as i64;

        let scheduler = Scheduler::new(task_repo.clone(), services::SchedulerConfig {
            related_skills: Default::default(),
            related_skill_credit: 0.5,
        });
        let tasks = TaskRegistry::new(task_repo.clone(), change_log_repo.clone(), scheduler, sequence.clone());
        let agents = AgentRegistry::new(agent_repo, change_log_repo.clone(), lease_repo.clone(), sequence.clone(), stale_agent_threshold_ms);
        let leases = LeaseManager::new(lease_repo, lease_default_ms, lease_max_ms);
        let messages = MessageBus::new(message_repo.clone(), change_log_repo.clone(), config.message_bus.channel_capacity, sequence.clone());
        let quality = QualityLedger::new(quality_repo.clone(), change_log_repo.clone(), sequence.clone(), domain::models::RegressionThresholds::default());
        let change_log = ChangeLogService::new(change_log_repo.clone());
        let offline_queue = OfflineQueueService::new(offline_queue_repo.clone(), domain::models::BackoffPolicy::default());
        let conflict_resolver = Arc::new(ConflictResolver::new(config.sync.conflict_strategy));

        let sync = match (&config.sync.remote_url, &config.sync.api_key) {
            (Some(url), Some(api_key)) => {
                let client = Arc::new(
                    HttpSyncClient::new(url.clone(), api_key.clone())
                        .map_err(|e| format!("failed to construct sync client: {e}"))?,
                );
                let state_file_path = std::path::Path::new(&config.store.database_path)
                    .parent()
                    .unwrap_or_else(|| std::path::Path::new(".swarm"))
                    .join("sync-state.json");
                let engine = SyncEngine::new(
                    task_repo,
                    change_log_repo,
                    OfflineQueueService::new(offline_queue_repo, domain::models::BackoffPolicy::default()),
                    client,
                    conflict_resolver.clone(),
                    message_repo,
                    quality_repo,
                    SyncEngineConfig {
                        client_id: uuid::Uuid::new_v4().to_string(),
                        batch_size: 100,
                        pull_limit: 100,
                        max_retries: 5,
                        state_file_path,
                    },
                );
                Some(SyncHandle { engine })
            }
            _ => None,
        };

        let governor_limits = GovernorLimits {
            max_cycles: config.governor.max_cycles,
            max_runtime_ms: config
                .governor
                .max_runtime
                .as_deref()
                .map(parse_duration_ms)
                .transpose()
                .map_err(|e| e.to_string())?
                .map(|ms| ms as i64),
            idle_timeout_ms: config
                .governor
                .idle_timeout
                .as_deref()
                .map(parse_duration_ms)
                .transpose()
                .map_err(|e| e.to_string())?
                .map(|ms| ms as i64),
            max_consecutive_failures: config.governor.max_consecutive_failures,
        };
        let governor = RuntimeGovernor::new(governor_limits);

        Ok(Self {
            config,
            pool,
            tasks,
            agents,
            leases,
            messages,
            quality,
            change_log,
            offline_queue,
            conflict_resolver,
            sync,
            governor,
            _logging_guard: logging_guard,
        })
    }

    /// Snapshot the task queue's occupancy for the governor's
    /// `all_tasks_complete`/`idle_timeout` checks.
    pub async fn queue_counts(&self) -> SwarmResult<QueueCounts> {
        use domain::models::TaskStatus;

        let ready = self.tasks.list(TaskFilter { status: Some(TaskStatus::Ready), ..Default::default() }).await?.len() as u64;
        let claimed = self.tasks.list(TaskFilter { status: Some(TaskStatus::Claimed), ..Default::default() }).await?.len() as u64;
        let in_progress = self.tasks.list(TaskFilter { status: Some(TaskStatus::InProgress), ..Default::default() }).await?.len() as u64;
        let pending_retry = self.tasks.list(TaskFilter { status: Some(TaskStatus::PendingRetry), ..Default::default() }).await?.len() as u64;

        Ok(QueueCounts { ready, claimed, in_progress, pending_retry })
    }

    /// Run one maintenance sweep: promote due retries, reclaim orphaned
    /// tasks from stale agents, reap expired leases and messages, and run
    /// a sync pass if a remote replica is configured. Called once per
    /// governor cycle by the daemon loop.
    pub async fn run_maintenance_cycle(&self) -> SwarmResult<()> {
        self.tasks.promote_due_retries().await?;

        let stale_agent_ids = self.agents.reap_stale().await?;
        if !stale_agent_ids.is_empty() {
            self.tasks.reclaim_orphaned(&stale_agent_ids).await?;
        }

        self.leases.reap_expired().await?;
        self.messages.reap_expired().await?;

        if let Some(sync) = &self.sync {
            if let Err(err) = sync.engine.sync().await {
                tracing::warn!(%err, "sync pass failed during maintenance cycle");
            }
        }

        self.governor.record_cycle();
        Ok(())
    }

    /// Evaluate whether the outer work loop should stop, given the
    /// current queue occupancy and an externally-supplied objective
    /// predicate.
    pub async fn evaluate_end_state(&self, objective_complete: bool) -> SwarmResult<Option<EndState>> {
        let queue = self.queue_counts().await?;
        Ok(self.governor.evaluate(queue, objective_complete))
    }
}
