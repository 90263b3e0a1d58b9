//! Top-level runtime configuration, loaded via figment (defaults -> YAML
//! -> environment) and validated once at startup.

use serde::{Deserialize, Serialize};

use super::sync_state::ConflictStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: ".swarm/swarm.db".to_string(),
            max_connections: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub stale_agent_threshold: String,
    pub default_max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stale_agent_threshold: "90s".to_string(),
            default_max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    pub default_duration: String,
    pub max_duration: String,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { default_duration: "5m".to_string(), max_duration: "1h".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBusConfig {
    pub channel_capacity: usize,
    pub default_message_ttl: String,
}

impl Default for MessageBusConfig {
    fn default() -> Self {
        Self { channel_capacity: 1_024, default_message_ttl: "1h".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub remote_url: Option<String>,
    pub api_key: Option<String>,
    pub push_interval: String,
    pub pull_interval: String,
    pub conflict_strategy: ConflictStrategy,
    pub backoff_base: String,
    pub backoff_max: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_key: None,
            push_interval: "30s".to_string(),
            pull_interval: "30s".to_string(),
            conflict_strategy: ConflictStrategy::LastWriteWins,
            backoff_base: "1s".to_string(),
            backoff_max: "5m".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    pub max_cycles: Option<u64>,
    pub max_runtime: Option<String>,
    pub idle_timeout: Option<String>,
    pub max_consecutive_failures: Option<u32>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self { max_cycles: None, max_runtime: None, idle_timeout: Some("10m".to_string()), max_consecutive_failures: Some(5) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty, file_path: None }
    }
}

/// Root configuration, assembled via a figment layer chain: built-in
/// defaults, then `.swarm/config.yaml`, then `SWARM_`-prefixed
/// environment overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub message_bus: MessageBusConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SwarmConfig {
    /// Post-load validation: checks the duration-syntax fields parse and
    /// that cross-field constraints hold.
    pub fn validate(&self) -> Result<(), String> {
        super::duration::parse_duration_ms(&self.scheduler.stale_agent_threshold).map_err(|e| e.to_string())?;
        super::duration::parse_duration_ms(&self.lease.default_duration).map_err(|e| e.to_string())?;
        super::duration::parse_duration_ms(&self.lease.max_duration).map_err(|e| e.to_string())?;
        super::duration::parse_duration_ms(&self.message_bus.default_message_ttl).map_err(|e| e.to_string())?;
        super::duration::parse_duration_ms(&self.sync.push_interval).map_err(|e| e.to_string())?;
        super::duration::parse_duration_ms(&self.sync.pull_interval).map_err(|e| e.to_string())?;
        super::duration::parse_duration_ms(&self.sync.backoff_base).map_err(|e| e.to_string())?;
        super::duration::parse_duration_ms(&self.sync.backoff_max).map_err(|e| e.to_string())?;

        if let Some(ref idle) = self.governor.idle_timeout {
            super::duration::parse_duration_ms(idle).map_err(|e| e.to_string())?;
        }
        if let Some(ref max_runtime) = self.governor.max_runtime {
            super::duration::parse_duration_ms(max_runtime).map_err(|e| e.to_string())?;
        }

        if self.store.max_connections == 0 {
            return Err("store.max_connections must be at least 1".to_string());
        }
        if self.sync.remote_url.is_some() && self.sync.api_key.is_none() {
            return Err("sync.api_key is required when sync.remote_url is set".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(SwarmConfig::default().validate().is_ok());
    }

    #[test]
    fn remote_url_without_api_key_is_invalid() {
        let mut cfg = SwarmConfig::default();
        cfg.sync.remote_url = Some("https://example.invalid".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_connections_is_invalid() {
        let mut cfg = SwarmConfig::default();
        cfg.store.max_connections = 0;
        assert!(cfg.validate().is_err());
    }
}
