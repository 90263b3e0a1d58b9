//! Configuration loader: hierarchical merge of defaults, project YAML,
//! and environment overrides via `figment`.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;

use crate::domain::models::SwarmConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.swarm/config.yaml` (project config)
    /// 3. `SWARM_`-prefixed environment variables
    pub fn load() -> Result<SwarmConfig, String> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(".swarm/config.yaml"))
            .merge(Env::prefixed("SWARM_").split("__"))
            .extract()
            .map_err(|e| format!("failed to extract configuration: {e}"))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SwarmConfig, String> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .map_err(|e| format!("failed to load config from {}: {e}", path.as_ref().display()))?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let config = ConfigLoader::load_from_file(".swarm-nonexistent/config.yaml").unwrap();
        assert_eq!(config.store.max_connections, SwarmConfig::default().store.max_connections);
    }
}
