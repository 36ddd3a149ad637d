//! Hierarchical configuration: defaults merged with YAML then environment
//! variables, mirroring
//! `examples/odgrim-abathur-swarm/src/infrastructure/config/loader.rs::ConfigLoader::load`.

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::FullMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullModeConfig {
    Wait,
    DropOldest,
    DropNewest,
    DropWrite,
}

impl From<FullModeConfig> for FullMode {
    fn from(value: FullModeConfig) -> Self {
        match value {
            FullModeConfig::Wait => FullMode::Wait,
            FullModeConfig::DropOldest => FullMode::DropOldest,
            FullModeConfig::DropNewest => FullMode::DropNewest,
            FullModeConfig::DropWrite => FullMode::DropWrite,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    pub capacity: usize,
    pub full_mode: FullModeConfig,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            full_mode: FullModeConfig::Wait,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub port: u16,
    /// Highest port `serve()` will try if `port` (and each port above it) is
    /// already bound, per spec §6's "fallback scan 8081-9000".
    pub fallback_scan_limit: u16,
    pub enable_cors: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            fallback_scan_limit: 9000,
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub working_directory: PathBuf,
    pub event_bus: EventBusConfig,
    pub heartbeat_timeout_secs: u64,
    pub default_polling_interval_ms: u64,
    pub default_task_wait_secs: u64,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::from("."),
            event_bus: EventBusConfig::default(),
            heartbeat_timeout_secs: 90,
            default_polling_interval_ms: 1000,
            default_task_wait_secs: 30,
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Loads defaults, then `.aiswarm/config.yaml` if present, then
    /// `AISWARM_`-prefixed environment variables (`__` as the nesting
    /// separator), in that precedence order.
    pub fn load(working_directory: &std::path::Path) -> Result<Self, ConfigError> {
        let yaml_path = working_directory.join(".aiswarm").join("config.yaml");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("AISWARM_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_bus.capacity == 0 {
            return Err(ConfigError::Validation("event_bus.capacity must be greater than zero".into()));
        }
        if self.http.fallback_scan_limit < self.http.port {
            return Err(ConfigError::Validation(
                "http.fallback_scan_limit must be >= http.port".into(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.working_directory.join(".aiswarm").join("aiswarm.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let mut config = Config::default();
        config.event_bus.capacity = 0;
        assert!(config.validate().is_err());
    }
}
