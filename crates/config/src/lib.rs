//! Configuration management for the heatwatch service
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `HEATWATCH_`-prefixed environment variables where `__` separates nested
//! keys (`HEATWATCH_PROCESSOR__PATTERN__THRESHOLD_CELSIUS=40`).

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use processor::config::ProcessorConfig;
use processor::pipeline::StreamPipelineBuilder;
use processor::sink::{KafkaStoreConfig, PostgresStoreConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "HEATWATCH_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, also used as the pipeline name
    #[serde(default = "default_name")]
    pub name: String,

    /// Stream processor settings
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Warning store (PostgreSQL)
    #[serde(default)]
    pub relational_store: PostgresStoreConfig,

    /// Daily maximum store (Kafka)
    #[serde(default)]
    pub analytical_store: KafkaStoreConfig,

    /// Observability settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_name() -> String {
    "heatwatch".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            processor: ProcessorConfig::default(),
            relational_store: PostgresStoreConfig::default(),
            analytical_store: KafkaStoreConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from defaults, file and environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ServiceConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: ServiceConfig = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ConfigError::ValidationError("Service name required".to_string()));
        }

        self.processor
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        self.relational_store
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.relational_store.database_url.is_empty() {
            return Err(ConfigError::ValidationError("Database URL required".to_string()));
        }

        if self.analytical_store.brokers.is_empty() || self.analytical_store.topic.is_empty() {
            return Err(ConfigError::ValidationError(
                "Kafka brokers and topic required".to_string(),
            ));
        }

        if self.observability.log_level.is_empty() {
            return Err(ConfigError::ValidationError("Log level required".to_string()));
        }

        Ok(())
    }

    /// Pipeline builder preloaded with the processor settings
    pub fn pipeline_builder(&self) -> StreamPipelineBuilder {
        StreamPipelineBuilder::from_config(self.processor.clone()).with_name(self.name.clone())
    }
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level or `tracing` filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}
