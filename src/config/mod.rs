//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod pipeline;

pub use pipeline::{
    PipelineConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_CONCURRENT_UPDATES,
    DEFAULT_UPDATE_TIMEOUT_MS,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "INCIDENT_BRIDGE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "INCIDENT_BRIDGE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "INCIDENT_BRIDGE_LOG";
/// Environment variable selecting the log output format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "INCIDENT_BRIDGE_LOG_FORMAT";
/// Environment variable for the OTLP collector endpoint.
pub const OTEL_ENDPOINT_ENV_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Environment variable for OpenTelemetry service name.
pub const OTEL_SERVICE_NAME_ENV_VAR: &str = "OTEL_SERVICE_NAME";

use serde::Deserialize;

use crate::bus::MessagingConfig;
use crate::service::ServiceConfig;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker configuration.
    pub messaging: MessagingConfig,
    /// Filter and dispatch tuning.
    pub pipeline: PipelineConfig,
    /// Domain service backend.
    pub service: ServiceConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("pipeline.accepted_message_types")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pipeline = &self.pipeline;
        if pipeline.accepted_message_types.is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.accepted_message_types must not be empty".to_string(),
            ));
        }
        if pipeline.required_body_field.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.required_body_field must not be empty".to_string(),
            ));
        }
        if pipeline.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.channel_capacity must be positive".to_string(),
            ));
        }
        if pipeline.max_concurrent_updates == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_concurrent_updates must be positive".to_string(),
            ));
        }
        if pipeline.update_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.update_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
