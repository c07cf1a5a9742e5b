use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid notifier workers: {0}. Must be at least 1")]
    InvalidWorkers(usize),

    #[error("Invalid queue_capacity: {0}. Must be at least 1")]
    InvalidQueueCapacity(usize),

    #[error("Invalid max_attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid request_timeout_secs: {0}. Must be positive")]
    InvalidRequestTimeout(u64),

    #[error("Invalid sweep_interval_secs: {0}. Must be positive")]
    InvalidSweepInterval(u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .approvalflow/config.yaml (project config, created by init)
    /// 3. .approvalflow/local.yaml (local overrides, optional)
    /// 4. Environment variables (APPROVALFLOW_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".approvalflow/config.yaml"))
            .merge(Yaml::file(".approvalflow/local.yaml"))
            .merge(Env::prefixed("APPROVALFLOW_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        let notifier = &config.notifier;
        if notifier.workers == 0 {
            return Err(ConfigError::InvalidWorkers(notifier.workers));
        }
        if notifier.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(notifier.queue_capacity));
        }
        if notifier.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(notifier.max_attempts));
        }
        if notifier.initial_backoff_ms >= notifier.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                notifier.initial_backoff_ms,
                notifier.max_backoff_ms,
            ));
        }
        if notifier.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidRequestTimeout(
                notifier.request_timeout_secs,
            ));
        }
        for hook in &notifier.default_webhooks {
            if !hook.url.starts_with("http://") && !hook.url.starts_with("https://") {
                return Err(ConfigError::ValidationFailed(format!(
                    "Default webhook URL '{}' must be http(s)",
                    hook.url
                )));
            }
        }

        if config.engine.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidSweepInterval(
                config.engine.sweep_interval_secs,
            ));
        }

        Ok(())
    }
}
