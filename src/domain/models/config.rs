use serde::{Deserialize, Serialize};

use super::template::WebhookEndpoint;

/// Main configuration structure for Approvalflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Webhook notifier configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Engine housekeeping configuration
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".approvalflow/approvalflow.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// `sqlx` connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_log_rotation(),
        }
    }
}

/// Webhook notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotifierConfig {
    /// Number of delivery workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Events buffered before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delivery attempts per webhook, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Client-wide HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Endpoints that receive events for every template
    #[serde(default)]
    pub default_webhooks: Vec<WebhookEndpoint>,
}

const fn default_workers() -> usize {
    4
}

const fn default_queue_capacity() -> usize {
    1024
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            default_webhooks: vec![],
        }
    }
}

/// Engine housekeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Seconds between timeout sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}
