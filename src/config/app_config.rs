use serde::{Deserialize, Serialize};

use crate::infrastructure::observability::ObservabilityConfig;
use crate::infrastructure::sinks::SinksConfig;
use crate::infrastructure::storage::{PostgresConfig, StorageConfig};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub sla: SlaConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

/// Storage backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Which workflow deals use by default, and where its bootstrap
/// definition comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_id")]
    pub default_workflow_id: String,
    /// Overrides the bundled definition used to bootstrap the first version
    #[serde(default)]
    pub definition_path: Option<String>,
}

/// Queue drain tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_drain_limit")]
    pub drain_limit: usize,
    #[serde(default = "default_sink_timeout")]
    pub sink_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_processing_stale")]
    pub processing_stale_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    #[serde(default = "default_warning_window")]
    pub warning_window_hours: i64,
}

fn default_database_url() -> String {
    PostgresConfig::default().url
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_workflow_id() -> String {
    "fast-lease-v1".to_string()
}

fn default_drain_limit() -> usize {
    50
}

fn default_sink_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff() -> u64 {
    60
}

fn default_max_backoff() -> u64 {
    1800
}

fn default_processing_stale() -> u64 {
    600
}

fn default_warning_window() -> i64 {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl StorageSettings {
    /// Storage configuration for the repository factory
    pub fn to_storage_config(&self) -> StorageConfig {
        match self.backend {
            StorageBackend::Memory => StorageConfig::in_memory(),
            StorageBackend::Postgres => StorageConfig::postgres(
                PostgresConfig::new(&self.url)
                    .with_max_connections(self.max_connections)
                    .with_min_connections(self.min_connections)
                    .with_connect_timeout(self.connect_timeout_secs)
                    .with_idle_timeout(self.idle_timeout_secs),
            ),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_workflow_id: default_workflow_id(),
            definition_path: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            drain_limit: default_drain_limit(),
            sink_timeout_secs: default_sink_timeout(),
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
            processing_stale_secs: default_processing_stale(),
        }
    }
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            warning_window_hours: default_warning_window(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
