//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, LogFormat, LoggingConfig, QueueConfig, ServerConfig, SlaConfig, StorageBackend,
    StorageSettings, WorkflowConfig,
};
