//! Storage factory for runtime storage selection

use std::sync::Arc;

use tracing::info;

use crate::domain::{
    AuditRepository, DealRepository, DomainError, QueueRepository, TaskRepository,
    WorkflowVersionRepository,
};
use crate::infrastructure::audit::{InMemoryAuditRepository, PostgresAuditRepository};
use crate::infrastructure::deal::{InMemoryDealRepository, PostgresDealRepository};
use crate::infrastructure::queue::{InMemoryQueueRepository, PostgresQueueRepository};
use crate::infrastructure::task::{InMemoryTaskRepository, PostgresTaskRepository};
use crate::infrastructure::version::{
    InMemoryWorkflowVersionRepository, PostgresWorkflowVersionRepository,
};

use super::migrations::run_storage_migrations;
use super::postgres::{connect_pool, PostgresConfig};

/// Supported storage types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    InMemory,
    /// PostgreSQL storage
    Postgres,
}

impl StorageType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" | "in_memory" => Some(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    InMemory,
    Postgres(PostgresConfig),
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self::InMemory
    }

    pub fn postgres(config: PostgresConfig) -> Self {
        Self::Postgres(config)
    }

    pub fn postgres_url(url: impl Into<String>) -> Self {
        Self::Postgres(PostgresConfig::new(url))
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::InMemory => StorageType::InMemory,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }
}

/// Every repository the engine needs, backed by one store
#[derive(Clone)]
pub struct Repositories {
    pub versions: Arc<dyn WorkflowVersionRepository>,
    pub deals: Arc<dyn DealRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub queue: Arc<dyn QueueRepository>,
    pub audit: Arc<dyn AuditRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            versions: Arc::new(InMemoryWorkflowVersionRepository::new()),
            deals: Arc::new(InMemoryDealRepository::new()),
            tasks: Arc::new(InMemoryTaskRepository::new()),
            queue: Arc::new(InMemoryQueueRepository::new()),
            audit: Arc::new(InMemoryAuditRepository::new()),
        }
    }
}

/// Factory for creating repository sets
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Creates repositories for the configured store, migrating PostgreSQL
    /// before returning
    pub async fn create(config: &StorageConfig) -> Result<Repositories, DomainError> {
        match config {
            StorageConfig::InMemory => {
                info!("Using in-memory storage");
                Ok(Repositories::in_memory())
            }
            StorageConfig::Postgres(pg_config) => {
                let pool = connect_pool(pg_config).await?;
                run_storage_migrations(&pool).await?;
                info!(max_connections = pg_config.max_connections, "Using PostgreSQL storage");

                Ok(Repositories {
                    versions: Arc::new(PostgresWorkflowVersionRepository::new(pool.clone())),
                    deals: Arc::new(PostgresDealRepository::new(pool.clone())),
                    tasks: Arc::new(PostgresTaskRepository::new(pool.clone())),
                    queue: Arc::new(PostgresQueueRepository::new(pool.clone())),
                    audit: Arc::new(PostgresAuditRepository::new(pool)),
                })
            }
        }
    }
}
