//! Database migrations for the workflow store

use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// Applies versioned migrations, recording each in `_migrations`
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    /// Runs a single migration inside a transaction
    pub async fn run_migration(&self, migration: &Migration) -> Result<(), DomainError> {
        self.ensure_migrations_table().await?;

        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)",
        )
        .bind(migration.version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))?;

        if applied {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        // Migrations hold several statements, so they bypass prepared statements
        sqlx::raw_sql(&migration.up)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to run migration {}: {}",
                    migration.version, e
                ))
            })?;

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit migration: {}", e)))?;

        info!(version = migration.version, description = %migration.description, "Applied migration");

        Ok(())
    }

    /// Returns the latest applied migration version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        let version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM _migrations WHERE success = TRUE",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))?;

        Ok(version)
    }
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version (timestamp-based recommended)
    pub version: i64,
    /// Human-readable description
    pub description: String,
    /// SQL to run when applying the migration
    pub up: String,
    /// SQL to run when reverting the migration
    pub down: String,
}

impl Migration {
    pub fn new(
        version: i64,
        description: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
    ) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
            down: down.into(),
        }
    }
}

/// Collection of migrations for the workflow store
pub fn storage_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create workflow_versions table",
            r#"
            CREATE TABLE IF NOT EXISTS workflow_versions (
                id VARCHAR(64) PRIMARY KEY,
                workflow_id VARCHAR(64) NOT NULL,
                version INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                description TEXT,
                source TEXT NOT NULL,
                format VARCHAR(16) NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                definition JSONB NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                created_by VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (workflow_id, version)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_workflow_versions_one_active
                ON workflow_versions (workflow_id) WHERE is_active;
            "#,
            "DROP TABLE IF EXISTS workflow_versions",
        ),
        Migration::new(
            2,
            "Create deals table",
            r#"
            CREATE TABLE IF NOT EXISTS deals (
                id VARCHAR(64) PRIMARY KEY,
                workflow_id VARCHAR(64) NOT NULL,
                workflow_version_id VARCHAR(64) NOT NULL REFERENCES workflow_versions(id),
                status VARCHAR(64) NOT NULL,
                payload JSONB NOT NULL DEFAULT '{}',
                customer_id VARCHAR(255),
                asset_id VARCHAR(255),
                source VARCHAR(255),
                revision BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_deals_status ON deals (status);
            "#,
            "DROP TABLE IF EXISTS deals",
        ),
        Migration::new(
            3,
            "Create tasks table",
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id VARCHAR(64) PRIMARY KEY,
                deal_id VARCHAR(64) NOT NULL REFERENCES deals(id),
                task_type VARCHAR(64) NOT NULL,
                title VARCHAR(255) NOT NULL,
                status VARCHAR(16) NOT NULL,
                assignee_role VARCHAR(64),
                assignee_user_id VARCHAR(255),
                stage VARCHAR(64),
                sla_due_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                payload JSONB NOT NULL DEFAULT '{}',
                action_hash VARCHAR(64) UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_deal ON tasks (deal_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_open ON tasks (status) WHERE status <> 'DONE';
            "#,
            "DROP TABLE IF EXISTS tasks",
        ),
        Migration::new(
            4,
            "Create workflow_queue table",
            r#"
            CREATE TABLE IF NOT EXISTS workflow_queue (
                id VARCHAR(64) PRIMARY KEY,
                sink VARCHAR(16) NOT NULL,
                action_hash VARCHAR(64) NOT NULL UNIQUE,
                status VARCHAR(16) NOT NULL,
                target JSONB NOT NULL,
                payload JSONB NOT NULL DEFAULT '{}',
                deal_id VARCHAR(64),
                attempts INTEGER NOT NULL DEFAULT 0,
                next_attempt_at TIMESTAMPTZ,
                processed_at TIMESTAMPTZ,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_workflow_queue_pending
                ON workflow_queue (sink, created_at) WHERE status = 'PENDING';
            "#,
            "DROP TABLE IF EXISTS workflow_queue",
        ),
        Migration::new(
            5,
            "Create workflow_audit_log table",
            r#"
            CREATE TABLE IF NOT EXISTS workflow_audit_log (
                id VARCHAR(64) PRIMARY KEY,
                deal_id VARCHAR(64) NOT NULL,
                from_status VARCHAR(64) NOT NULL,
                to_status VARCHAR(64) NOT NULL,
                actor_id VARCHAR(255),
                actor_roles JSONB NOT NULL DEFAULT '[]',
                reason TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_workflow_audit_log_deal
                ON workflow_audit_log (deal_id, created_at);
            "#,
            "DROP TABLE IF EXISTS workflow_audit_log",
        ),
    ]
}

/// Runs all pending storage migrations
pub async fn run_storage_migrations(pool: &PgPool) -> Result<(), DomainError> {
    let migrator = PostgresMigrator::new(pool.clone());
    let migrations = storage_migrations();

    for migration in migrations {
        migrator.run_migration(&migration).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creation() {
        let migration = Migration::new(1, "Test migration", "CREATE TABLE test", "DROP TABLE test");

        assert_eq!(migration.version, 1);
        assert_eq!(migration.description, "Test migration");
        assert_eq!(migration.up, "CREATE TABLE test");
        assert_eq!(migration.down, "DROP TABLE test");
    }

    #[test]
    fn test_storage_migrations_order() {
        let migrations = storage_migrations();

        assert!(!migrations.is_empty());

        // Verify migrations are in order
        for i in 1..migrations.len() {
            assert!(
                migrations[i].version > migrations[i - 1].version,
                "Migrations should be in ascending order"
            );
        }
    }

    #[test]
    fn test_storage_migrations_content() {
        let migrations = storage_migrations();

        // Verify all migrations have required content
        for migration in migrations {
            assert!(!migration.description.is_empty());
            assert!(!migration.up.is_empty());
            assert!(!migration.down.is_empty());
        }
    }

    #[test]
    fn test_active_version_is_unique_per_workflow() {
        let migrations = storage_migrations();
        let versions = migrations
            .iter()
            .find(|m| m.up.contains("CREATE TABLE IF NOT EXISTS workflow_versions"))
            .unwrap();

        assert!(versions.up.contains("WHERE is_active"));
    }

    #[test]
    fn test_queue_action_hash_is_unique() {
        let migrations = storage_migrations();
        let queue = migrations
            .iter()
            .find(|m| m.description.contains("workflow_queue"))
            .unwrap();

        assert!(queue.up.contains("action_hash VARCHAR(64) NOT NULL UNIQUE"));
    }
}
