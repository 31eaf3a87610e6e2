//! PostgreSQL workflow version repository implementation

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::definition::DefinitionFormat;
use crate::domain::version::{BootstrapInsert, WorkflowVersion, WorkflowVersionRepository};
use crate::domain::DomainError;

const VERSION_COLUMNS: &str = "id, workflow_id, version, title, description, source, format, \
                               checksum, definition, is_active, created_by, created_at";

/// PostgreSQL implementation of WorkflowVersionRepository
#[derive(Debug, Clone)]
pub struct PostgresWorkflowVersionRepository {
    pool: PgPool,
}

impl PostgresWorkflowVersionRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))
    }
}

/// Serializes writers of one workflow for the rest of the transaction
async fn lock_workflow(
    tx: &mut Transaction<'static, Postgres>,
    workflow_id: &str,
) -> Result<(), DomainError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(workflow_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to lock workflow: {}", e)))?;

    Ok(())
}

async fn next_version(
    tx: &mut Transaction<'static, Postgres>,
    workflow_id: &str,
) -> Result<i32, DomainError> {
    sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) + 1 FROM workflow_versions WHERE workflow_id = $1")
        .bind(workflow_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to compute next version: {}", e)))
}

async fn insert_version(
    tx: &mut Transaction<'static, Postgres>,
    version: &WorkflowVersion,
) -> Result<(), DomainError> {
    let definition = serde_json::to_value(&version.definition)
        .map_err(|e| DomainError::storage(format!("Failed to serialize definition: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO workflow_versions (id, workflow_id, version, title, description, source,
                                       format, checksum, definition, is_active, created_by,
                                       created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&version.id)
    .bind(&version.workflow_id)
    .bind(version.version as i32)
    .bind(&version.title)
    .bind(&version.description)
    .bind(&version.source)
    .bind(version.format.as_str())
    .bind(&version.checksum)
    .bind(definition)
    .bind(version.is_active)
    .bind(&version.created_by)
    .bind(version.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| DomainError::storage(format!("Failed to insert workflow version: {}", e)))?;

    Ok(())
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), DomainError> {
    tx.commit()
        .await
        .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e)))
}

#[async_trait]
impl WorkflowVersionRepository for PostgresWorkflowVersionRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<WorkflowVersion>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_versions WHERE id = $1",
            VERSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get workflow version: {}", e)))?;

        row.as_ref().map(row_to_version).transpose()
    }

    async fn find_active(&self, workflow_id: &str) -> Result<Option<WorkflowVersion>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_versions WHERE workflow_id = $1 AND is_active",
            VERSION_COLUMNS
        ))
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get active version: {}", e)))?;

        row.as_ref().map(row_to_version).transpose()
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM workflow_versions WHERE workflow_id = $1 ORDER BY version",
            VERSION_COLUMNS
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list workflow versions: {}", e)))?;

        rows.iter().map(row_to_version).collect()
    }

    async fn append(&self, mut version: WorkflowVersion) -> Result<WorkflowVersion, DomainError> {
        let mut tx = self.begin().await?;
        lock_workflow(&mut tx, &version.workflow_id).await?;

        version.version = next_version(&mut tx, &version.workflow_id).await? as u32;

        if version.is_active {
            sqlx::query("UPDATE workflow_versions SET is_active = FALSE WHERE workflow_id = $1 AND is_active")
                .bind(&version.workflow_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| DomainError::storage(format!("Failed to deactivate versions: {}", e)))?;
        }

        insert_version(&mut tx, &version).await?;
        commit(tx).await?;

        Ok(version)
    }

    async fn activate(&self, id: &str) -> Result<WorkflowVersion, DomainError> {
        let existing = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Workflow version '{}' not found", id)))?;

        let mut tx = self.begin().await?;
        lock_workflow(&mut tx, &existing.workflow_id).await?;

        // Clear first so the partial unique index never sees two active rows
        sqlx::query("UPDATE workflow_versions SET is_active = FALSE WHERE workflow_id = $1 AND is_active AND id <> $2")
            .bind(&existing.workflow_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to deactivate versions: {}", e)))?;

        let row = sqlx::query(&format!(
            "UPDATE workflow_versions SET is_active = TRUE WHERE id = $1 RETURNING {}",
            VERSION_COLUMNS
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to activate version: {}", e)))?;

        let activated = row_to_version(&row)?;
        commit(tx).await?;

        Ok(activated)
    }

    async fn insert_if_no_active(
        &self,
        version: WorkflowVersion,
    ) -> Result<BootstrapInsert, DomainError> {
        let mut tx = self.begin().await?;
        lock_workflow(&mut tx, &version.workflow_id).await?;

        let active = sqlx::query(&format!(
            "SELECT {} FROM workflow_versions WHERE workflow_id = $1 AND is_active",
            VERSION_COLUMNS
        ))
        .bind(&version.workflow_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get active version: {}", e)))?;

        if let Some(row) = active {
            let existing = row_to_version(&row)?;
            commit(tx).await?;
            return Ok(BootstrapInsert::AlreadyActive(existing));
        }

        let mut version = version.activated(true);
        version.version = next_version(&mut tx, &version.workflow_id).await? as u32;
        insert_version(&mut tx, &version).await?;
        commit(tx).await?;

        Ok(BootstrapInsert::Inserted(version))
    }
}

fn row_to_version(row: &PgRow) -> Result<WorkflowVersion, DomainError> {
    let version: i32 = row.get("version");
    let format: String = row.get("format");
    let definition: serde_json::Value = row.get("definition");

    let format = DefinitionFormat::from_str(&format)
        .ok_or_else(|| DomainError::storage(format!("Unknown definition format '{}'", format)))?;
    let definition = serde_json::from_value(definition)
        .map_err(|e| DomainError::storage(format!("Failed to deserialize definition: {}", e)))?;

    Ok(WorkflowVersion {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        version: version as u32,
        title: row.get("title"),
        description: row.get("description"),
        source: row.get("source"),
        format,
        checksum: row.get("checksum"),
        definition,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        created_by: row.get("created_by"),
    })
}
