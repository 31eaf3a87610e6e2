//! PostgreSQL deal repository implementation

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::deal::{Deal, DealRepository};
use crate::domain::DomainError;

const DEAL_COLUMNS: &str = "id, workflow_id, workflow_version_id, status, payload, customer_id, \
                            asset_id, source, revision, created_at, updated_at";

/// PostgreSQL implementation of DealRepository
#[derive(Debug, Clone)]
pub struct PostgresDealRepository {
    pool: PgPool,
}

impl PostgresDealRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguishes a lost race from a missing deal after a zero-row update
    async fn conflict_or_not_found(&self, id: &str, conflict: String) -> DomainError {
        match self.find_by_id(id).await {
            Ok(Some(_)) => DomainError::conflict(conflict),
            Ok(None) => DomainError::not_found(format!("Deal '{}' not found", id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl DealRepository for PostgresDealRepository {
    async fn create(&self, deal: Deal) -> Result<Deal, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO deals (id, workflow_id, workflow_version_id, status, payload, customer_id,
                               asset_id, source, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&deal.id)
        .bind(&deal.workflow_id)
        .bind(&deal.workflow_version_id)
        .bind(&deal.status)
        .bind(&deal.payload)
        .bind(&deal.customer_id)
        .bind(&deal.asset_id)
        .bind(&deal.source)
        .bind(deal.revision as i64)
        .bind(deal.created_at)
        .bind(deal.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let msg = e.to_string();

            if msg.contains("duplicate key") || msg.contains("unique constraint") {
                DomainError::conflict(format!("Deal with ID '{}' already exists", deal.id))
            } else {
                DomainError::storage(format!("Failed to create deal: {}", e))
            }
        })?;

        Ok(deal)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Deal>, DomainError> {
        let row = sqlx::query(&format!("SELECT {} FROM deals WHERE id = $1", DEAL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get deal: {}", e)))?;

        Ok(row.as_ref().map(row_to_deal))
    }

    async fn list(&self, status: Option<String>) -> Result<Vec<Deal>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM deals WHERE ($1::VARCHAR IS NULL OR status = $1) ORDER BY created_at",
            DEAL_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list deals: {}", e)))?;

        Ok(rows.iter().map(row_to_deal).collect())
    }

    async fn update_status(
        &self,
        id: &str,
        expected_status: &str,
        new_status: &str,
    ) -> Result<Deal, DomainError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE deals
            SET status = $3, revision = revision + 1, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            DEAL_COLUMNS
        ))
        .bind(id)
        .bind(expected_status)
        .bind(new_status)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update deal status: {}", e)))?;

        match row {
            Some(row) => Ok(row_to_deal(&row)),
            None => Err(self
                .conflict_or_not_found(
                    id,
                    format!("Deal '{}' is no longer in '{}'", id, expected_status),
                )
                .await),
        }
    }

    async fn update_payload(
        &self,
        id: &str,
        expected_revision: u64,
        payload: Value,
    ) -> Result<Deal, DomainError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE deals
            SET payload = $3, revision = revision + 1, updated_at = $4
            WHERE id = $1 AND revision = $2
            RETURNING {}
            "#,
            DEAL_COLUMNS
        ))
        .bind(id)
        .bind(expected_revision as i64)
        .bind(&payload)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update deal payload: {}", e)))?;

        match row {
            Some(row) => Ok(row_to_deal(&row)),
            None => Err(self
                .conflict_or_not_found(id, format!("Deal '{}' was modified concurrently", id))
                .await),
        }
    }
}

fn row_to_deal(row: &PgRow) -> Deal {
    let revision: i64 = row.get("revision");

    Deal {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        workflow_version_id: row.get("workflow_version_id"),
        status: row.get("status"),
        payload: row.get("payload"),
        customer_id: row.get("customer_id"),
        asset_id: row.get("asset_id"),
        source: row.get("source"),
        revision: revision as u64,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
