//! PostgreSQL audit repository implementation

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::audit::{AuditEntry, AuditRepository};
use crate::domain::DomainError;

/// PostgreSQL implementation of AuditRepository
#[derive(Debug, Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_audit_log (id, deal_id, from_status, to_status, actor_id,
                                            actor_roles, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.deal_id)
        .bind(&entry.from_status)
        .bind(&entry.to_status)
        .bind(&entry.actor_id)
        .bind(serde_json::json!(entry.actor_roles))
        .bind(&entry.reason)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to record audit entry: {}", e)))?;

        Ok(())
    }

    async fn list_by_deal(&self, deal_id: &str) -> Result<Vec<AuditEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, deal_id, from_status, to_status, actor_id, actor_roles, reason, created_at
            FROM workflow_audit_log
            WHERE deal_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list audit entries: {}", e)))?;

        rows.iter()
            .map(|row| {
                let roles: serde_json::Value = row.get("actor_roles");
                let actor_roles = serde_json::from_value(roles).map_err(|e| {
                    DomainError::storage(format!("Failed to deserialize actor roles: {}", e))
                })?;

                Ok(AuditEntry {
                    id: row.get("id"),
                    deal_id: row.get("deal_id"),
                    from_status: row.get("from_status"),
                    to_status: row.get("to_status"),
                    actor_id: row.get("actor_id"),
                    actor_roles,
                    reason: row.get("reason"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }
}
