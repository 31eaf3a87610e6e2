//! PostgreSQL queue repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::queue::{QueueEntry, QueueRepository, QueueStats, QueueStatus, SinkType};
use crate::domain::DomainError;

const QUEUE_COLUMNS: &str = "id, sink, action_hash, status, target, payload, deal_id, attempts, \
                             next_attempt_at, processed_at, error, created_at, updated_at";

/// PostgreSQL implementation of QueueRepository. Claims use
/// `FOR UPDATE SKIP LOCKED` so concurrent drains split the backlog.
#[derive(Debug, Clone)]
pub struct PostgresQueueRepository {
    pool: PgPool,
}

impl PostgresQueueRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn finish(&self, id: &str, result: sqlx::postgres::PgQueryResult) -> Result<(), DomainError> {
        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.find_by_id(id).await? {
            Some(entry) => Err(DomainError::conflict(format!(
                "Queue entry '{}' is {}, not PROCESSING",
                id, entry.status
            ))),
            None => Err(DomainError::not_found(format!("Queue entry '{}' not found", id))),
        }
    }
}

#[async_trait]
impl QueueRepository for PostgresQueueRepository {
    async fn upsert(&self, entry: QueueEntry) -> Result<QueueEntry, DomainError> {
        let target = serde_json::to_value(&entry.target)
            .map_err(|e| DomainError::storage(format!("Failed to serialize queue target: {}", e)))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO workflow_queue (id, sink, action_hash, status, target, payload, deal_id,
                                        attempts, next_attempt_at, processed_at, error,
                                        created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (action_hash) DO UPDATE
            SET payload = EXCLUDED.payload,
                target = EXCLUDED.target,
                sink = EXCLUDED.sink,
                deal_id = COALESCE(EXCLUDED.deal_id, workflow_queue.deal_id),
                updated_at = EXCLUDED.updated_at
            RETURNING {}
            "#,
            QUEUE_COLUMNS
        ))
        .bind(&entry.id)
        .bind(entry.sink.as_str())
        .bind(&entry.action_hash)
        .bind(entry.status.as_str())
        .bind(target)
        .bind(&entry.payload)
        .bind(&entry.deal_id)
        .bind(entry.attempts as i32)
        .bind(entry.next_attempt_at)
        .bind(entry.processed_at)
        .bind(&entry.error)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to upsert queue entry: {}", e)))?;

        row_to_entry(&row)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<QueueEntry>, DomainError> {
        let row = sqlx::query(&format!("SELECT {} FROM workflow_queue WHERE id = $1", QUEUE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get queue entry: {}", e)))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn find_by_action_hash(&self, hash: &str) -> Result<Option<QueueEntry>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM workflow_queue WHERE action_hash = $1",
            QUEUE_COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get queue entry: {}", e)))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn list(
        &self,
        sink: SinkType,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, DomainError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM workflow_queue
            WHERE sink = $1 AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
            QUEUE_COLUMNS
        ))
        .bind(sink.as_str())
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list queue entries: {}", e)))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn claim_pending(
        &self,
        sink: SinkType,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, DomainError> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE workflow_queue
            SET status = 'PROCESSING', updated_at = $3
            WHERE id IN (
                SELECT id FROM workflow_queue
                WHERE sink = $1
                  AND status = 'PENDING'
                  AND (next_attempt_at IS NULL OR next_attempt_at <= $3)
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            QUEUE_COLUMNS
        ))
        .bind(sink.as_str())
        .bind(limit as i64)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to claim queue entries: {}", e)))?;

        let mut claimed = rows.iter().map(row_to_entry).collect::<Result<Vec<_>, _>>()?;
        claimed.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(claimed)
    }

    async fn mark_sent(&self, id: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_queue
            SET status = 'SENT', processed_at = $2, error = NULL, updated_at = $2
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to mark entry sent: {}", e)))?;

        self.finish(id, result).await
    }

    async fn mark_failed(
        &self,
        id: &str,
        attempts: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_queue
            SET status = 'FAILED', attempts = $2, error = $3, processed_at = $4, updated_at = $4
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .bind(attempts as i32)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to mark entry failed: {}", e)))?;

        self.finish(id, result).await
    }

    async fn reschedule(
        &self,
        id: &str,
        attempts: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_queue
            SET status = 'PENDING', attempts = $2, error = $3, next_attempt_at = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'PROCESSING'
            "#,
        )
        .bind(id)
        .bind(attempts as i32)
        .bind(error)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to reschedule entry: {}", e)))?;

        self.finish(id, result).await
    }

    async fn release_stale(
        &self,
        sink: SinkType,
        older_than: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_queue
            SET status = 'PENDING', updated_at = NOW()
            WHERE sink = $1 AND status = 'PROCESSING' AND updated_at < $2
            "#,
        )
        .bind(sink.as_str())
        .bind(older_than)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to release stale entries: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn stats(&self, sink: SinkType) -> Result<QueueStats, DomainError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM workflow_queue WHERE sink = $1 GROUP BY status",
        )
        .bind(sink.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get queue stats: {}", e)))?;

        let mut stats = QueueStats {
            sink: Some(sink),
            ..Default::default()
        };
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            match QueueStatus::from_str(&status) {
                Some(QueueStatus::Pending) => stats.pending = count as u64,
                Some(QueueStatus::Processing) => stats.processing = count as u64,
                Some(QueueStatus::Sent) => stats.sent = count as u64,
                Some(QueueStatus::Failed) => stats.failed = count as u64,
                None => {}
            }
        }

        Ok(stats)
    }
}

fn row_to_entry(row: &PgRow) -> Result<QueueEntry, DomainError> {
    let sink: String = row.get("sink");
    let status: String = row.get("status");
    let target: serde_json::Value = row.get("target");
    let attempts: i32 = row.get("attempts");

    let sink = SinkType::from_str(&sink)
        .ok_or_else(|| DomainError::storage(format!("Unknown sink '{}'", sink)))?;
    let status = QueueStatus::from_str(&status)
        .ok_or_else(|| DomainError::storage(format!("Unknown queue status '{}'", status)))?;
    let target = serde_json::from_value(target)
        .map_err(|e| DomainError::storage(format!("Failed to deserialize queue target: {}", e)))?;

    Ok(QueueEntry {
        id: row.get("id"),
        sink,
        action_hash: row.get("action_hash"),
        status,
        target,
        payload: row.get("payload"),
        deal_id: row.get("deal_id"),
        attempts: attempts.max(0) as u32,
        next_attempt_at: row.get("next_attempt_at"),
        processed_at: row.get("processed_at"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
