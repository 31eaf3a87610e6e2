//! PostgreSQL task repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::domain::actor::Role;
use crate::domain::task::{Task, TaskCompletion, TaskInsert, TaskRepository, TaskStatus};
use crate::domain::DomainError;

const TASK_COLUMNS: &str = "id, deal_id, task_type, title, status, assignee_role, \
                            assignee_user_id, stage, sla_due_at, completed_at, payload, \
                            action_hash, created_at, updated_at";

/// PostgreSQL implementation of TaskRepository
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Task>, DomainError> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE action_hash = $1", TASK_COLUMNS))
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get task by hash: {}", e)))?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_where(&self, clause: &str, bind: Option<&str>) -> Result<Vec<Task>, DomainError> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE {} ORDER BY created_at",
            TASK_COLUMNS, clause
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to list tasks: {}", e)))?;

        rows.iter().map(row_to_task).collect()
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn insert_deduplicated(&self, task: Task) -> Result<TaskInsert, DomainError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tasks (id, deal_id, task_type, title, status, assignee_role,
                               assignee_user_id, stage, sla_due_at, completed_at, payload,
                               action_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (action_hash) DO NOTHING
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(&task.id)
        .bind(&task.deal_id)
        .bind(&task.task_type)
        .bind(&task.title)
        .bind(task.status.as_str())
        .bind(task.assignee_role.as_ref().map(Role::as_str))
        .bind(&task.assignee_user_id)
        .bind(&task.stage)
        .bind(task.sla_due_at)
        .bind(task.completed_at)
        .bind(&task.payload)
        .bind(&task.action_hash)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to insert task: {}", e)))?;

        if let Some(row) = row {
            return Ok(TaskInsert::Created(row_to_task(&row)?));
        }

        let hash = task.action_hash.as_deref().unwrap_or_default();
        self.find_by_hash(hash)
            .await?
            .map(TaskInsert::Existing)
            .ok_or_else(|| DomainError::storage("Deduplicated task vanished"))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, DomainError> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get task: {}", e)))?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_by_deal(&self, deal_id: &str) -> Result<Vec<Task>, DomainError> {
        self.list_where("deal_id = $1", Some(deal_id)).await
    }

    async fn list_open(&self) -> Result<Vec<Task>, DomainError> {
        self.list_where("status <> 'DONE'", None).await
    }

    async fn claim(
        &self,
        id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Task, DomainError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET assignee_user_id = $2,
                status = CASE WHEN status = 'OPEN' THEN 'IN_PROGRESS' ELSE status END,
                updated_at = $3
            WHERE id = $1 AND assignee_user_id IS NULL AND status <> 'DONE'
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to claim task: {}", e)))?;

        if let Some(row) = row {
            return row_to_task(&row);
        }

        match self.find_by_id(id).await? {
            Some(task) if task.is_done() => Err(DomainError::conflict(format!(
                "Task '{}' is already done",
                id
            ))),
            Some(_) => Err(DomainError::conflict(format!(
                "Task '{}' is already claimed",
                id
            ))),
            None => Err(DomainError::not_found(format!("Task '{}' not found", id))),
        }
    }

    async fn complete(
        &self,
        id: &str,
        payload: Value,
        completed_at: DateTime<Utc>,
    ) -> Result<TaskCompletion, DomainError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tasks
            SET status = 'DONE', payload = $2, completed_at = $3, updated_at = $3
            WHERE id = $1 AND status <> 'DONE'
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(id)
        .bind(&payload)
        .bind(completed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to complete task: {}", e)))?;

        if let Some(row) = row {
            return Ok(TaskCompletion::Completed(row_to_task(&row)?));
        }

        self.find_by_id(id)
            .await?
            .map(TaskCompletion::AlreadyDone)
            .ok_or_else(|| DomainError::not_found(format!("Task '{}' not found", id)))
    }
}

fn row_to_task(row: &PgRow) -> Result<Task, DomainError> {
    let status: String = row.get("status");
    let assignee_role: Option<String> = row.get("assignee_role");

    let status = TaskStatus::from_str(&status)
        .ok_or_else(|| DomainError::storage(format!("Unknown task status '{}'", status)))?;

    Ok(Task {
        id: row.get("id"),
        deal_id: row.get("deal_id"),
        task_type: row.get("task_type"),
        title: row.get("title"),
        status,
        assignee_role: assignee_role.map(Role::new),
        assignee_user_id: row.get("assignee_user_id"),
        stage: row.get("stage"),
        sla_due_at: row.get("sla_due_at"),
        completed_at: row.get("completed_at"),
        payload: row.get("payload"),
        action_hash: row.get("action_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
