//! In-memory task repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::task::{Task, TaskCompletion, TaskInsert, TaskRepository, TaskStatus};
use crate::domain::DomainError;

/// In-memory implementation of TaskRepository
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    /// Creates a new empty repository
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTaskRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    tasks
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert_deduplicated(&self, task: Task) -> Result<TaskInsert, DomainError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        if let Some(hash) = &task.action_hash {
            if let Some(existing) = tasks
                .values()
                .find(|t| t.action_hash.as_ref() == Some(hash))
            {
                return Ok(TaskInsert::Existing(existing.clone()));
            }
        }

        tasks.insert(task.id.clone(), task.clone());
        Ok(TaskInsert::Created(task))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, DomainError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(tasks.get(id).cloned())
    }

    async fn list_by_deal(&self, deal_id: &str) -> Result<Vec<Task>, DomainError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(sorted(
            tasks.values().filter(|t| t.deal_id == deal_id).cloned().collect(),
        ))
    }

    async fn list_open(&self) -> Result<Vec<Task>, DomainError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(sorted(tasks.values().filter(|t| !t.is_done()).cloned().collect()))
    }

    async fn claim(
        &self,
        id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Task, DomainError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let task = tasks
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("Task '{}' not found", id)))?;

        if task.is_done() {
            return Err(DomainError::conflict(format!("Task '{}' is already done", id)));
        }
        if task.is_claimed() {
            return Err(DomainError::conflict(format!(
                "Task '{}' is already claimed",
                id
            )));
        }

        task.assignee_user_id = Some(user_id.to_string());
        if task.status == TaskStatus::Open {
            task.status = TaskStatus::InProgress;
        }
        task.updated_at = now;
        Ok(task.clone())
    }

    async fn complete(
        &self,
        id: &str,
        payload: Value,
        completed_at: DateTime<Utc>,
    ) -> Result<TaskCompletion, DomainError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let task = tasks
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("Task '{}' not found", id)))?;

        if task.is_done() {
            return Ok(TaskCompletion::AlreadyDone(task.clone()));
        }

        task.status = TaskStatus::Done;
        task.payload = payload;
        task.completed_at = Some(completed_at);
        task.updated_at = completed_at;
        Ok(TaskCompletion::Completed(task.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::task::task_repository_tests as contract;

    #[tokio::test]
    async fn test_insert_deduplicates_by_hash() {
        contract::assert_insert_deduplicates_by_hash(&InMemoryTaskRepository::new()).await;
    }

    #[tokio::test]
    async fn test_tasks_without_hash_are_never_deduplicated() {
        contract::assert_tasks_without_hash_are_never_deduplicated(&InMemoryTaskRepository::new())
            .await;
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        contract::assert_claim_is_exclusive(Arc::new(InMemoryTaskRepository::new())).await;
    }

    #[tokio::test]
    async fn test_complete_is_conditional() {
        contract::assert_complete_is_conditional(&InMemoryTaskRepository::new()).await;
    }

    #[tokio::test]
    async fn test_claim_missing_is_not_found() {
        contract::assert_claim_missing_is_not_found(&InMemoryTaskRepository::new()).await;
    }

    #[tokio::test]
    async fn test_claim_done_task_conflicts() {
        let repo = InMemoryTaskRepository::new();
        let task = repo
            .insert_deduplicated(Task::new("deal-1", "CONFIRM_CAR"))
            .await
            .unwrap()
            .task()
            .clone();
        repo.complete(&task.id, Value::Null, Utc::now()).await.unwrap();

        let err = repo.claim(&task.id, "user-1", Utc::now()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_list_open_excludes_done() {
        let repo = InMemoryTaskRepository::new();
        let done = repo
            .insert_deduplicated(Task::new("deal-1", "CONFIRM_CAR"))
            .await
            .unwrap()
            .task()
            .clone();
        repo.insert_deduplicated(Task::new("deal-1", "PREPARE_QUOTE"))
            .await
            .unwrap();
        repo.complete(&done.id, Value::Null, Utc::now()).await.unwrap();

        let open = repo.list_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].task_type, "PREPARE_QUOTE");
    }
}
