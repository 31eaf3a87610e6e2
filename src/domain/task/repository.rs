//! Task repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Task;
use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Result of an insert deduplicated by action hash
#[derive(Debug, Clone, PartialEq)]
pub enum TaskInsert {
    Created(Task),
    /// A task with the same action hash already existed
    Existing(Task),
}

impl TaskInsert {
    pub fn task(&self) -> &Task {
        match self {
            Self::Created(task) | Self::Existing(task) => task,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Result of a conditional completion write
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCompletion {
    Completed(Task),
    /// The task was already DONE; nothing was written
    AlreadyDone(Task),
}

/// Repository for task persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Inserts a task unless one with the same action hash exists
    async fn insert_deduplicated(&self, task: Task) -> Result<TaskInsert, DomainError>;

    /// Finds a task by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, DomainError>;

    /// Lists tasks of a deal ordered by creation time
    async fn list_by_deal(&self, deal_id: &str) -> Result<Vec<Task>, DomainError>;

    /// Lists all tasks not yet DONE
    async fn list_open(&self) -> Result<Vec<Task>, DomainError>;

    /// Assigns the task only if it has no assignee and is not DONE. Moves
    /// OPEN to IN_PROGRESS. Conflict when another claim won.
    async fn claim(
        &self,
        id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Task, DomainError>;

    /// Marks the task DONE with the given payload unless it already is
    async fn complete(
        &self,
        id: &str,
        payload: Value,
        completed_at: DateTime<Utc>,
    ) -> Result<TaskCompletion, DomainError>;
}

#[cfg(test)]
pub mod tests {
    //! Contract tests shared by every repository implementation

    use std::sync::Arc;

    use super::*;
    use serde_json::json;

    pub async fn assert_insert_deduplicates_by_hash(repo: &dyn TaskRepository) {
        let first = repo
            .insert_deduplicated(Task::new("deal-1", "CONFIRM_CAR").with_action_hash("h1"))
            .await
            .unwrap();
        let second = repo
            .insert_deduplicated(Task::new("deal-1", "CONFIRM_CAR").with_action_hash("h1"))
            .await
            .unwrap();

        assert!(first.was_created());
        assert!(!second.was_created());
        assert_eq!(first.task().id, second.task().id);
        assert_eq!(repo.list_by_deal("deal-1").await.unwrap().len(), 1);
    }

    pub async fn assert_tasks_without_hash_are_never_deduplicated(repo: &dyn TaskRepository) {
        repo.insert_deduplicated(Task::new("deal-2", "MANUAL")).await.unwrap();
        repo.insert_deduplicated(Task::new("deal-2", "MANUAL")).await.unwrap();

        assert_eq!(repo.list_by_deal("deal-2").await.unwrap().len(), 2);
    }

    pub async fn assert_claim_is_exclusive(repo: Arc<dyn TaskRepository>) {
        let task = repo
            .insert_deduplicated(Task::new("deal-3", "VERIFY_VEHICLE"))
            .await
            .unwrap()
            .task()
            .clone();

        let mut handles = Vec::new();
        for i in 0..16 {
            let repo = repo.clone();
            let task_id = task.id.clone();
            handles.push(tokio::spawn(async move {
                repo.claim(&task_id, &format!("user-{i}"), Utc::now()).await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error {e}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 15);

        let stored = repo.find_by_id(&task.id).await.unwrap().unwrap();
        assert!(stored.is_claimed());
        assert_eq!(stored.status, crate::domain::task::TaskStatus::InProgress);
    }

    pub async fn assert_complete_is_conditional(repo: &dyn TaskRepository) {
        let task = repo
            .insert_deduplicated(Task::new("deal-4", "AECB_CHECK"))
            .await
            .unwrap()
            .task()
            .clone();

        let first = repo
            .complete(&task.id, json!({"note": "ok"}), Utc::now())
            .await
            .unwrap();
        let second = repo
            .complete(&task.id, json!({"note": "again"}), Utc::now())
            .await
            .unwrap();

        let TaskCompletion::Completed(done) = first else {
            panic!("first completion should write");
        };
        let TaskCompletion::AlreadyDone(unchanged) = second else {
            panic!("second completion should be a no-op");
        };

        assert!(done.is_done());
        assert!(done.completed_at.is_some());
        assert_eq!(unchanged.payload, json!({"note": "ok"}));
        assert_eq!(unchanged.completed_at, done.completed_at);
    }

    pub async fn assert_claim_missing_is_not_found(repo: &dyn TaskRepository) {
        let err = repo.claim("missing", "user-1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_mock_task_repository() {
        let mut mock = MockTaskRepository::new();

        mock.expect_list_by_deal().returning(|_| Ok(vec![]));

        assert!(mock.list_by_deal("deal-1").await.unwrap().is_empty());
    }
}
