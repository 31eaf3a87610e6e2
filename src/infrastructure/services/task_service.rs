//! Task lifecycle: claim and complete
//!
//! Completion runs as separate phases (task write, deal write, transition
//! attempt). Each phase reports its own failure and a later failure never
//! undoes an earlier write: a DONE task stays DONE even when the deal could
//! not be advanced.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use super::deal_service::DealServiceTrait;
use super::transition_engine::TransitionEngineTrait;
use super::version_service::WorkflowVersionServiceTrait;
use crate::domain::actor::{Actor, Role, ROLE_OP_MANAGER};
use crate::domain::deal::Deal;
use crate::domain::error::DomainError;
use crate::domain::guard::{deep_merge, evaluate_all, merged, path_patch, GuardOutcome};
use crate::domain::sla::{classify, SlaStatus};
use crate::domain::task::{
    resolve_guard_key, storage_key, Task, TaskCompletion, TaskRepository,
};
use crate::infrastructure::observability::record_task_completed;

/// A task with its SLA classification at read time
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub sla_status: SlaStatus,
}

/// How the follow-up transition after a completion went
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowTransitionReport {
    pub attempted: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a completion request, one field per phase
#[derive(Debug, Clone, Serialize)]
pub struct TaskCompletionResult {
    pub task: Task,
    /// False when the task was already DONE and nothing was written
    pub task_updated: bool,
    pub deal_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_key: Option<String>,
    pub workflow_transition: WorkflowTransitionReport,
    /// Exit requirements of the deal's current stage that still fail
    pub expected_exit_guards: Vec<GuardOutcome>,
    pub sla_status: SlaStatus,
}

/// Trait for task operations (for dynamic dispatch in AppState)
#[async_trait]
pub trait TaskServiceTrait: Send + Sync {
    /// Tasks of a deal, or every task not yet DONE when no deal is given
    async fn list_tasks(&self, deal_id: Option<&str>) -> Result<Vec<TaskView>, DomainError>;

    async fn get_task(&self, task_id: &str) -> Result<TaskView, DomainError>;

    /// Assigns the task to the acting user. Exactly one concurrent claim wins.
    async fn claim(&self, task_id: &str, actor: &Actor) -> Result<TaskView, DomainError>;

    /// Marks the task DONE, sets its guard flag on the deal and tries to
    /// advance the deal
    async fn complete(
        &self,
        task_id: &str,
        patch: Value,
        actor: &Actor,
    ) -> Result<TaskCompletionResult, DomainError>;
}

pub struct TaskService {
    tasks: Arc<dyn TaskRepository>,
    deals: Arc<dyn DealServiceTrait>,
    transitions: Arc<dyn TransitionEngineTrait>,
    versions: Arc<dyn WorkflowVersionServiceTrait>,
    warning_window: Duration,
}

impl TaskService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        deals: Arc<dyn DealServiceTrait>,
        transitions: Arc<dyn TransitionEngineTrait>,
        versions: Arc<dyn WorkflowVersionServiceTrait>,
        warning_window: Duration,
    ) -> Self {
        Self {
            tasks,
            deals,
            transitions,
            versions,
            warning_window,
        }
    }

    fn view(&self, task: Task) -> TaskView {
        let sla_status = classify(&task, Utc::now(), self.warning_window);
        TaskView { task, sla_status }
    }

    async fn find(&self, task_id: &str) -> Result<Task, DomainError> {
        self.tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Task '{}' not found", task_id)))
    }

    fn no_op_result(&self, task: Task) -> TaskCompletionResult {
        let sla_status = classify(&task, Utc::now(), self.warning_window);
        TaskCompletionResult {
            guard_key: resolve_guard_key(&task),
            task,
            task_updated: false,
            deal_updated: false,
            deal_error: None,
            workflow_transition: WorkflowTransitionReport::default(),
            expected_exit_guards: Vec::new(),
            sla_status,
        }
    }

    /// Exit requirements of the deal's current stage that do not hold yet
    async fn unmet_exit_guards(&self, deal: &Deal) -> Result<Vec<GuardOutcome>, DomainError> {
        let definition = self.versions.definition(&deal.workflow_version_id).await?;
        let Some(stage) = definition.stage(&deal.status) else {
            return Ok(Vec::new());
        };

        Ok(evaluate_all(&deal.payload, &stage.exit_requirements)
            .into_iter()
            .filter(|outcome| !outcome.ok)
            .collect())
    }
}

/// Deal payload fragment recording a completed task
fn completion_patch(task: &Task, guard_key: Option<&str>, patch: &Value) -> Value {
    let completed_at = task.completed_at.unwrap_or_else(Utc::now).to_rfc3339();
    let key = storage_key(guard_key.unwrap_or(&task.task_type));

    let mut fragment = match guard_key {
        Some(guard_key) => path_patch(guard_key, json!(true)),
        None => json!({}),
    };

    let record = json!({
        "tasks": {
            key: {
                "completed": true,
                "completed_at": completed_at,
                "task_type": task.task_type,
                "task_id": task.id,
            }
        }
    });
    deep_merge(&mut fragment, record);

    if let Some(guard_key) = guard_key {
        let mut detail = Map::new();
        detail.insert("fulfilled".into(), json!(true));
        detail.insert("completed_at".into(), json!(completed_at));
        detail.insert("task_type".into(), json!(task.task_type));
        detail.insert("task_id".into(), json!(task.id));
        for field in ["note", "attachment_path"] {
            if let Some(value) = patch.get(field).filter(|v| !v.is_null()) {
                detail.insert(field.into(), value.clone());
            }
        }

        // Keyed by the literal guard key, dots included
        let mut guard_tasks = Map::new();
        guard_tasks.insert(guard_key.to_string(), Value::Object(detail));
        deep_merge(
            &mut fragment,
            json!({ "guard_tasks": Value::Object(guard_tasks) }),
        );
    }

    fragment
}

/// Completion payload as merged into the task. A `guard_key` field is
/// dropped so it cannot redirect which deal flag the task sets.
fn caller_patch(patch: Value) -> Value {
    match patch {
        Value::Object(mut fields) => {
            fields.remove("guard_key");
            Value::Object(fields)
        }
        _ => json!({}),
    }
}

/// Role set the follow-up transition runs with: the actor's elevated role,
/// else the task's assignee role, else operations manager
fn transition_actor(actor: &Actor, task: &Task) -> Actor {
    if actor.is_system() {
        return actor.clone();
    }

    let role = actor
        .elevated_role()
        .cloned()
        .or_else(|| task.assignee_role.clone())
        .unwrap_or_else(|| Role::new(ROLE_OP_MANAGER));

    Actor::new(actor.user_id.clone(), vec![role])
}

#[async_trait]
impl TaskServiceTrait for TaskService {
    async fn list_tasks(&self, deal_id: Option<&str>) -> Result<Vec<TaskView>, DomainError> {
        let tasks = match deal_id {
            Some(deal_id) => self.tasks.list_by_deal(deal_id).await?,
            None => self.tasks.list_open().await?,
        };
        Ok(tasks.into_iter().map(|task| self.view(task)).collect())
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskView, DomainError> {
        self.find(task_id).await.map(|task| self.view(task))
    }

    #[instrument(skip(self, actor), fields(user_id = ?actor.user_id))]
    async fn claim(&self, task_id: &str, actor: &Actor) -> Result<TaskView, DomainError> {
        let user_id = actor
            .user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DomainError::validation("Claiming a task requires a user id"))?;

        let task = self.tasks.claim(task_id, user_id, Utc::now()).await?;
        info!(task_id = %task_id, user_id = %user_id, "Task claimed");

        Ok(self.view(task))
    }

    #[instrument(skip(self, patch, actor), fields(user_id = ?actor.user_id))]
    async fn complete(
        &self,
        task_id: &str,
        patch: Value,
        actor: &Actor,
    ) -> Result<TaskCompletionResult, DomainError> {
        if !patch.is_object() && !patch.is_null() {
            return Err(DomainError::validation("Task payload must be a JSON object"));
        }

        let task = self.find(task_id).await?;

        if let Some(assignee) = &task.assignee_user_id {
            let is_assignee = actor.user_id.as_deref() == Some(assignee.as_str());
            if !is_assignee && !actor.is_elevated() && !actor.is_system() {
                return Err(DomainError::forbidden(format!(
                    "Task '{}' is assigned to another user",
                    task_id
                )));
            }
        }

        if task.is_done() {
            return Ok(self.no_op_result(task));
        }

        // The flag a task sets comes from its stored definition, never the caller
        let guard_key = resolve_guard_key(&task);
        let patch = caller_patch(patch);

        // Phase 1: the task itself
        let payload = merged(&task.payload, &patch);
        let task = match self.tasks.complete(task_id, payload, Utc::now()).await? {
            TaskCompletion::Completed(task) => task,
            TaskCompletion::AlreadyDone(task) => return Ok(self.no_op_result(task)),
        };
        record_task_completed(&task.task_type);
        info!(task_id = %task.id, deal_id = %task.deal_id, task_type = %task.task_type, "Task completed");

        let sla_status = classify(&task, Utc::now(), self.warning_window);
        let mut result = TaskCompletionResult {
            task: task.clone(),
            task_updated: true,
            deal_updated: false,
            deal_error: None,
            guard_key: guard_key.clone(),
            workflow_transition: WorkflowTransitionReport::default(),
            expected_exit_guards: Vec::new(),
            sla_status,
        };

        // Phase 2: the deal's guard flags
        let fragment = completion_patch(&task, guard_key.as_deref(), &patch);
        if let Err(e) = self.deals.merge_payload(&task.deal_id, fragment).await {
            warn!(task_id = %task.id, deal_id = %task.deal_id, error = %e, "Failed to record task completion on deal");
            result.deal_error = Some(e.to_string());
            return Ok(result);
        }
        result.deal_updated = true;

        // Phase 3: try to advance the deal
        let actor = transition_actor(actor, &task);
        result.workflow_transition.attempted = true;
        match self
            .transitions
            .attempt_transition(&task.deal_id, None, &actor)
            .await
        {
            Ok(outcome) => {
                result.workflow_transition.success = outcome.applied;
                result.workflow_transition.new_status = outcome.new_status;
                result.workflow_transition.reason = outcome.reason;
            }
            Err(e) => {
                warn!(task_id = %task.id, deal_id = %task.deal_id, error = %e, "Transition after task completion failed");
                result.workflow_transition.error = Some(e.to_string());
            }
        }

        match self.deals.get_deal(&task.deal_id).await {
            Ok(deal) => match self.unmet_exit_guards(&deal).await {
                Ok(guards) => result.expected_exit_guards = guards,
                Err(e) => warn!(deal_id = %deal.id, error = %e, "Failed to evaluate exit guards"),
            },
            Err(e) => warn!(deal_id = %task.deal_id, error = %e, "Failed to reload deal"),
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::{ROLE_ADMIN, ROLE_FINANCE, ROLE_LEGAL};
    use crate::domain::guard::resolve_path;
    use crate::domain::task::{MockTaskRepository, TaskStatus};
    use crate::infrastructure::services::testing::{deal_at, engine, Engine};
    use crate::infrastructure::services::CreateDealRequest;

    async fn task_of(e: &Engine, deal_id: &str, task_type: &str) -> Task {
        e.services
            .tasks
            .list_tasks(Some(deal_id))
            .await
            .unwrap()
            .into_iter()
            .map(|view| view.task)
            .find(|task| task.task_type == task_type)
            .unwrap()
    }

    fn op_manager(user: &str) -> Actor {
        Actor::user(user, vec![Role::new(ROLE_OP_MANAGER)])
    }

    #[test]
    fn test_completion_patch_shape() {
        let mut task = Task::new("deal-1", "CONFIRM_CAR");
        task.completed_at = Some(Utc::now());

        let fragment = completion_patch(
            &task,
            Some("tasks.confirmCar.completed"),
            &json!({"note": "customer confirmed"}),
        );

        assert_eq!(
            resolve_path(&fragment, "tasks.confirmCar.completed"),
            Some(&json!(true))
        );
        assert_eq!(
            resolve_path(&fragment, "tasks.confirmCar.task_type"),
            Some(&json!("CONFIRM_CAR"))
        );
        let detail = &fragment["guard_tasks"]["tasks.confirmCar.completed"];
        assert_eq!(detail["fulfilled"], json!(true));
        assert_eq!(detail["note"], json!("customer confirmed"));
        assert!(detail.get("attachment_path").is_none());
    }

    #[test]
    fn test_transition_actor_selection() {
        let task = Task::new("deal-1", "FIN_CALC").with_assignee_role(Role::new(ROLE_FINANCE));

        let admin = Actor::user("u1", vec![Role::new(ROLE_LEGAL), Role::new(ROLE_ADMIN)]);
        assert_eq!(transition_actor(&admin, &task).roles, vec![Role::new(ROLE_ADMIN)]);

        let legal = Actor::user("u2", vec![Role::new(ROLE_LEGAL)]);
        assert_eq!(transition_actor(&legal, &task).roles, vec![Role::new(ROLE_FINANCE)]);

        let unassigned = Task::new("deal-1", "CUSTOM");
        assert_eq!(
            transition_actor(&legal, &unassigned).roles,
            vec![Role::new(ROLE_OP_MANAGER)]
        );
    }

    #[tokio::test]
    async fn test_confirm_car_sets_guard_and_advances_deal() {
        let e = engine();
        let deal = e
            .services
            .deals
            .create_deal(CreateDealRequest::default())
            .await
            .unwrap()
            .deal;
        let task = task_of(&e, &deal.id, "CONFIRM_CAR").await;

        let result = e
            .services
            .tasks
            .complete(&task.id, json!({"note": "ok"}), &op_manager("ops-1"))
            .await
            .unwrap();

        assert!(result.task_updated);
        assert_eq!(result.task.status, TaskStatus::Done);
        assert!(result.task.completed_at.is_some());
        assert!(result.deal_updated);
        assert_eq!(result.guard_key.as_deref(), Some("tasks.confirmCar.completed"));
        assert!(result.workflow_transition.attempted);
        assert!(result.workflow_transition.success);
        assert_eq!(result.workflow_transition.new_status.as_deref(), Some("OFFER_PREP"));

        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(deal.status, "OFFER_PREP");
        assert_eq!(
            resolve_path(&deal.payload, "tasks.confirmCar.completed"),
            Some(&json!(true))
        );
        assert_eq!(
            deal.payload["guard_tasks"]["tasks.confirmCar.completed"]["note"],
            json!("ok")
        );

        // Exit requirements of OFFER_PREP are still open
        assert_eq!(result.expected_exit_guards.len(), 1);
        assert_eq!(result.expected_exit_guards[0].key, "quotationPrepared");
    }

    #[test]
    fn test_caller_patch_drops_guard_key() {
        let patch = caller_patch(json!({"guard_key": "payments.supplierPaid", "note": "n"}));
        assert_eq!(patch, json!({"note": "n"}));

        assert_eq!(caller_patch(Value::Null), json!({}));
    }

    #[tokio::test]
    async fn test_completion_payload_cannot_redirect_guard_flag() {
        let e = engine();
        let deal = e
            .services
            .deals
            .create_deal(CreateDealRequest::default())
            .await
            .unwrap()
            .deal;
        let task = task_of(&e, &deal.id, "CONFIRM_CAR").await;

        let result = e
            .services
            .tasks
            .complete(
                &task.id,
                json!({"guard_key": "payments.supplierPaid", "note": "ok"}),
                &op_manager("ops-1"),
            )
            .await
            .unwrap();

        assert_eq!(result.guard_key.as_deref(), Some("tasks.confirmCar.completed"));
        assert_ne!(result.task.payload["guard_key"], json!("payments.supplierPaid"));
        assert_eq!(result.task.payload["note"], json!("ok"));

        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(
            resolve_path(&deal.payload, "payments.supplierPaid"),
            Some(&json!(false))
        );
        assert_eq!(
            resolve_path(&deal.payload, "tasks.confirmCar.completed"),
            Some(&json!(true))
        );
        assert!(deal.payload["guard_tasks"].get("payments.supplierPaid").is_none());
    }

    #[tokio::test]
    async fn test_completion_without_transition_is_still_durable() {
        let e = engine();
        let deal = deal_at(&e, "SIGNING_FUNDING", json!({})).await;
        e.services.transitions.replay_entry_actions(&deal.id).await.unwrap();
        let task = task_of(&e, &deal.id, "RECEIVE_ADVANCE").await;

        let finance = Actor::user("fin-1", vec![Role::new(ROLE_FINANCE)]);
        let result = e
            .services
            .tasks
            .complete(&task.id, json!({}), &finance)
            .await
            .unwrap();

        assert!(result.task_updated);
        assert!(result.workflow_transition.attempted);
        assert!(!result.workflow_transition.success);
        assert!(result.workflow_transition.reason.is_some());

        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(deal.status, "SIGNING_FUNDING");
        assert_eq!(deal.payload["payments"]["advanceReceived"], json!(true));

        let unmet: Vec<_> = result.expected_exit_guards.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(unmet, vec!["esign.allSigned", "payments.supplierPaid"]);
    }

    #[tokio::test]
    async fn test_complete_twice_is_idempotent() {
        let e = engine();
        let deal = e
            .services
            .deals
            .create_deal(CreateDealRequest::default())
            .await
            .unwrap()
            .deal;
        let task = task_of(&e, &deal.id, "CONFIRM_CAR").await;
        let actor = op_manager("ops-1");

        let first = e.services.tasks.complete(&task.id, json!({"v": 1}), &actor).await.unwrap();
        let second = e.services.tasks.complete(&task.id, json!({"v": 2}), &actor).await.unwrap();

        assert!(first.task_updated);
        assert!(!second.task_updated);
        assert!(!second.workflow_transition.attempted);
        assert_eq!(second.task, first.task);
        assert_eq!(second.task.payload["v"], json!(1));
        assert_eq!(e.services.transitions.list_audit(&deal.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_only_assignee_or_elevated_may_complete() {
        let e = engine();
        let deal = deal_at(&e, "FINANCE_REVIEW", json!({})).await;
        e.services.transitions.replay_entry_actions(&deal.id).await.unwrap();
        let task = task_of(&e, &deal.id, "FIN_CALC").await;

        let owner = Actor::user("fin-1", vec![Role::new(ROLE_FINANCE)]);
        let other = Actor::user("fin-2", vec![Role::new(ROLE_FINANCE)]);
        let admin = Actor::user("admin-1", vec![Role::new(ROLE_ADMIN)]);

        e.services.tasks.claim(&task.id, &owner).await.unwrap();

        let refused = e.services.tasks.complete(&task.id, json!({}), &other).await;
        assert!(matches!(refused, Err(DomainError::Forbidden { .. })));

        let result = e.services.tasks.complete(&task.id, json!({}), &admin).await.unwrap();
        assert!(result.task_updated);
        // Admin role drives the transition, FINANCE_REVIEW needs FINANCE
        assert!(!result.workflow_transition.success);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let e = engine();
        let deal = e
            .services
            .deals
            .create_deal(CreateDealRequest::default())
            .await
            .unwrap()
            .deal;
        let task = task_of(&e, &deal.id, "CONFIRM_CAR").await;

        let claimed = e.services.tasks.claim(&task.id, &op_manager("ops-1")).await.unwrap();
        assert_eq!(claimed.task.status, TaskStatus::InProgress);
        assert_eq!(claimed.task.assignee_user_id.as_deref(), Some("ops-1"));

        let second = e.services.tasks.claim(&task.id, &op_manager("ops-2")).await;
        assert!(matches!(second, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_claim_requires_user() {
        let e = engine();
        let result = e.services.tasks.claim("task-1", &Actor::system()).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_deal_write_failure_is_reported_separately() {
        let mut task = Task::new("missing-deal", "CONFIRM_CAR");
        task.id = "task-1".to_string();
        let stored = task.clone();

        let mut repo = MockTaskRepository::new();
        repo.expect_find_by_id().returning(move |_| Ok(Some(stored.clone())));
        repo.expect_complete().returning(move |_, payload, at| {
            let mut done = task.clone();
            done.status = TaskStatus::Done;
            done.payload = payload;
            done.completed_at = Some(at);
            Ok(TaskCompletion::Completed(done))
        });

        let e = engine();
        let service = TaskService::new(
            Arc::new(repo),
            e.services.deals.clone(),
            e.services.transitions.clone(),
            e.services.versions.clone(),
            Duration::hours(4),
        );

        let result = service
            .complete("task-1", json!({}), &op_manager("ops-1"))
            .await
            .unwrap();

        assert!(result.task_updated);
        assert!(!result.deal_updated);
        assert!(result.deal_error.unwrap().contains("not found"));
        assert!(!result.workflow_transition.attempted);
    }
}
