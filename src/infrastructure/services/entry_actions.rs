//! Stage entry actions
//!
//! Every side effect carries a deterministic action hash, so running the
//! actions of a stage again (re-entry, replay after a crash, a retried
//! inbound event) never duplicates tasks or queued messages.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::queue_dispatcher::QueueDispatcherTrait;
use crate::domain::deal::Deal;
use crate::domain::definition::{Action, Stage, TaskTemplate, WorkflowDefinition};
use crate::domain::error::DomainError;
use crate::domain::guard::evaluate_all;
use crate::domain::hashing::{queue_action_hash, task_action_hash};
use crate::domain::queue::{NotificationKind, QueueTarget};
use crate::domain::task::{guard_key_for_type, Task, TaskRepository};

/// An entry action whose conditions did not hold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAction {
    pub index: usize,
    pub kind: &'static str,
    pub failed_conditions: Vec<String>,
}

/// What running a stage's entry actions produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryActionReport {
    pub stage: String,
    /// IDs of tasks inserted by this run
    pub tasks_created: Vec<String>,
    /// IDs of tasks that already existed for the same action hash
    pub tasks_existing: Vec<String>,
    /// IDs of queue rows written (inserted or refreshed)
    pub queued: Vec<String>,
    pub skipped: Vec<SkippedAction>,
}

pub struct EntryActionExecutor {
    tasks: Arc<dyn TaskRepository>,
    dispatcher: Arc<dyn QueueDispatcherTrait>,
}

impl EntryActionExecutor {
    pub fn new(tasks: Arc<dyn TaskRepository>, dispatcher: Arc<dyn QueueDispatcherTrait>) -> Self {
        Self { tasks, dispatcher }
    }

    /// Runs the entry actions of the deal's current stage in order
    #[instrument(skip(self, deal, definition), fields(deal_id = %deal.id, stage = %deal.status))]
    pub async fn run(
        &self,
        deal: &Deal,
        definition: &WorkflowDefinition,
    ) -> Result<EntryActionReport, DomainError> {
        let stage = definition.stage(&deal.status).ok_or_else(|| {
            DomainError::validation(format!(
                "Stage '{}' is not defined in workflow '{}'",
                deal.status,
                definition.id()
            ))
        })?;

        let mut report = EntryActionReport {
            stage: deal.status.clone(),
            ..Default::default()
        };

        for (index, action) in stage.entry_actions.iter().enumerate() {
            let failed: Vec<String> = evaluate_all(&deal.payload, action.conditions())
                .into_iter()
                .filter(|outcome| !outcome.ok)
                .map(|outcome| outcome.describe())
                .collect();

            if !failed.is_empty() {
                debug!(index, kind = action.kind(), "Entry action conditions not met");
                report.skipped.push(SkippedAction {
                    index,
                    kind: action.kind(),
                    failed_conditions: failed,
                });
                continue;
            }

            if let Action::TaskCreate { task, .. } = action {
                let inserted = self
                    .tasks
                    .insert_deduplicated(build_task(deal, stage, task))
                    .await?;
                let id = inserted.task().id.clone();
                if inserted.was_created() {
                    report.tasks_created.push(id);
                } else {
                    report.tasks_existing.push(id);
                }
                continue;
            }

            let Some((target, payload)) = queue_effect(deal, action) else {
                continue;
            };
            let action_json = serde_json::to_value(action)
                .map_err(|e| DomainError::internal(format!("Failed to serialize action: {}", e)))?;
            let hash = queue_action_hash(&deal.id, &deal.status, target.sink_type(), &action_json);

            let entry = self
                .dispatcher
                .enqueue(target, &hash, payload, Some(deal.id.clone()))
                .await?;
            report.queued.push(entry.id);
        }

        info!(
            tasks_created = report.tasks_created.len(),
            tasks_existing = report.tasks_existing.len(),
            queued = report.queued.len(),
            skipped = report.skipped.len(),
            "Entry actions executed"
        );

        Ok(report)
    }
}

fn build_task(deal: &Deal, stage: &Stage, template: &TaskTemplate) -> Task {
    let title = template
        .title
        .clone()
        .unwrap_or_else(|| template.task_type.clone());
    let guard_key = template
        .guard_key
        .clone()
        .or_else(|| guard_key_for_type(&template.task_type).map(str::to_string));

    let mut task = Task::new(&deal.id, &template.task_type)
        .with_title(&title)
        .with_stage(&deal.status)
        .with_action_hash(task_action_hash(&deal.id, &deal.status, &template.task_type))
        .with_payload(json!({
            "guard_key": guard_key,
            "template_id": template.template_id,
            "title": title,
        }));

    if let Some(role) = &template.assignee_role {
        task = task.with_assignee_role(role.clone());
    }

    let sla_hours = template
        .sla
        .as_ref()
        .map(|sla| sla.hours)
        .or_else(|| stage.max_hours());
    if let Some(hours) = sla_hours {
        task = task.with_sla_due_at(Utc::now() + Duration::hours(i64::from(hours)));
    }

    task
}

fn queue_effect(deal: &Deal, action: &Action) -> Option<(QueueTarget, Value)> {
    let base = json!({
        "deal_id": deal.id,
        "workflow_id": deal.workflow_id,
        "stage": deal.status,
    });

    match action {
        Action::Notify {
            template, to_roles, ..
        }
        | Action::Escalate {
            template, to_roles, ..
        } => {
            let kind = if matches!(action, Action::Escalate { .. }) {
                NotificationKind::Escalate
            } else {
                NotificationKind::Notify
            };
            Some((
                QueueTarget::Notification {
                    kind,
                    template: template.clone(),
                    to_roles: to_roles.clone(),
                },
                base,
            ))
        }
        Action::Webhook {
            endpoint, payload, ..
        } => {
            let mut body = base;
            body["event"] = json!("deal.stage_entered");
            body["data"] = payload.clone().unwrap_or(Value::Null);
            Some((
                QueueTarget::Webhook {
                    endpoint: endpoint.clone(),
                },
                body,
            ))
        }
        Action::Schedule { job, .. } => Some((
            QueueTarget::Schedule {
                job_type: job.job_type.clone(),
                cron: job.cron.clone(),
            },
            base,
        )),
        Action::TaskCreate { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::{parse_definition, DefinitionFormat};
    use crate::domain::queue::{QueueRepository, QueueStatus, SinkType};
    use crate::infrastructure::queue::InMemoryQueueRepository;
    use crate::infrastructure::services::queue_dispatcher::{
        QueueDispatcher, QueueDispatcherConfig,
    };
    use crate::infrastructure::task::InMemoryTaskRepository;

    const DEFINITION: &str = r#"
workflow: { id: actions-demo, title: Actions }
kanban_order: [REVIEW]
stages:
  REVIEW:
    title: Review
    sla: { max_hours: 12 }
    entry_actions:
      - type: TASK_CREATE
        task: { type: AECB_CHECK, title: Credit check, assignee_role: RISK_MANAGER }
      - type: TASK_CREATE
        task: { type: CUSTOM_CHECK, guard_key: custom.done, sla: { hours: 2 } }
      - type: NOTIFY
        template: review_started
        to_roles: [RISK_MANAGER]
      - type: WEBHOOK
        endpoint: https://example.test/hooks/review
        payload: { source: leaseflow }
        conditions: [{ key: risk.highValue, rule: truthy }]
"#;

    struct Fixture {
        executor: EntryActionExecutor,
        tasks: Arc<InMemoryTaskRepository>,
        queue: Arc<InMemoryQueueRepository>,
        definition: WorkflowDefinition,
    }

    fn fixture() -> Fixture {
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let queue = Arc::new(InMemoryQueueRepository::new());
        let dispatcher = Arc::new(QueueDispatcher::new(
            queue.clone(),
            vec![],
            QueueDispatcherConfig::default(),
        ));

        Fixture {
            executor: EntryActionExecutor::new(tasks.clone(), dispatcher),
            tasks,
            queue,
            definition: parse_definition(DEFINITION, DefinitionFormat::Yaml).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_tasks_and_notifications_are_created() {
        let f = fixture();
        let deal = Deal::new("actions-demo", "v-1", "REVIEW");

        let report = f.executor.run(&deal, &f.definition).await.unwrap();

        assert_eq!(report.tasks_created.len(), 2);
        assert_eq!(report.queued.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].kind, "WEBHOOK");

        let tasks = f.tasks.list_by_deal(&deal.id).await.unwrap();
        let aecb = tasks.iter().find(|t| t.task_type == "AECB_CHECK").unwrap();
        assert_eq!(aecb.title, "Credit check");
        assert_eq!(aecb.stage.as_deref(), Some("REVIEW"));
        assert_eq!(aecb.assignee_role.as_ref().unwrap().as_str(), "RISK_MANAGER");
        assert_eq!(aecb.payload["guard_key"], json!("risk.approved"));

        let custom = tasks.iter().find(|t| t.task_type == "CUSTOM_CHECK").unwrap();
        assert_eq!(custom.payload["guard_key"], json!("custom.done"));

        // Template SLA wins over the stage SLA
        let custom_hours = (custom.sla_due_at.unwrap() - custom.created_at).num_hours();
        let aecb_hours = (aecb.sla_due_at.unwrap() - aecb.created_at).num_hours();
        assert!((1..=2).contains(&custom_hours));
        assert!((11..=12).contains(&aecb_hours));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let f = fixture();
        let deal = Deal::new("actions-demo", "v-1", "REVIEW");

        f.executor.run(&deal, &f.definition).await.unwrap();
        let second = f.executor.run(&deal, &f.definition).await.unwrap();

        assert!(second.tasks_created.is_empty());
        assert_eq!(second.tasks_existing.len(), 2);
        assert_eq!(f.tasks.list_by_deal(&deal.id).await.unwrap().len(), 2);

        let notifications = f.queue.list(SinkType::Notification, None, 10).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].status, QueueStatus::Pending);
    }

    #[tokio::test]
    async fn test_conditional_action_runs_when_guard_holds() {
        let f = fixture();
        let deal = Deal::new("actions-demo", "v-1", "REVIEW")
            .with_payload(json!({"risk": {"highValue": true}}));

        let report = f.executor.run(&deal, &f.definition).await.unwrap();
        assert!(report.skipped.is_empty());

        let hooks = f.queue.list(SinkType::Webhook, None, 10).await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].payload["data"], json!({"source": "leaseflow"}));
        assert_eq!(hooks[0].deal_id.as_deref(), Some(deal.id.as_str()));
    }

    #[tokio::test]
    async fn test_unknown_stage_is_rejected() {
        let f = fixture();
        let deal = Deal::new("actions-demo", "v-1", "MISSING");

        let result = f.executor.run(&deal, &f.definition).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }
}
