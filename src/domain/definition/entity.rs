//! Workflow definition model
//!
//! A definition is the parsed form of a workflow source document. It is
//! immutable once published as a version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actor::{Actor, Role};
use crate::domain::guard::GuardRule;

/// Workflow header block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMeta {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Role declared by a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub code: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Complete workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow: WorkflowMeta,
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
    #[serde(default)]
    pub kanban_order: Vec<String>,
    #[serde(alias = "statuses")]
    pub stages: BTreeMap<String, Stage>,
    /// Evaluated in order; the first transition whose guards and roles pass
    /// wins, so mutually exclusive transitions must be ordered on purpose.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl WorkflowDefinition {
    pub fn id(&self) -> &str {
        &self.workflow.id
    }

    pub fn stage(&self, key: &str) -> Option<&Stage> {
        self.stages.get(key)
    }

    pub fn has_stage(&self, key: &str) -> bool {
        self.stages.contains_key(key)
    }

    /// Stage new deals start in: head of the kanban order
    pub fn initial_stage(&self) -> Option<&Stage> {
        self.kanban_order.first().and_then(|key| self.stage(key))
    }

    /// Transitions leaving `from`, in definition order
    pub fn transitions_from<'a, 'b>(
        &'a self,
        from: &'b str,
    ) -> impl Iterator<Item = &'a Transition> + use<'a, 'b> {
        self.transitions.iter().filter(move |t| t.from == from)
    }

    pub fn find_transition(&self, from: &str, to: &str) -> Option<&Transition> {
        self.transitions_from(from).find(|t| t.to == to)
    }
}

/// A named state in a deal's lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Filled from the map key on parse
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub entry_actions: Vec<Action>,
    #[serde(default)]
    pub exit_requirements: Vec<GuardRule>,
    #[serde(default)]
    pub webhooks: StageWebhooks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<StageSla>,
}

impl Stage {
    /// Route declared for an inbound event, if any
    pub fn event_route(&self, event: &str) -> Option<&EventRoute> {
        self.webhooks.on_event.iter().find(|r| r.event == event)
    }

    pub fn max_hours(&self) -> Option<u32> {
        self.sla.as_ref().and_then(|sla| sla.max_hours)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageWebhooks {
    #[serde(default)]
    pub on_event: Vec<EventRoute>,
}

/// Maps an inbound event received in this stage to a transition target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRoute {
    pub event: String,
    pub transition_to: String,
    #[serde(default)]
    pub conditions: Vec<GuardRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSla {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hours: Option<u32>,
    #[serde(default)]
    pub escalation: Vec<Escalation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    pub after_hours: u32,
    pub action: Action,
}

/// Directed edge between two stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    /// Empty means system-triggered only
    #[serde(default)]
    pub by_roles: Vec<Role>,
    #[serde(default)]
    pub guards: Vec<GuardRule>,
}

impl Transition {
    /// The system may take any transition. Users need one of the listed
    /// roles, so a transition without roles is closed to them.
    pub fn permits(&self, actor: &Actor) -> bool {
        actor.is_system() || self.by_roles.iter().any(|role| actor.has_role(role))
    }

    pub fn is_system_only(&self) -> bool {
        self.by_roles.is_empty()
    }
}

/// Work performed automatically on entering a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    TaskCreate {
        task: TaskTemplate,
        #[serde(default)]
        conditions: Vec<GuardRule>,
    },
    Notify {
        template: String,
        #[serde(default)]
        to_roles: Vec<Role>,
        #[serde(default)]
        conditions: Vec<GuardRule>,
    },
    Escalate {
        template: String,
        #[serde(default)]
        to_roles: Vec<Role>,
        #[serde(default)]
        conditions: Vec<GuardRule>,
    },
    Webhook {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default)]
        conditions: Vec<GuardRule>,
    },
    Schedule {
        job: JobSpec,
        #[serde(default)]
        conditions: Vec<GuardRule>,
    },
}

impl Action {
    pub fn conditions(&self) -> &[GuardRule] {
        match self {
            Self::TaskCreate { conditions, .. }
            | Self::Notify { conditions, .. }
            | Self::Escalate { conditions, .. }
            | Self::Webhook { conditions, .. }
            | Self::Schedule { conditions, .. } => conditions,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TaskCreate { .. } => "TASK_CREATE",
            Self::Notify { .. } => "NOTIFY",
            Self::Escalate { .. } => "ESCALATE",
            Self::Webhook { .. } => "WEBHOOK",
            Self::Schedule { .. } => "SCHEDULE",
        }
    }
}

/// Task produced by a TASK_CREATE action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla: Option<TaskSla>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSla {
    pub hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::{ROLE_FINANCE, ROLE_LEGAL};
    use serde_json::json;

    #[test]
    fn test_action_tagged_deserialization() {
        let action: Action = serde_json::from_value(json!({
            "type": "TASK_CREATE",
            "task": {"type": "CONFIRM_CAR", "assignee_role": "op_manager", "sla": {"hours": 24}}
        }))
        .unwrap();

        match &action {
            Action::TaskCreate { task, conditions } => {
                assert_eq!(task.task_type, "CONFIRM_CAR");
                assert_eq!(task.assignee_role.as_ref().unwrap().as_str(), "OP_MANAGER");
                assert_eq!(task.sla.as_ref().unwrap().hours, 24);
                assert!(conditions.is_empty());
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(action.kind(), "TASK_CREATE");
    }

    #[test]
    fn test_schedule_action() {
        let action: Action = serde_json::from_value(json!({
            "type": "SCHEDULE",
            "job": {"type": "PAYMENT_REMINDER", "cron": "0 9 * * *"},
            "conditions": [{"key": "payments.advanceReceived", "rule": "falsy"}]
        }))
        .unwrap();

        assert_eq!(action.conditions().len(), 1);
        assert_eq!(action.kind(), "SCHEDULE");
    }

    #[test]
    fn test_transition_permits() {
        let system_only = Transition {
            from: "A".into(),
            to: "B".into(),
            by_roles: vec![],
            guards: vec![],
        };
        let finance_only = Transition {
            by_roles: vec![Role::new(ROLE_FINANCE)],
            ..system_only.clone()
        };

        let legal = Actor::user("u1", vec![Role::new(ROLE_LEGAL)]);
        let finance = Actor::user("u2", vec![Role::new(ROLE_FINANCE)]);

        let anonymous = Actor::new(Some("anon".into()), vec![]);

        assert!(!system_only.permits(&legal));
        assert!(!system_only.permits(&anonymous));
        assert!(system_only.permits(&Actor::system()));
        assert!(!finance_only.permits(&legal));
        assert!(finance_only.permits(&finance));
        assert!(finance_only.permits(&Actor::system()));
    }
}
