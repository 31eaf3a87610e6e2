//! Task entity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actor::Role;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Open,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Blocked => "BLOCKED",
            Self::Done => "DONE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "IN_PROGRESS" => Some(Self::InProgress),
            "BLOCKED" => Some(Self::Blocked),
            "DONE" => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A work item produced by a stage entry action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub deal_id: String,
    pub task_type: String,
    pub title: String,
    pub status: TaskStatus,
    pub assignee_role: Option<Role>,
    /// Set exactly once by a successful claim
    pub assignee_user_id: Option<String>,
    /// Stage whose entry action created the task
    pub stage: Option<String>,
    pub sla_due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub payload: Value,
    /// Deduplication key for tasks created by entry actions
    pub action_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(deal_id: impl Into<String>, task_type: impl Into<String>) -> Self {
        let now = Utc::now();
        let task_type = task_type.into();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deal_id: deal_id.into(),
            title: task_type.clone(),
            task_type,
            status: TaskStatus::Open,
            assignee_role: None,
            assignee_user_id: None,
            stage: None,
            sla_due_at: None,
            completed_at: None,
            payload: Value::Object(Default::default()),
            action_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_assignee_role(mut self, role: Role) -> Self {
        self.assignee_role = Some(role);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_sla_due_at(mut self, due: DateTime<Utc>) -> Self {
        self.sla_due_at = Some(due);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_action_hash(mut self, hash: impl Into<String>) -> Self {
        self.action_hash = Some(hash.into());
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    pub fn is_claimed(&self) -> bool {
        self.assignee_user_id.is_some()
    }

    /// Guard key declared on the task itself, if any
    pub fn declared_guard_key(&self) -> Option<&str> {
        self.payload
            .get("guard_key")
            .and_then(Value::as_str)
            .filter(|key| !key.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            json!("IN_PROGRESS")
        );
    }

    #[test]
    fn test_declared_guard_key() {
        let task = Task::new("deal-1", "CUSTOM")
            .with_payload(json!({"guard_key": "custom.flag"}));
        assert_eq!(task.declared_guard_key(), Some("custom.flag"));

        let blank = Task::new("deal-1", "CUSTOM").with_payload(json!({"guard_key": " "}));
        assert_eq!(blank.declared_guard_key(), None);
    }
}
