//! Side-effect queue entries

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actor::Role;

/// Kind of external delivery target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    Notification,
    Webhook,
    Schedule,
}

impl SinkType {
    pub fn all() -> [Self; 3] {
        [Self::Notification, Self::Webhook, Self::Schedule]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::Webhook => "webhook",
            Self::Schedule => "schedule",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "notification" => Some(Self::Notification),
            "webhook" => Some(Self::Webhook),
            "schedule" => Some(Self::Schedule),
            _ => None,
        }
    }
}

impl fmt::Display for SinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    #[default]
    Pending,
    /// Claimed by a drain cycle
    Processing,
    Sent,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Notify,
    Escalate,
}

/// Where a queue entry is delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sink", rename_all = "lowercase")]
pub enum QueueTarget {
    Notification {
        kind: NotificationKind,
        template: String,
        #[serde(default)]
        to_roles: Vec<Role>,
    },
    Webhook {
        endpoint: String,
    },
    Schedule {
        job_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cron: Option<String>,
    },
}

impl QueueTarget {
    pub fn sink_type(&self) -> SinkType {
        match self {
            Self::Notification { .. } => SinkType::Notification,
            Self::Webhook { .. } => SinkType::Webhook,
            Self::Schedule { .. } => SinkType::Schedule,
        }
    }
}

/// A durable, idempotent side-effect row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub sink: SinkType,
    /// Unique key; re-enqueueing the same hash updates this row
    pub action_hash: String,
    pub status: QueueStatus,
    pub target: QueueTarget,
    pub payload: Value,
    pub deal_id: Option<String>,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(target: QueueTarget, action_hash: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sink: target.sink_type(),
            action_hash: action_hash.into(),
            status: QueueStatus::Pending,
            target,
            payload,
            deal_id: None,
            attempts: 0,
            next_attempt_at: None,
            processed_at: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_deal(mut self, deal_id: impl Into<String>) -> Self {
        self.deal_id = Some(deal_id.into());
        self
    }

    /// Ready for a drain cycle at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending && self.next_attempt_at.is_none_or(|at| at <= now)
    }
}

/// Per-sink row counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub sink: Option<SinkType>,
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_target_determines_sink() {
        let entry = QueueEntry::new(
            QueueTarget::Webhook {
                endpoint: "https://example.test/hook".into(),
            },
            "hash",
            json!({}),
        );
        assert_eq!(entry.sink, SinkType::Webhook);
        assert_eq!(entry.status, QueueStatus::Pending);
    }

    #[test]
    fn test_target_serialization() {
        let target = QueueTarget::Schedule {
            job_type: "PAYMENT_REMINDER".into(),
            cron: None,
        };
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            json!({"sink": "schedule", "job_type": "PAYMENT_REMINDER"})
        );
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut entry = QueueEntry::new(
            QueueTarget::Schedule {
                job_type: "X".into(),
                cron: None,
            },
            "h",
            json!({}),
        );
        assert!(entry.is_due(now));

        entry.next_attempt_at = Some(now + Duration::minutes(5));
        assert!(!entry.is_due(now));

        entry.next_attempt_at = Some(now - Duration::minutes(5));
        entry.status = QueueStatus::Sent;
        assert!(!entry.is_due(now));
    }

    #[test]
    fn test_sink_type_parsing() {
        assert_eq!(SinkType::from_str("Webhook"), Some(SinkType::Webhook));
        assert_eq!(SinkType::from_str("sms"), None);
    }
}
