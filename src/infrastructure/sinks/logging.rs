//! Sinks that only record deliveries in the log

use async_trait::async_trait;
use tracing::info;

use crate::domain::queue::{QueueEntry, QueueSink, QueueTarget, SinkType};
use crate::domain::DomainError;

/// Notification sink used when no messaging transport is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl QueueSink for LogNotificationSink {
    fn sink_type(&self) -> SinkType {
        SinkType::Notification
    }

    async fn deliver(&self, entry: &QueueEntry) -> Result<(), DomainError> {
        if let QueueTarget::Notification { template, to_roles, .. } = &entry.target {
            let roles: Vec<_> = to_roles.iter().map(|r| r.as_str()).collect();
            info!(
                entry_id = %entry.id,
                deal_id = ?entry.deal_id,
                template = %template,
                to_roles = %roles.join(","),
                "Notification dispatched"
            );
        }

        Ok(())
    }
}

/// Hands scheduled jobs to the log; the job runner itself lives outside
/// this service
#[derive(Debug, Clone, Default)]
pub struct LogScheduleSink;

#[async_trait]
impl QueueSink for LogScheduleSink {
    fn sink_type(&self) -> SinkType {
        SinkType::Schedule
    }

    async fn deliver(&self, entry: &QueueEntry) -> Result<(), DomainError> {
        let QueueTarget::Schedule { job_type, cron } = &entry.target else {
            return Err(DomainError::sink(
                "schedule",
                format!("Entry '{}' has no job type", entry.id),
            ));
        };

        info!(
            entry_id = %entry.id,
            deal_id = ?entry.deal_id,
            job_type = %job_type,
            cron = ?cron,
            "Scheduled job registered"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::queue::NotificationKind;
    use crate::domain::Role;
    use serde_json::json;

    #[tokio::test]
    async fn test_schedule_sink_accepts_schedule_entries() {
        let entry = QueueEntry::new(
            QueueTarget::Schedule {
                job_type: "PAYMENT_REMINDER".into(),
                cron: Some("0 9 * * *".into()),
            },
            "h",
            json!({}),
        );

        assert!(LogScheduleSink.deliver(&entry).await.is_ok());
    }

    #[tokio::test]
    async fn test_schedule_sink_rejects_other_targets() {
        let entry = QueueEntry::new(
            QueueTarget::Webhook {
                endpoint: "https://example.test".into(),
            },
            "h",
            json!({}),
        );

        assert!(LogScheduleSink.deliver(&entry).await.is_err());
    }

    #[test]
    fn test_notification_sink_always_succeeds() {
        let entry = QueueEntry::new(
            QueueTarget::Notification {
                kind: NotificationKind::Escalate,
                template: "sla_breach".into(),
                to_roles: vec![Role::new("OP_MANAGER")],
            },
            "h",
            json!({"deal_id": "deal-1"}),
        );

        assert!(tokio_test::block_on(LogNotificationSink.deliver(&entry)).is_ok());
    }
}
