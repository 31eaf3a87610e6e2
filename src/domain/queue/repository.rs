//! Queue repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{QueueEntry, QueueStats, QueueStatus, SinkType};
use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Repository for side-effect queue rows. Rows are never deleted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Inserts the entry, or when a row with the same action hash exists
    /// replaces its payload and target while keeping its status
    async fn upsert(&self, entry: QueueEntry) -> Result<QueueEntry, DomainError>;

    /// Finds an entry by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<QueueEntry>, DomainError>;

    /// Finds an entry by action hash
    async fn find_by_action_hash(&self, hash: &str) -> Result<Option<QueueEntry>, DomainError>;

    /// Lists entries of a sink, newest first, optionally filtered by status
    async fn list(
        &self,
        sink: SinkType,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, DomainError>;

    /// Atomically moves up to `limit` due PENDING rows of a sink to
    /// PROCESSING, oldest first, and returns them. Rows claimed by one
    /// caller are never returned to another.
    async fn claim_pending(
        &self,
        sink: SinkType,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, DomainError>;

    /// PROCESSING to SENT
    async fn mark_sent(&self, id: &str, now: DateTime<Utc>) -> Result<(), DomainError>;

    /// PROCESSING to FAILED, terminal
    async fn mark_failed(
        &self,
        id: &str,
        attempts: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// PROCESSING back to PENDING with a delayed next attempt
    async fn reschedule(
        &self,
        id: &str,
        attempts: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Returns PROCESSING rows last touched before `older_than` to PENDING
    async fn release_stale(
        &self,
        sink: SinkType,
        older_than: DateTime<Utc>,
    ) -> Result<u64, DomainError>;

    /// Row counts per status for a sink
    async fn stats(&self, sink: SinkType) -> Result<QueueStats, DomainError>;
}

#[cfg(test)]
pub mod tests {
    //! Contract tests shared by every repository implementation

    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::domain::queue::QueueTarget;
    use chrono::Duration;
    use serde_json::json;

    pub fn webhook_entry(hash: &str) -> QueueEntry {
        QueueEntry::new(
            QueueTarget::Webhook {
                endpoint: "https://hooks.example.test/deal".into(),
            },
            hash,
            json!({"n": 1}),
        )
    }

    pub async fn assert_upsert_keeps_single_row(repo: &dyn QueueRepository) {
        let first = repo.upsert(webhook_entry("same")).await.unwrap();

        let mut again = webhook_entry("same");
        again.payload = json!({"n": 2});
        let second = repo.upsert(again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.payload, json!({"n": 2}));

        let rows = repo.list(SinkType::Webhook, None, 100).await.unwrap();
        assert_eq!(rows.iter().filter(|r| r.action_hash == "same").count(), 1);
    }

    pub async fn assert_upsert_does_not_reset_sent(repo: &dyn QueueRepository) {
        let entry = repo.upsert(webhook_entry("sent-once")).await.unwrap();
        let claimed = repo
            .claim_pending(SinkType::Webhook, 10, Utc::now())
            .await
            .unwrap();
        assert!(claimed.iter().any(|e| e.id == entry.id));
        repo.mark_sent(&entry.id, Utc::now()).await.unwrap();

        let updated = repo.upsert(webhook_entry("sent-once")).await.unwrap();
        assert_eq!(updated.status, QueueStatus::Sent);
    }

    pub async fn assert_claim_skips_not_yet_due(repo: &dyn QueueRepository) {
        let now = Utc::now();
        let entry = repo.upsert(webhook_entry("later")).await.unwrap();
        repo.claim_pending(SinkType::Webhook, 10, now).await.unwrap();
        repo.reschedule(&entry.id, 1, "boom", now + Duration::minutes(10))
            .await
            .unwrap();

        let claimed = repo.claim_pending(SinkType::Webhook, 10, now).await.unwrap();
        assert!(claimed.is_empty());

        let claimed = repo
            .claim_pending(SinkType::Webhook, 10, now + Duration::minutes(11))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);
        assert_eq!(claimed[0].error.as_deref(), Some("boom"));
    }

    pub async fn assert_concurrent_claims_never_overlap(repo: Arc<dyn QueueRepository>) {
        for i in 0..20 {
            repo.upsert(webhook_entry(&format!("c-{i}"))).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.claim_pending(SinkType::Webhook, 10, Utc::now()).await
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for entry in handle.await.unwrap().unwrap() {
                total += 1;
                assert!(seen.insert(entry.id), "row claimed twice");
            }
        }
        assert_eq!(total, 20);
    }

    pub async fn assert_release_stale(repo: &dyn QueueRepository) {
        let entry = repo.upsert(webhook_entry("stale")).await.unwrap();
        repo.claim_pending(SinkType::Webhook, 10, Utc::now()).await.unwrap();

        let released = repo
            .release_stale(SinkType::Webhook, Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(released, 1);

        let stored = repo.find_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Pending);
    }

    #[tokio::test]
    async fn test_mock_queue_repository() {
        let mut mock = MockQueueRepository::new();

        mock.expect_stats()
            .returning(|sink| Ok(QueueStats { sink: Some(sink), ..Default::default() }));

        let stats = mock.stats(SinkType::Schedule).await.unwrap();
        assert_eq!(stats.sink, Some(SinkType::Schedule));
    }
}
