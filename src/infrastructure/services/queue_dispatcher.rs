//! Queue dispatcher: idempotent enqueue and bounded drain cycles

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::QueueConfig;
use crate::domain::error::DomainError;
use crate::domain::queue::{
    QueueEntry, QueueRepository, QueueSink, QueueStats, QueueStatus, QueueTarget, SinkType,
};
use crate::infrastructure::observability::record_queue_dispatch;

/// Drain tuning
#[derive(Debug, Clone)]
pub struct QueueDispatcherConfig {
    /// Upper bound for a single sink call
    pub sink_timeout: Duration,
    /// Attempts before a row is marked FAILED for good
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// PROCESSING rows older than this are assumed abandoned
    pub processing_stale: Duration,
    pub default_limit: usize,
}

impl Default for QueueDispatcherConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for QueueDispatcherConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            sink_timeout: Duration::from_secs(config.sink_timeout_secs),
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_secs(config.base_backoff_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            processing_stale: Duration::from_secs(config.processing_stale_secs),
            default_limit: config.drain_limit,
        }
    }
}

impl QueueDispatcherConfig {
    /// Delay before the next try after `attempts` failures:
    /// `min(max_backoff, base_backoff * 2^(attempts-1))`
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Counts from one drain cycle of one sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrainReport {
    pub sink: SinkType,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
    pub released: u64,
}

impl DrainReport {
    fn empty(sink: SinkType) -> Self {
        Self {
            sink,
            processed: 0,
            failed: 0,
            retried: 0,
            released: 0,
        }
    }
}

/// Trait for queue dispatcher operations (for dynamic dispatch in AppState)
#[async_trait]
pub trait QueueDispatcherTrait: Send + Sync {
    /// Upserts a side effect keyed by its action hash
    async fn enqueue(
        &self,
        target: QueueTarget,
        action_hash: &str,
        payload: Value,
        deal_id: Option<String>,
    ) -> Result<QueueEntry, DomainError>;

    /// Delivers up to `limit` due rows of one sink
    async fn drain(&self, sink: SinkType, limit: Option<usize>) -> Result<DrainReport, DomainError>;

    /// Drains every sink concurrently
    async fn drain_all(&self, limit: Option<usize>) -> Result<Vec<DrainReport>, DomainError>;

    async fn stats(&self) -> Result<Vec<QueueStats>, DomainError>;

    async fn list(
        &self,
        sink: SinkType,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, DomainError>;
}

pub struct QueueDispatcher {
    repository: Arc<dyn QueueRepository>,
    sinks: HashMap<SinkType, Arc<dyn QueueSink>>,
    config: QueueDispatcherConfig,
}

impl std::fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish()
    }
}

impl QueueDispatcher {
    pub fn new(
        repository: Arc<dyn QueueRepository>,
        sinks: Vec<Arc<dyn QueueSink>>,
        config: QueueDispatcherConfig,
    ) -> Self {
        let sinks = sinks
            .into_iter()
            .map(|sink| (sink.sink_type(), sink))
            .collect();

        Self {
            repository,
            sinks,
            config,
        }
    }

    async fn deliver(&self, sink: &dyn QueueSink, entry: &QueueEntry) -> Result<(), DomainError> {
        match tokio::time::timeout(self.config.sink_timeout, sink.deliver(entry)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::sink(
                entry.sink.as_str(),
                format!("timed out after {}s", self.config.sink_timeout.as_secs_f64()),
            )),
        }
    }

    /// Records the outcome of one delivery on the row. Bookkeeping
    /// failures are logged; the drain keeps going.
    async fn settle(
        &self,
        entry: &QueueEntry,
        result: Result<(), DomainError>,
        report: &mut DrainReport,
    ) {
        let now = Utc::now();

        let (outcome, write) = match result {
            Ok(()) => {
                report.processed += 1;
                ("sent", self.repository.mark_sent(&entry.id, now).await)
            }
            Err(e) => {
                let attempts = entry.attempts + 1;
                let message = e.to_string();

                if attempts < self.config.max_attempts {
                    report.retried += 1;
                    let delay = self.config.backoff_delay(attempts);
                    let next = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(60));
                    warn!(
                        entry_id = %entry.id,
                        sink = %entry.sink,
                        attempts,
                        retry_in_secs = delay.as_secs(),
                        error = %message,
                        "Delivery failed, rescheduled"
                    );
                    (
                        "retried",
                        self.repository
                            .reschedule(&entry.id, attempts, &message, next)
                            .await,
                    )
                } else {
                    report.failed += 1;
                    warn!(
                        entry_id = %entry.id,
                        sink = %entry.sink,
                        attempts,
                        error = %message,
                        "Delivery failed permanently"
                    );
                    (
                        "failed",
                        self.repository
                            .mark_failed(&entry.id, attempts, &message, now)
                            .await,
                    )
                }
            }
        };

        if let Err(e) = write {
            warn!(entry_id = %entry.id, outcome, error = %e, "Failed to record delivery outcome");
        }
    }
}

#[async_trait]
impl QueueDispatcherTrait for QueueDispatcher {
    #[instrument(skip(self, target, payload), fields(sink = %target.sink_type()))]
    async fn enqueue(
        &self,
        target: QueueTarget,
        action_hash: &str,
        payload: Value,
        deal_id: Option<String>,
    ) -> Result<QueueEntry, DomainError> {
        if action_hash.trim().is_empty() {
            return Err(DomainError::validation("Queue entries require an action hash"));
        }

        let mut entry = QueueEntry::new(target, action_hash, payload);
        if let Some(deal_id) = deal_id {
            entry = entry.with_deal(deal_id);
        }

        let stored = self.repository.upsert(entry).await?;
        debug!(entry_id = %stored.id, status = %stored.status, "Enqueued side effect");

        Ok(stored)
    }

    #[instrument(skip(self), fields(sink = %sink))]
    async fn drain(&self, sink: SinkType, limit: Option<usize>) -> Result<DrainReport, DomainError> {
        let mut report = DrainReport::empty(sink);

        let Some(target) = self.sinks.get(&sink).cloned() else {
            warn!(sink = %sink, "No sink registered, skipping drain");
            return Ok(report);
        };

        let now = Utc::now();
        let stale_before = now
            - chrono::Duration::from_std(self.config.processing_stale)
                .unwrap_or_else(|_| chrono::Duration::minutes(10));
        report.released = self.repository.release_stale(sink, stale_before).await?;
        if report.released > 0 {
            warn!(sink = %sink, released = report.released, "Released stale PROCESSING rows");
        }

        let limit = limit.unwrap_or(self.config.default_limit);
        let claimed = self.repository.claim_pending(sink, limit, now).await?;

        for entry in &claimed {
            let started = Instant::now();
            let result = self.deliver(target.as_ref(), entry).await;
            let label = if result.is_ok() { "sent" } else { "error" };
            record_queue_dispatch(sink.as_str(), label, started.elapsed());

            self.settle(entry, result, &mut report).await;
        }

        if !claimed.is_empty() {
            info!(
                sink = %sink,
                processed = report.processed,
                retried = report.retried,
                failed = report.failed,
                "Drain cycle finished"
            );
        }

        Ok(report)
    }

    async fn drain_all(&self, limit: Option<usize>) -> Result<Vec<DrainReport>, DomainError> {
        join_all(SinkType::all().map(|sink| self.drain(sink, limit)))
            .await
            .into_iter()
            .collect()
    }

    async fn stats(&self) -> Result<Vec<QueueStats>, DomainError> {
        let mut stats = Vec::with_capacity(SinkType::all().len());
        for sink in SinkType::all() {
            stats.push(self.repository.stats(sink).await?);
        }
        Ok(stats)
    }

    async fn list(
        &self,
        sink: SinkType,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, DomainError> {
        self.repository.list(sink, status, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::queue::MockQueueSink;
    use crate::infrastructure::queue::InMemoryQueueRepository;
    use serde_json::json;

    fn webhook_target() -> QueueTarget {
        QueueTarget::Webhook {
            endpoint: "https://example.test/hooks/deal".to_string(),
        }
    }

    fn webhook_sink(result: fn() -> Result<(), DomainError>) -> Arc<dyn QueueSink> {
        let mut sink = MockQueueSink::new();
        sink.expect_sink_type().return_const(SinkType::Webhook);
        sink.expect_deliver().returning(move |_| result());
        Arc::new(sink)
    }

    fn dispatcher_with(
        repo: Arc<InMemoryQueueRepository>,
        sinks: Vec<Arc<dyn QueueSink>>,
        config: QueueDispatcherConfig,
    ) -> QueueDispatcher {
        QueueDispatcher::new(repo, sinks, config)
    }

    struct SlowSink;

    #[async_trait]
    impl QueueSink for SlowSink {
        fn sink_type(&self) -> SinkType {
            SinkType::Webhook
        }

        async fn deliver(&self, _entry: &QueueEntry) -> Result<(), DomainError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_bounded() {
        let config = QueueDispatcherConfig::default();

        assert_eq!(config.backoff_delay(1), Duration::from_secs(60));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(120));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(480));
        assert_eq!(config.backoff_delay(6), Duration::from_secs(1800));
        assert_eq!(config.backoff_delay(40), Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn test_enqueue_twice_keeps_one_row_with_latest_payload() {
        let repo = Arc::new(InMemoryQueueRepository::new());
        let dispatcher = dispatcher_with(repo.clone(), vec![], QueueDispatcherConfig::default());

        let first = dispatcher
            .enqueue(webhook_target(), "hash-1", json!({"v": 1}), Some("deal-1".into()))
            .await
            .unwrap();
        let second = dispatcher
            .enqueue(webhook_target(), "hash-1", json!({"v": 2}), Some("deal-1".into()))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let rows = repo.list(SinkType::Webhook, None, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_enqueue_requires_hash() {
        let dispatcher = dispatcher_with(
            Arc::new(InMemoryQueueRepository::new()),
            vec![],
            QueueDispatcherConfig::default(),
        );

        let result = dispatcher.enqueue(webhook_target(), " ", json!({}), None).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_drain_marks_sent() {
        let repo = Arc::new(InMemoryQueueRepository::new());
        let dispatcher = dispatcher_with(
            repo.clone(),
            vec![webhook_sink(|| Ok(()))],
            QueueDispatcherConfig::default(),
        );

        let entry = dispatcher
            .enqueue(webhook_target(), "hash-1", json!({}), None)
            .await
            .unwrap();

        let report = dispatcher.drain(SinkType::Webhook, None).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);

        let stored = repo.find_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Sent);
        assert!(stored.processed_at.is_some());

        let again = dispatcher.drain(SinkType::Webhook, None).await.unwrap();
        assert_eq!(again.processed, 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_rescheduled_with_backoff() {
        let repo = Arc::new(InMemoryQueueRepository::new());
        let dispatcher = dispatcher_with(
            repo.clone(),
            vec![webhook_sink(|| Err(DomainError::sink("webhook", "HTTP status 502")))],
            QueueDispatcherConfig::default(),
        );

        let entry = dispatcher
            .enqueue(webhook_target(), "hash-1", json!({}), None)
            .await
            .unwrap();

        let report = dispatcher.drain(SinkType::Webhook, None).await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.processed, 0);

        let stored = repo.find_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.error.as_deref().unwrap().contains("502"));
        assert!(stored.next_attempt_at.unwrap() > Utc::now());

        // Not due yet
        let again = dispatcher.drain(SinkType::Webhook, None).await.unwrap();
        assert_eq!(again.retried, 0);
    }

    #[tokio::test]
    async fn test_last_attempt_marks_failed() {
        let repo = Arc::new(InMemoryQueueRepository::new());
        let config = QueueDispatcherConfig {
            max_attempts: 1,
            ..Default::default()
        };
        let dispatcher = dispatcher_with(
            repo.clone(),
            vec![webhook_sink(|| Err(DomainError::sink("webhook", "HTTP status 500")))],
            config,
        );

        let entry = dispatcher
            .enqueue(webhook_target(), "hash-1", json!({}), None)
            .await
            .unwrap();

        let report = dispatcher.drain(SinkType::Webhook, None).await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = repo.find_by_id(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_slow_sink_times_out() {
        let repo = Arc::new(InMemoryQueueRepository::new());
        let config = QueueDispatcherConfig {
            sink_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let dispatcher = dispatcher_with(repo.clone(), vec![Arc::new(SlowSink)], config);

        let entry = dispatcher
            .enqueue(webhook_target(), "hash-1", json!({}), None)
            .await
            .unwrap();

        let report = dispatcher.drain(SinkType::Webhook, None).await.unwrap();
        assert_eq!(report.retried, 1);

        let stored = repo.find_by_id(&entry.id).await.unwrap().unwrap();
        assert!(stored.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_drain_respects_limit() {
        let repo = Arc::new(InMemoryQueueRepository::new());
        let dispatcher = dispatcher_with(
            repo.clone(),
            vec![webhook_sink(|| Ok(()))],
            QueueDispatcherConfig::default(),
        );

        for i in 0..3 {
            dispatcher
                .enqueue(webhook_target(), &format!("hash-{i}"), json!({}), None)
                .await
                .unwrap();
        }

        let report = dispatcher.drain(SinkType::Webhook, Some(2)).await.unwrap();
        assert_eq!(report.processed, 2);

        let stats = repo.stats(SinkType::Webhook).await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.sent, 2);
    }

    #[tokio::test]
    async fn test_drain_all_covers_every_sink() {
        let dispatcher = dispatcher_with(
            Arc::new(InMemoryQueueRepository::new()),
            vec![webhook_sink(|| Ok(()))],
            QueueDispatcherConfig::default(),
        );

        let reports = dispatcher.drain_all(None).await.unwrap();
        let sinks: Vec<_> = reports.iter().map(|r| r.sink).collect();

        assert_eq!(sinks, SinkType::all().to_vec());
        assert_eq!(dispatcher.stats().await.unwrap().len(), 3);
    }
}
