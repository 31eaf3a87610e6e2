//! In-memory queue repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::queue::{QueueEntry, QueueRepository, QueueStats, QueueStatus, SinkType};
use crate::domain::DomainError;

/// In-memory implementation of QueueRepository
pub struct InMemoryQueueRepository {
    entries: RwLock<HashMap<String, QueueEntry>>,
}

impl InMemoryQueueRepository {
    /// Creates a new empty repository
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Applies `f` to a PROCESSING row
    fn finish<F>(&self, id: &str, f: F) -> Result<(), DomainError>
    where
        F: FnOnce(&mut QueueEntry),
    {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let entry = entries
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("Queue entry '{}' not found", id)))?;

        if entry.status != QueueStatus::Processing {
            return Err(DomainError::conflict(format!(
                "Queue entry '{}' is {}, not PROCESSING",
                id, entry.status
            )));
        }

        f(entry);
        Ok(())
    }
}

impl Default for InMemoryQueueRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueRepository for InMemoryQueueRepository {
    async fn upsert(&self, entry: QueueEntry) -> Result<QueueEntry, DomainError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        if let Some(existing) = entries
            .values_mut()
            .find(|e| e.action_hash == entry.action_hash)
        {
            existing.payload = entry.payload;
            existing.target = entry.target;
            existing.sink = entry.sink;
            if entry.deal_id.is_some() {
                existing.deal_id = entry.deal_id;
            }
            existing.updated_at = Utc::now();
            return Ok(existing.clone());
        }

        entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<QueueEntry>, DomainError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(entries.get(id).cloned())
    }

    async fn find_by_action_hash(&self, hash: &str) -> Result<Option<QueueEntry>, DomainError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(entries.values().find(|e| e.action_hash == hash).cloned())
    }

    async fn list(
        &self,
        sink: SinkType,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, DomainError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut result: Vec<_> = entries
            .values()
            .filter(|e| e.sink == sink && status.is_none_or(|s| e.status == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn claim_pending(
        &self,
        sink: SinkType,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, DomainError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut due: Vec<_> = entries
            .values()
            .filter(|e| e.sink == sink && e.is_due(now))
            .map(|e| (e.created_at, e.id.clone()))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(entry) = entries.get_mut(&id) {
                entry.status = QueueStatus::Processing;
                entry.updated_at = now;
                claimed.push(entry.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_sent(&self, id: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.finish(id, |entry| {
            entry.status = QueueStatus::Sent;
            entry.processed_at = Some(now);
            entry.error = None;
            entry.updated_at = now;
        })
    }

    async fn mark_failed(
        &self,
        id: &str,
        attempts: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.finish(id, |entry| {
            entry.status = QueueStatus::Failed;
            entry.attempts = attempts;
            entry.error = Some(error.to_string());
            entry.processed_at = Some(now);
            entry.updated_at = now;
        })
    }

    async fn reschedule(
        &self,
        id: &str,
        attempts: u32,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.finish(id, |entry| {
            entry.status = QueueStatus::Pending;
            entry.attempts = attempts;
            entry.error = Some(error.to_string());
            entry.next_attempt_at = Some(next_attempt_at);
            entry.updated_at = Utc::now();
        })
    }

    async fn release_stale(
        &self,
        sink: SinkType,
        older_than: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut released = 0;
        for entry in entries.values_mut().filter(|e| {
            e.sink == sink && e.status == QueueStatus::Processing && e.updated_at < older_than
        }) {
            entry.status = QueueStatus::Pending;
            entry.updated_at = Utc::now();
            released += 1;
        }

        Ok(released)
    }

    async fn stats(&self, sink: SinkType) -> Result<QueueStats, DomainError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut stats = QueueStats {
            sink: Some(sink),
            ..Default::default()
        };
        for entry in entries.values().filter(|e| e.sink == sink) {
            match entry.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Sent => stats.sent += 1,
                QueueStatus::Failed => stats.failed += 1,
            }
        }

        Ok(stats)
    }
}
