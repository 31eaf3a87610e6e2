//! In-memory audit repository

use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::audit::{AuditEntry, AuditRepository};
use crate::domain::DomainError;

/// In-memory implementation of AuditRepository
#[derive(Default)]
pub struct InMemoryAuditRepository {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError> {
        self.entries
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?
            .push(entry);

        Ok(())
    }

    async fn list_by_deal(&self, deal_id: &str) -> Result<Vec<AuditEntry>, DomainError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(entries.iter().filter(|e| e.deal_id == deal_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_entries_are_listed_per_deal_in_order() {
        let repo = InMemoryAuditRepository::new();
        repo.record(AuditEntry::new("deal-1", "NEW", "OFFER_PREP")).await.unwrap();
        repo.record(AuditEntry::new("deal-2", "NEW", "CANCELLED")).await.unwrap();
        repo.record(AuditEntry::new("deal-1", "OFFER_PREP", "VEHICLE_CHECK").with_reason("ok"))
            .await
            .unwrap();

        let entries = repo.list_by_deal("deal-1").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].to_status, "OFFER_PREP");
        assert_eq!(entries[1].reason.as_deref(), Some("ok"));
    }
}
