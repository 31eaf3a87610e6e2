//! Deal repository trait

use async_trait::async_trait;
use serde_json::Value;

use super::Deal;
use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Repository for deal persistence. Writes are conditional: status changes
/// compare against the expected current status, payload changes against
/// the expected revision.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DealRepository: Send + Sync {
    /// Creates a new deal
    async fn create(&self, deal: Deal) -> Result<Deal, DomainError>;

    /// Finds a deal by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Deal>, DomainError>;

    /// Lists deals, optionally filtered by status
    async fn list(&self, status: Option<String>) -> Result<Vec<Deal>, DomainError>;

    /// Moves the deal to `new_status` only if it is still in
    /// `expected_status`. Conflict when another writer moved it first.
    async fn update_status(
        &self,
        id: &str,
        expected_status: &str,
        new_status: &str,
    ) -> Result<Deal, DomainError>;

    /// Replaces the stored payload only if the revision still matches.
    /// Conflict on a concurrent modification.
    async fn update_payload(
        &self,
        id: &str,
        expected_revision: u64,
        payload: Value,
    ) -> Result<Deal, DomainError>;
}
