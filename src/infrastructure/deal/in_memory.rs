//! In-memory deal repository

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::deal::{Deal, DealRepository};
use crate::domain::DomainError;

/// In-memory implementation of DealRepository
pub struct InMemoryDealRepository {
    deals: RwLock<HashMap<String, Deal>>,
}

impl InMemoryDealRepository {
    /// Creates a new empty repository
    pub fn new() -> Self {
        Self {
            deals: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDealRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DealRepository for InMemoryDealRepository {
    async fn create(&self, deal: Deal) -> Result<Deal, DomainError> {
        let mut deals = self
            .deals
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        if deals.contains_key(&deal.id) {
            return Err(DomainError::conflict(format!(
                "Deal with ID '{}' already exists",
                deal.id
            )));
        }

        deals.insert(deal.id.clone(), deal.clone());
        Ok(deal)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Deal>, DomainError> {
        let deals = self
            .deals
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(deals.get(id).cloned())
    }

    async fn list(&self, status: Option<String>) -> Result<Vec<Deal>, DomainError> {
        let deals = self
            .deals
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut result: Vec<_> = deals
            .values()
            .filter(|d| status.as_ref().is_none_or(|s| &d.status == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(result)
    }

    async fn update_status(
        &self,
        id: &str,
        expected_status: &str,
        new_status: &str,
    ) -> Result<Deal, DomainError> {
        let mut deals = self
            .deals
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let deal = deals
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("Deal '{}' not found", id)))?;

        if deal.status != expected_status {
            return Err(DomainError::conflict(format!(
                "Deal '{}' is in '{}', expected '{}'",
                id, deal.status, expected_status
            )));
        }

        deal.status = new_status.to_string();
        deal.revision += 1;
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }

    async fn update_payload(
        &self,
        id: &str,
        expected_revision: u64,
        payload: Value,
    ) -> Result<Deal, DomainError> {
        let mut deals = self
            .deals
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let deal = deals
            .get_mut(id)
            .ok_or_else(|| DomainError::not_found(format!("Deal '{}' not found", id)))?;

        if deal.revision != expected_revision {
            return Err(DomainError::conflict(format!(
                "Deal '{}' was modified concurrently",
                id
            )));
        }

        deal.payload = payload;
        deal.revision += 1;
        deal.updated_at = Utc::now();
        Ok(deal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deal::deal_repository_tests as contract;

    #[tokio::test]
    async fn test_status_update_is_conditional() {
        contract::assert_status_update_is_conditional(&InMemoryDealRepository::new()).await;
    }

    #[tokio::test]
    async fn test_payload_update_checks_revision() {
        contract::assert_payload_update_checks_revision(&InMemoryDealRepository::new()).await;
    }

    #[tokio::test]
    async fn test_missing_deal_is_not_found() {
        contract::assert_missing_deal_is_not_found(&InMemoryDealRepository::new()).await;
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        contract::assert_list_filters_by_status(&InMemoryDealRepository::new()).await;
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts() {
        let repo = InMemoryDealRepository::new();
        repo.create(Deal::new("wf", "v1", "NEW").with_id("deal-1"))
            .await
            .unwrap();

        let err = repo
            .create(Deal::new("wf", "v1", "NEW").with_id("deal-1"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
