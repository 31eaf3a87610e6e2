//! Deal service

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use super::entry_actions::{EntryActionExecutor, EntryActionReport};
use super::version_service::WorkflowVersionServiceTrait;
use crate::domain::deal::{Deal, DealRepository};
use crate::domain::error::DomainError;
use crate::domain::guard::merged;

/// Attempts for a payload merge racing other writers
const MERGE_ATTEMPTS: usize = 5;

/// Request to open a deal
#[derive(Debug, Clone, Default)]
pub struct CreateDealRequest {
    pub workflow_id: Option<String>,
    pub payload: Option<Value>,
    pub customer_id: Option<String>,
    pub asset_id: Option<String>,
    pub source: Option<String>,
}

/// A new deal with the result of its initial stage's entry actions
#[derive(Debug, Clone, Serialize)]
pub struct CreatedDeal {
    pub deal: Deal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_actions: Option<EntryActionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_action_error: Option<String>,
}

/// Trait for deal operations (for dynamic dispatch in AppState)
#[async_trait]
pub trait DealServiceTrait: Send + Sync {
    async fn create_deal(&self, request: CreateDealRequest) -> Result<CreatedDeal, DomainError>;

    async fn get_deal(&self, deal_id: &str) -> Result<Deal, DomainError>;

    async fn list_deals(&self, status: Option<String>) -> Result<Vec<Deal>, DomainError>;

    /// Deep-merges `patch` into the deal payload, retrying when another
    /// writer got in first
    async fn merge_payload(&self, deal_id: &str, patch: Value) -> Result<Deal, DomainError>;
}

pub struct DealService {
    deals: Arc<dyn DealRepository>,
    versions: Arc<dyn WorkflowVersionServiceTrait>,
    entry_actions: Arc<EntryActionExecutor>,
    default_workflow_id: String,
}

impl DealService {
    pub fn new(
        deals: Arc<dyn DealRepository>,
        versions: Arc<dyn WorkflowVersionServiceTrait>,
        entry_actions: Arc<EntryActionExecutor>,
        default_workflow_id: impl Into<String>,
    ) -> Self {
        Self {
            deals,
            versions,
            entry_actions,
            default_workflow_id: default_workflow_id.into(),
        }
    }
}

#[async_trait]
impl DealServiceTrait for DealService {
    #[instrument(skip(self, request), fields(workflow_id = tracing::field::Empty))]
    async fn create_deal(&self, request: CreateDealRequest) -> Result<CreatedDeal, DomainError> {
        let workflow_id = request
            .workflow_id
            .unwrap_or_else(|| self.default_workflow_id.clone());
        tracing::Span::current().record("workflow_id", workflow_id.as_str());

        if let Some(payload) = &request.payload {
            if !payload.is_object() {
                return Err(DomainError::validation("Deal payload must be a JSON object"));
            }
        }

        let version = self.versions.ensure_active_version(&workflow_id).await?;
        let definition = self.versions.definition(&version.id).await?;
        let initial = definition.kanban_order.first().ok_or_else(|| {
            DomainError::configuration(format!("Workflow '{}' has no initial stage", workflow_id))
        })?;

        let mut deal = Deal::new(&workflow_id, &version.id, initial);
        if let Some(payload) = request.payload {
            deal = deal.with_payload(payload);
        }
        if let Some(customer_id) = request.customer_id {
            deal = deal.with_customer(customer_id);
        }
        if let Some(asset_id) = request.asset_id {
            deal = deal.with_asset(asset_id);
        }
        if let Some(source) = request.source {
            deal = deal.with_source(source);
        }

        let deal = self.deals.create(deal).await?;
        info!(
            deal_id = %deal.id,
            version = version.version,
            status = %deal.status,
            "Deal created"
        );

        let (entry_actions, entry_action_error) =
            match self.entry_actions.run(&deal, &definition).await {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    error!(deal_id = %deal.id, error = %e, "Initial entry actions failed");
                    (None, Some(e.to_string()))
                }
            };

        Ok(CreatedDeal {
            deal,
            entry_actions,
            entry_action_error,
        })
    }

    async fn get_deal(&self, deal_id: &str) -> Result<Deal, DomainError> {
        self.deals
            .find_by_id(deal_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Deal '{}' not found", deal_id)))
    }

    async fn list_deals(&self, status: Option<String>) -> Result<Vec<Deal>, DomainError> {
        self.deals.list(status).await
    }

    #[instrument(skip(self, patch))]
    async fn merge_payload(&self, deal_id: &str, patch: Value) -> Result<Deal, DomainError> {
        if !patch.is_object() {
            return Err(DomainError::validation("Payload patch must be a JSON object"));
        }

        for attempt in 1..=MERGE_ATTEMPTS {
            let deal = self.get_deal(deal_id).await?;
            let payload = merged(&deal.payload, &patch);

            match self
                .deals
                .update_payload(deal_id, deal.revision, payload)
                .await
            {
                Ok(updated) => return Ok(updated),
                Err(e) if e.is_conflict() => {
                    debug!(deal_id = %deal_id, attempt, "Deal modified concurrently, retrying merge");
                }
                Err(e) => return Err(e),
            }
        }

        Err(DomainError::conflict(format!(
            "Deal '{}' kept changing, payload merge gave up after {} attempts",
            deal_id, MERGE_ATTEMPTS
        )))
    }
}
