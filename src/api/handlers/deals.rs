//! Deal endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::api::middleware::RequestActor;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::audit::AuditEntry;
use crate::domain::deal::Deal;
use crate::infrastructure::services::{
    CreateDealRequest, CreatedDeal, EntryActionReport, TransitionOutcome,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateDealApiRequest {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDealsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListDealsResponse {
    pub deals: Vec<Deal>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitionApiRequest {
    /// Omit to take the first transition whose guards pass
    #[serde(default)]
    pub target_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditResponse {
    pub entries: Vec<AuditEntry>,
}

/// POST /api/deals
pub async fn create_deal(
    State(state): State<AppState>,
    Json(request): Json<CreateDealApiRequest>,
) -> Result<(StatusCode, Json<CreatedDeal>), ApiError> {
    debug!(workflow_id = ?request.workflow_id, "Creating deal");

    let created = state
        .deal_service
        .create_deal(CreateDealRequest {
            workflow_id: request.workflow_id,
            payload: request.payload,
            customer_id: request.customer_id,
            asset_id: request.asset_id,
            source: request.source,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/deals
pub async fn list_deals(
    State(state): State<AppState>,
    Query(query): Query<ListDealsQuery>,
) -> Result<Json<ListDealsResponse>, ApiError> {
    let deals = state.deal_service.list_deals(query.status).await?;
    let total = deals.len();

    Ok(Json(ListDealsResponse { deals, total }))
}

/// GET /api/deals/{deal_id}
pub async fn get_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> Result<Json<Deal>, ApiError> {
    Ok(Json(state.deal_service.get_deal(&deal_id).await?))
}

/// POST /api/deals/{deal_id}/transition
pub async fn transition_deal(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
    RequestActor(actor): RequestActor,
    Json(request): Json<TransitionApiRequest>,
) -> Result<Json<TransitionOutcome>, ApiError> {
    debug!(deal_id = %deal_id, target = ?request.target_status, "Transition requested");

    let outcome = state
        .transition_engine
        .attempt_transition(&deal_id, request.target_status.as_deref(), &actor)
        .await?;

    Ok(Json(outcome))
}

/// POST /api/deals/{deal_id}/replay
pub async fn replay_entry_actions(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> Result<Json<EntryActionReport>, ApiError> {
    Ok(Json(
        state.transition_engine.replay_entry_actions(&deal_id).await?,
    ))
}

/// GET /api/deals/{deal_id}/audit
pub async fn list_audit(
    State(state): State<AppState>,
    Path(deal_id): Path<String>,
) -> Result<Json<AuditResponse>, ApiError> {
    // 404 for unknown deals rather than an empty log
    state.deal_service.get_deal(&deal_id).await?;
    let entries = state.transition_engine.list_audit(&deal_id).await?;

    Ok(Json(AuditResponse { entries }))
}
