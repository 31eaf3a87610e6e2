//! Inbound integration callbacks. All answer 204 once the event is recorded,
//! whether or not the deal moved.

use axum::{extract::State, http::StatusCode};

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::infrastructure::services::{AecbEvent, BankEvent, EsignEvent};

/// POST /api/webhooks/esign
pub async fn esign(
    State(state): State<AppState>,
    Json(event): Json<EsignEvent>,
) -> Result<StatusCode, ApiError> {
    state.event_service.handle_esign(event).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/webhooks/bank
pub async fn bank(
    State(state): State<AppState>,
    Json(event): Json<BankEvent>,
) -> Result<StatusCode, ApiError> {
    state.event_service.handle_bank(event).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/webhooks/aecb
pub async fn aecb(
    State(state): State<AppState>,
    Json(event): Json<AecbEvent>,
) -> Result<StatusCode, ApiError> {
    state.event_service.handle_aecb(event).await?;
    Ok(StatusCode::NO_CONTENT)
}
