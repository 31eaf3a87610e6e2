//! Workflow version endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::RequestActor;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::definition::DefinitionFormat;
use crate::domain::version::WorkflowVersion;
use crate::infrastructure::services::{CreateVersionRequest, PublishedVersion};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVersionApiRequest {
    pub source: String,
    #[serde(default)]
    pub format: Option<DefinitionFormat>,
    #[serde(default)]
    pub activate: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Version listing entry, without the source and parsed definition
#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
    pub id: String,
    pub workflow_id: String,
    pub version: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub format: DefinitionFormat,
    pub checksum: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl From<&WorkflowVersion> for VersionSummary {
    fn from(version: &WorkflowVersion) -> Self {
        Self {
            id: version.id.clone(),
            workflow_id: version.workflow_id.clone(),
            version: version.version,
            title: version.title.clone(),
            description: version.description.clone(),
            format: version.format,
            checksum: version.checksum.clone(),
            is_active: version.is_active,
            created_at: version.created_at,
            created_by: version.created_by.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListVersionsResponse {
    pub versions: Vec<VersionSummary>,
    pub total: usize,
}

/// GET /api/workflow/{workflow_id}/versions
pub async fn list_versions(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<ListVersionsResponse>, ApiError> {
    let versions: Vec<VersionSummary> = state
        .version_service
        .list_versions(&workflow_id)
        .await?
        .iter()
        .map(VersionSummary::from)
        .collect();
    let total = versions.len();

    Ok(Json(ListVersionsResponse { versions, total }))
}

/// POST /api/workflow/{workflow_id}/versions
pub async fn create_version(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    RequestActor(actor): RequestActor,
    Json(request): Json<CreateVersionApiRequest>,
) -> Result<(StatusCode, Json<PublishedVersion>), ApiError> {
    debug!(workflow_id = %workflow_id, activate = request.activate, "Publishing workflow version");

    let published = state
        .version_service
        .create_version(CreateVersionRequest {
            source: request.source,
            format: request.format.unwrap_or_default(),
            activate: request.activate,
            title: request.title,
            description: request.description,
            created_by: actor.user_id,
            workflow_id: Some(workflow_id),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(published)))
}

/// POST /api/workflow/versions/{version_id}/activate
pub async fn activate_version(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<Json<VersionSummary>, ApiError> {
    let version = state.version_service.activate(&version_id).await?;
    Ok(Json(VersionSummary::from(&version)))
}

/// GET /api/workflow/{workflow_id}/active
pub async fn active_version(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<WorkflowVersion>, ApiError> {
    let version = state
        .version_service
        .get_active_version(&workflow_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("Workflow '{}' has no active version", workflow_id))
        })?;

    Ok(Json(version))
}
