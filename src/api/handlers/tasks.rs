//! Task endpoints

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::api::middleware::RequestActor;
use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::infrastructure::services::{TaskCompletionResult, TaskView};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub deal_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskView>,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteTaskApiRequest {
    pub task_id: String,
    #[serde(default)]
    pub payload: Value,
}

/// GET /api/tasks?deal_id=
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<ListTasksResponse>, ApiError> {
    let tasks = state
        .task_service
        .list_tasks(query.deal_id.as_deref())
        .await?;
    let total = tasks.len();

    Ok(Json(ListTasksResponse { tasks, total }))
}

/// GET /api/tasks/{task_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    Ok(Json(state.task_service.get_task(&task_id).await?))
}

/// POST /api/tasks/{task_id}/claim
pub async fn claim_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    RequestActor(actor): RequestActor,
) -> Result<Json<TaskView>, ApiError> {
    debug!(task_id = %task_id, actor_id = ?actor.user_id, "Claiming task");

    Ok(Json(state.task_service.claim(&task_id, &actor).await?))
}

/// POST /api/tasks/complete
pub async fn complete_task(
    State(state): State<AppState>,
    RequestActor(actor): RequestActor,
    Json(request): Json<CompleteTaskApiRequest>,
) -> Result<Json<TaskCompletionResult>, ApiError> {
    debug!(task_id = %request.task_id, actor_id = ?actor.user_id, "Completing task");

    let result = state
        .task_service
        .complete(&request.task_id, request.payload, &actor)
        .await?;

    Ok(Json(result))
}
