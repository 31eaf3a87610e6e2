//! Queue endpoints. Draining is triggered externally (cron or operator).

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, Json};
use crate::domain::queue::QueueStats;
use crate::infrastructure::services::DrainReport;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunQueuesQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunQueuesResponse {
    pub reports: Vec<DrainReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatsResponse {
    pub sinks: Vec<QueueStats>,
}

/// POST /api/workflow/queues/run
pub async fn run_queues(
    State(state): State<AppState>,
    Query(query): Query<RunQueuesQuery>,
) -> Result<Json<RunQueuesResponse>, ApiError> {
    let reports = state.queue_dispatcher.drain_all(query.limit).await?;

    let processed: u64 = reports.iter().map(|r| r.processed).sum();
    info!(processed, "Queue drain triggered over HTTP");

    Ok(Json(RunQueuesResponse { reports }))
}

/// GET /api/workflow/queues/stats
pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueStatsResponse>, ApiError> {
    Ok(Json(QueueStatsResponse {
        sinks: state.queue_dispatcher.stats().await?,
    }))
}
