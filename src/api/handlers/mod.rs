//! Workflow HTTP endpoints, mounted under `/api`

pub mod deals;
pub mod queues;
pub mod tasks;
pub mod versions;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

pub fn create_api_router() -> Router<AppState> {
    Router::new()
        // Deals
        .route("/deals", post(deals::create_deal).get(deals::list_deals))
        .route("/deals/{deal_id}", get(deals::get_deal))
        .route("/deals/{deal_id}/transition", post(deals::transition_deal))
        .route("/deals/{deal_id}/replay", post(deals::replay_entry_actions))
        .route("/deals/{deal_id}/audit", get(deals::list_audit))
        // Tasks
        .route("/tasks", get(tasks::list_tasks))
        .route("/tasks/complete", post(tasks::complete_task))
        .route("/tasks/{task_id}", get(tasks::get_task))
        .route("/tasks/{task_id}/claim", post(tasks::claim_task))
        // Queues
        .route("/workflow/queues/run", post(queues::run_queues))
        .route("/workflow/queues/stats", get(queues::queue_stats))
        // Definition versions
        .route(
            "/workflow/{workflow_id}/versions",
            get(versions::list_versions).post(versions::create_version),
        )
        .route("/workflow/{workflow_id}/active", get(versions::active_version))
        .route(
            "/workflow/versions/{version_id}/activate",
            post(versions::activate_version),
        )
        // Inbound integrations
        .route("/webhooks/esign", post(webhooks::esign))
        .route("/webhooks/bank", post(webhooks::bank))
        .route("/webhooks/aecb", post(webhooks::aecb))
}
