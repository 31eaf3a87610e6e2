//! In-memory service graph shared by service tests

use serde_json::Value;

use super::WorkflowServices;
use crate::config::AppConfig;
use crate::domain::deal::{Deal, DealRepository};
use crate::infrastructure::storage::Repositories;

pub(crate) struct Engine {
    pub repos: Repositories,
    pub services: WorkflowServices,
}

/// Services over fresh in-memory repositories, bundled definition, no sinks
pub(crate) fn engine() -> Engine {
    let repos = Repositories::in_memory();
    let services = WorkflowServices::build(&repos, Vec::new(), &AppConfig::default());
    Engine { repos, services }
}

/// Stores a deal already sitting at `status`, without running entry actions
pub(crate) async fn deal_at(e: &Engine, status: &str, payload: Value) -> Deal {
    let version = e
        .services
        .versions
        .ensure_active_version("fast-lease-v1")
        .await
        .unwrap();

    let deal = Deal::new("fast-lease-v1", &version.id, status).with_payload(payload);
    e.repos.deals.create(deal).await.unwrap()
}
