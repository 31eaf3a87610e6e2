//! Leaseflow
//!
//! Versioned workflow orchestration for lease deals:
//! - Declarative stage/transition definitions with immutable, pinned versions
//! - Guarded transitions with conditional status writes and an audit trail
//! - Stage entry actions producing deduplicated tasks and queued side effects
//! - Durable notification, webhook and schedule queues drained on demand

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use api::state::AppState;
use infrastructure::services::WorkflowServices;
use infrastructure::sinks::build_sinks;
use infrastructure::storage::StorageFactory;
use tracing::info;

/// Builds storage, sinks and every workflow service from configuration
pub async fn create_services(config: &AppConfig) -> anyhow::Result<WorkflowServices> {
    let storage = config.storage.to_storage_config();
    info!(backend = ?storage.storage_type(), "Initializing storage");

    let repositories = StorageFactory::create(&storage).await?;
    let sinks = build_sinks(&config.sinks)?;

    Ok(WorkflowServices::build(&repositories, sinks, config))
}

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration.
/// The default workflow is bootstrapped here so a broken definition stops
/// startup instead of failing the first request.
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let services = create_services(config).await?;

    let active = services
        .versions
        .ensure_active_version(&config.workflow.default_workflow_id)
        .await?;
    info!(
        workflow_id = %active.workflow_id,
        version = active.version,
        "Active workflow version"
    );

    Ok(AppState::new(
        &services,
        config.workflow.default_workflow_id.clone(),
    ))
}
