//! Infrastructure services

mod deal_service;
mod entry_actions;
mod inbound_event_service;
mod queue_dispatcher;
mod task_service;
mod transition_engine;
mod version_service;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use chrono::Duration;

use crate::config::AppConfig;
use crate::domain::queue::QueueSink;
use crate::infrastructure::storage::Repositories;

pub use deal_service::{CreateDealRequest, CreatedDeal, DealService, DealServiceTrait};
pub use entry_actions::{EntryActionExecutor, EntryActionReport, SkippedAction};
pub use inbound_event_service::{
    AecbEvent, BankEvent, EsignEvent, EsignStatus, InboundEventService, InboundEventServiceTrait,
    InboundOutcome, PaymentKind, PaymentStatus,
};
pub use queue_dispatcher::{
    DrainReport, QueueDispatcher, QueueDispatcherConfig, QueueDispatcherTrait,
};
pub use task_service::{
    TaskCompletionResult, TaskService, TaskServiceTrait, TaskView, WorkflowTransitionReport,
};
pub use transition_engine::{TransitionEngine, TransitionEngineTrait, TransitionOutcome};
pub use version_service::{
    BootstrapSource, CreateVersionRequest, PublishedVersion, WorkflowVersionService,
    WorkflowVersionServiceTrait, BUNDLED_DEFINITION,
};

/// Every workflow service, wired over one set of repositories
#[derive(Clone)]
pub struct WorkflowServices {
    pub versions: Arc<dyn WorkflowVersionServiceTrait>,
    pub dispatcher: Arc<dyn QueueDispatcherTrait>,
    pub entry_actions: Arc<EntryActionExecutor>,
    pub transitions: Arc<dyn TransitionEngineTrait>,
    pub deals: Arc<dyn DealServiceTrait>,
    pub tasks: Arc<dyn TaskServiceTrait>,
    pub events: Arc<dyn InboundEventServiceTrait>,
}

impl std::fmt::Debug for WorkflowServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowServices").finish_non_exhaustive()
    }
}

impl WorkflowServices {
    pub fn build(repos: &Repositories, sinks: Vec<Arc<dyn QueueSink>>, config: &AppConfig) -> Self {
        let versions: Arc<dyn WorkflowVersionServiceTrait> =
            Arc::new(WorkflowVersionService::with_bootstrap(
                repos.versions.clone(),
                BootstrapSource::from_path(config.workflow.definition_path.as_deref()),
            ));

        let dispatcher: Arc<dyn QueueDispatcherTrait> = Arc::new(QueueDispatcher::new(
            repos.queue.clone(),
            sinks,
            QueueDispatcherConfig::from(&config.queue),
        ));

        let entry_actions = Arc::new(EntryActionExecutor::new(
            repos.tasks.clone(),
            dispatcher.clone(),
        ));

        let transitions: Arc<dyn TransitionEngineTrait> = Arc::new(TransitionEngine::new(
            repos.deals.clone(),
            repos.audit.clone(),
            versions.clone(),
            entry_actions.clone(),
        ));

        let deals: Arc<dyn DealServiceTrait> = Arc::new(DealService::new(
            repos.deals.clone(),
            versions.clone(),
            entry_actions.clone(),
            config.workflow.default_workflow_id.clone(),
        ));

        let tasks: Arc<dyn TaskServiceTrait> = Arc::new(TaskService::new(
            repos.tasks.clone(),
            deals.clone(),
            transitions.clone(),
            versions.clone(),
            Duration::hours(config.sla.warning_window_hours),
        ));

        let events: Arc<dyn InboundEventServiceTrait> = Arc::new(InboundEventService::new(
            deals.clone(),
            transitions.clone(),
            versions.clone(),
        ));

        Self {
            versions,
            dispatcher,
            entry_actions,
            transitions,
            deals,
            tasks,
            events,
        }
    }
}
