//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::services::{
    DealServiceTrait, InboundEventServiceTrait, QueueDispatcherTrait, TaskServiceTrait,
    TransitionEngineTrait, WorkflowServices, WorkflowVersionServiceTrait,
};

/// Application state containing shared services using dynamic dispatch
#[derive(Clone)]
pub struct AppState {
    pub version_service: Arc<dyn WorkflowVersionServiceTrait>,
    pub deal_service: Arc<dyn DealServiceTrait>,
    pub transition_engine: Arc<dyn TransitionEngineTrait>,
    pub task_service: Arc<dyn TaskServiceTrait>,
    pub queue_dispatcher: Arc<dyn QueueDispatcherTrait>,
    pub event_service: Arc<dyn InboundEventServiceTrait>,
    pub default_workflow_id: String,
}

impl AppState {
    pub fn new(services: &WorkflowServices, default_workflow_id: impl Into<String>) -> Self {
        Self {
            version_service: services.versions.clone(),
            deal_service: services.deals.clone(),
            transition_engine: services.transitions.clone(),
            task_service: services.tasks.clone(),
            queue_dispatcher: services.dispatcher.clone(),
            event_service: services.events.clone(),
            default_workflow_id: default_workflow_id.into(),
        }
    }
}
