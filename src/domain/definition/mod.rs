//! Workflow definitions: model, parsing and lint

mod entity;
mod lint;
mod parser;

pub use entity::{
    Action, Escalation, EventRoute, JobSpec, RoleDefinition, Stage, StageSla, StageWebhooks,
    TaskSla, TaskTemplate, Transition, WorkflowDefinition, WorkflowMeta,
};
pub use lint::{lint_definition, DefinitionWarning, AMBIGUOUS_TRANSITIONS};
pub use parser::{parse_definition, validate_definition, DefinitionFormat, MAX_WORKFLOW_ID_LENGTH};
