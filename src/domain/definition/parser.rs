//! Definition source parsing and structural validation

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::entity::{Action, WorkflowDefinition};
use crate::domain::DomainError;

/// Maximum length for workflow IDs
pub const MAX_WORKFLOW_ID_LENGTH: usize = 64;

/// Workflow IDs: alphanumerics, hyphens and underscores
static WORKFLOW_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap());

/// Stage keys: upper snake case
static STAGE_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").unwrap());

/// Serialization format of a definition source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionFormat {
    #[default]
    Yaml,
    Toml,
    Json,
}

impl DefinitionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    /// Guesses the format from a file extension, defaulting to YAML
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();

        if lower.ends_with(".toml") {
            Self::Toml
        } else if lower.ends_with(".json") {
            Self::Json
        } else {
            Self::Yaml
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for DefinitionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parses and validates a definition source
pub fn parse_definition(
    source: &str,
    format: DefinitionFormat,
) -> Result<WorkflowDefinition, DomainError> {
    let mut definition: WorkflowDefinition = match format {
        DefinitionFormat::Yaml => serde_yaml::from_str(source)
            .map_err(|e| DomainError::validation(format!("Invalid workflow YAML: {}", e)))?,
        DefinitionFormat::Toml => toml::from_str(source)
            .map_err(|e| DomainError::validation(format!("Invalid workflow TOML: {}", e)))?,
        DefinitionFormat::Json => serde_json::from_str(source)
            .map_err(|e| DomainError::validation(format!("Invalid workflow JSON: {}", e)))?,
    };

    for (key, stage) in definition.stages.iter_mut() {
        stage.key = key.clone();

        if stage.title.is_empty() {
            stage.title = key.clone();
        }
    }

    validate_definition(&definition)?;

    Ok(definition)
}

/// Checks cross references inside a definition. All problems are collected
/// into a single validation error.
pub fn validate_definition(definition: &WorkflowDefinition) -> Result<(), DomainError> {
    let mut errors = Vec::new();

    let id = definition.id();
    if id.is_empty() {
        errors.push("workflow.id is required".to_string());
    } else if id.len() > MAX_WORKFLOW_ID_LENGTH {
        errors.push(format!(
            "workflow.id too long: {} characters (max {})",
            id.len(),
            MAX_WORKFLOW_ID_LENGTH
        ));
    } else if !WORKFLOW_ID_PATTERN.is_match(id) {
        errors.push(format!("workflow.id '{}' has invalid format", id));
    }

    if definition.stages.is_empty() {
        errors.push("at least one stage is required".to_string());
    }

    if definition.kanban_order.is_empty() {
        errors.push("kanban_order must list at least one stage".to_string());
    }

    for key in definition.stages.keys() {
        if !STAGE_KEY_PATTERN.is_match(key) {
            errors.push(format!("stage key '{}' must be upper snake case", key));
        }
    }

    for key in &definition.kanban_order {
        if !definition.has_stage(key) {
            errors.push(format!("kanban_order references unknown stage '{}'", key));
        }
    }

    for (index, transition) in definition.transitions.iter().enumerate() {
        if !definition.has_stage(&transition.from) {
            errors.push(format!(
                "transitions[{}] references unknown from stage '{}'",
                index, transition.from
            ));
        }

        if !definition.has_stage(&transition.to) {
            errors.push(format!(
                "transitions[{}] references unknown to stage '{}'",
                index, transition.to
            ));
        }

        for guard in &transition.guards {
            if guard.key.trim().is_empty() {
                errors.push(format!("transitions[{}] has a guard without key", index));
            }
        }
    }

    for (key, stage) in &definition.stages {
        for (index, action) in stage.entry_actions.iter().enumerate() {
            if let Some(problem) = action_problem(action) {
                errors.push(format!("{}.entry_actions[{}]: {}", key, index, problem));
            }
        }

        if let Some(sla) = &stage.sla {
            for (index, escalation) in sla.escalation.iter().enumerate() {
                if let Some(problem) = action_problem(&escalation.action) {
                    errors.push(format!("{}.sla.escalation[{}]: {}", key, index, problem));
                }
            }
        }

        for route in &stage.webhooks.on_event {
            if !definition.has_stage(&route.transition_to) {
                errors.push(format!(
                    "{}.webhooks.on_event '{}' targets unknown stage '{}'",
                    key, route.event, route.transition_to
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "Invalid workflow definition: {}",
            errors.join("; ")
        )))
    }
}

fn action_problem(action: &Action) -> Option<&'static str> {
    match action {
        Action::TaskCreate { task, .. } if task.task_type.trim().is_empty() => {
            Some("TASK_CREATE requires task.type")
        }
        Action::TaskCreate { task, .. } if task.sla.as_ref().is_some_and(|s| s.hours == 0) => {
            Some("task.sla.hours must be greater than 0")
        }
        Action::Notify { template, .. } | Action::Escalate { template, .. }
            if template.trim().is_empty() =>
        {
            Some("template is required")
        }
        Action::Webhook { endpoint, .. } if endpoint.trim().is_empty() => {
            Some("WEBHOOK requires endpoint")
        }
        Action::Schedule { job, .. } if job.job_type.trim().is_empty() => {
            Some("SCHEDULE requires job.type")
        }
        _ => None,
    }
}
