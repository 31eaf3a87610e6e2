//! Workflow version service: publishing, activation and bootstrap

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::definition::{
    lint_definition, parse_definition, DefinitionFormat, DefinitionWarning, WorkflowDefinition,
};
use crate::domain::error::DomainError;
use crate::domain::version::{BootstrapInsert, WorkflowVersion, WorkflowVersionRepository};

/// Definition shipped with the binary, used when no active version exists
pub const BUNDLED_DEFINITION: &str = include_str!("../../../workflows/fast-lease-v1.yaml");

/// Where the bootstrap definition is read from
#[derive(Debug, Clone, Default)]
pub enum BootstrapSource {
    #[default]
    Bundled,
    File(PathBuf),
}

impl BootstrapSource {
    pub fn from_path(path: Option<&str>) -> Self {
        match path {
            Some(path) if !path.trim().is_empty() => Self::File(PathBuf::from(path)),
            _ => Self::Bundled,
        }
    }

    async fn load(&self) -> Result<(String, DefinitionFormat), DomainError> {
        match self {
            Self::Bundled => Ok((BUNDLED_DEFINITION.to_string(), DefinitionFormat::Yaml)),
            Self::File(path) => {
                let source = tokio::fs::read_to_string(path).await.map_err(|e| {
                    DomainError::configuration(format!(
                        "Failed to read workflow definition '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
                let format = DefinitionFormat::from_path(&path.to_string_lossy());
                Ok((source, format))
            }
        }
    }
}

/// Request to publish a new version
#[derive(Debug, Clone, Default)]
pub struct CreateVersionRequest {
    pub source: String,
    pub format: DefinitionFormat,
    pub activate: bool,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    /// When set, the definition's own id must match
    pub workflow_id: Option<String>,
}

/// A freshly published version plus any lint findings
#[derive(Debug, Clone, Serialize)]
pub struct PublishedVersion {
    pub version: WorkflowVersion,
    pub warnings: Vec<DefinitionWarning>,
}

/// Trait for workflow version operations (for dynamic dispatch in AppState)
#[async_trait]
pub trait WorkflowVersionServiceTrait: Send + Sync {
    /// Parses, validates and appends a version, optionally activating it
    async fn create_version(
        &self,
        request: CreateVersionRequest,
    ) -> Result<PublishedVersion, DomainError>;

    /// Makes a version the only active one of its workflow
    async fn activate(&self, version_id: &str) -> Result<WorkflowVersion, DomainError>;

    /// Versions of a workflow, oldest first
    async fn list_versions(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, DomainError>;

    async fn get_version(&self, version_id: &str) -> Result<WorkflowVersion, DomainError>;

    async fn get_active_version(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowVersion>, DomainError>;

    /// Returns the active version, bootstrapping one from the configured
    /// definition when there is none
    async fn ensure_active_version(&self, workflow_id: &str)
        -> Result<WorkflowVersion, DomainError>;

    /// Parsed definition of a version
    async fn definition(&self, version_id: &str) -> Result<Arc<WorkflowDefinition>, DomainError>;
}

pub struct WorkflowVersionService {
    repository: Arc<dyn WorkflowVersionRepository>,
    bootstrap: BootstrapSource,
    // Keyed by version id. Versions never change after publishing, only
    // their active flag does, and that is not cached.
    definitions: Cache<String, Arc<WorkflowDefinition>>,
}

impl std::fmt::Debug for WorkflowVersionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowVersionService")
            .field("bootstrap", &self.bootstrap)
            .field("cached_definitions", &self.definitions.entry_count())
            .finish()
    }
}

impl WorkflowVersionService {
    pub fn new(repository: Arc<dyn WorkflowVersionRepository>) -> Self {
        Self::with_bootstrap(repository, BootstrapSource::Bundled)
    }

    pub fn with_bootstrap(
        repository: Arc<dyn WorkflowVersionRepository>,
        bootstrap: BootstrapSource,
    ) -> Self {
        Self {
            repository,
            bootstrap,
            definitions: Cache::builder().max_capacity(256).build(),
        }
    }

    async fn bootstrap_version(&self, workflow_id: &str) -> Result<WorkflowVersion, DomainError> {
        let (source, format) = self.bootstrap.load().await?;
        let definition = parse_definition(&source, format).map_err(|e| {
            DomainError::configuration(format!("Bootstrap definition is invalid: {}", e))
        })?;

        if definition.id() != workflow_id {
            return Err(DomainError::configuration(format!(
                "No active version of workflow '{}' and the bootstrap definition is for '{}'",
                workflow_id,
                definition.id()
            )));
        }

        let candidate = WorkflowVersion::new(definition, source, format, 0)
            .with_created_by("bootstrap")
            .activated(true);

        match self.repository.insert_if_no_active(candidate).await? {
            BootstrapInsert::Inserted(version) => {
                info!(
                    workflow_id = %workflow_id,
                    version = version.version,
                    version_id = %version.id,
                    "Bootstrapped workflow from bundled definition"
                );
                Ok(version)
            }
            BootstrapInsert::AlreadyActive(version) => {
                debug!(
                    workflow_id = %workflow_id,
                    version_id = %version.id,
                    "Concurrent bootstrap won, using its version"
                );
                Ok(version)
            }
        }
    }
}

#[async_trait]
impl WorkflowVersionServiceTrait for WorkflowVersionService {
    #[instrument(skip(self, request), fields(format = %request.format, activate = request.activate))]
    async fn create_version(
        &self,
        request: CreateVersionRequest,
    ) -> Result<PublishedVersion, DomainError> {
        let definition = parse_definition(&request.source, request.format)?;

        if let Some(expected) = &request.workflow_id {
            if expected != definition.id() {
                return Err(DomainError::validation(format!(
                    "Definition id '{}' does not match workflow '{}'",
                    definition.id(),
                    expected
                )));
            }
        }

        let warnings = lint_definition(&definition);
        for warning in &warnings {
            warn!(workflow_id = %definition.id(), code = warning.code, "{}", warning.message);
        }

        let mut version = WorkflowVersion::new(definition, request.source, request.format, 0)
            .activated(request.activate);
        if let Some(title) = request.title {
            version = version.with_title(title);
        }
        if let Some(description) = request.description {
            version = version.with_description(description);
        }
        if let Some(created_by) = request.created_by {
            version = version.with_created_by(created_by);
        }

        let version = self.repository.append(version).await?;
        info!(
            workflow_id = %version.workflow_id,
            version = version.version,
            active = version.is_active,
            "Published workflow version"
        );

        Ok(PublishedVersion { version, warnings })
    }

    #[instrument(skip(self))]
    async fn activate(&self, version_id: &str) -> Result<WorkflowVersion, DomainError> {
        let version = self.repository.activate(version_id).await?;
        info!(
            workflow_id = %version.workflow_id,
            version = version.version,
            "Activated workflow version"
        );
        Ok(version)
    }

    async fn list_versions(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, DomainError> {
        self.repository.list(workflow_id).await
    }

    async fn get_version(&self, version_id: &str) -> Result<WorkflowVersion, DomainError> {
        self.repository
            .find_by_id(version_id)
            .await?
            .ok_or_else(|| {
                DomainError::not_found(format!("Workflow version '{}' not found", version_id))
            })
    }

    async fn get_active_version(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowVersion>, DomainError> {
        self.repository.find_active(workflow_id).await
    }

    #[instrument(skip(self))]
    async fn ensure_active_version(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowVersion, DomainError> {
        if let Some(active) = self.repository.find_active(workflow_id).await? {
            return Ok(active);
        }

        self.bootstrap_version(workflow_id).await.map_err(|e| {
            error!(workflow_id = %workflow_id, error = %e, "No workflow version could be resolved");
            match e {
                DomainError::Configuration { .. } => e,
                other => DomainError::configuration(format!(
                    "Failed to bootstrap workflow '{}': {}",
                    workflow_id, other
                )),
            }
        })
    }

    async fn definition(&self, version_id: &str) -> Result<Arc<WorkflowDefinition>, DomainError> {
        if let Some(cached) = self.definitions.get(version_id).await {
            return Ok(cached);
        }

        let version = self.get_version(version_id).await?;
        let definition = Arc::new(version.definition);
        self.definitions
            .insert(version_id.to_string(), definition.clone())
            .await;

        Ok(definition)
    }
}
