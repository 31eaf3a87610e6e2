//! Workflow version repository trait

use async_trait::async_trait;

use super::WorkflowVersion;
use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Outcome of an insert guarded by "no active version yet"
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapInsert {
    /// This call published and activated the version
    Inserted(WorkflowVersion),
    /// Another caller activated a version first
    AlreadyActive(WorkflowVersion),
}

/// Repository for workflow version persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkflowVersionRepository: Send + Sync {
    /// Finds a version by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<WorkflowVersion>, DomainError>;

    /// Finds the active version of a workflow
    async fn find_active(&self, workflow_id: &str) -> Result<Option<WorkflowVersion>, DomainError>;

    /// Lists versions of a workflow ordered by version number
    async fn list(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, DomainError>;

    /// Appends a version, assigning the next version number. When the
    /// version is active every other version of the workflow is deactivated
    /// in the same operation.
    async fn append(&self, version: WorkflowVersion) -> Result<WorkflowVersion, DomainError>;

    /// Activates one version and deactivates all others of its workflow
    async fn activate(&self, id: &str) -> Result<WorkflowVersion, DomainError>;

    /// Appends the version as active only if the workflow has no active
    /// version. A single conditional write, safe against concurrent callers.
    async fn insert_if_no_active(
        &self,
        version: WorkflowVersion,
    ) -> Result<BootstrapInsert, DomainError>;
}
