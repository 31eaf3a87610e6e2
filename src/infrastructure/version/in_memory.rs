//! In-memory workflow version repository

use async_trait::async_trait;
use std::sync::RwLock;

use crate::domain::version::{BootstrapInsert, WorkflowVersion, WorkflowVersionRepository};
use crate::domain::DomainError;

/// In-memory implementation of WorkflowVersionRepository. All versions sit
/// behind one lock so activation swaps are atomic.
pub struct InMemoryWorkflowVersionRepository {
    versions: RwLock<Vec<WorkflowVersion>>,
}

impl InMemoryWorkflowVersionRepository {
    /// Creates a new empty repository
    pub fn new() -> Self {
        Self {
            versions: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryWorkflowVersionRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn append_locked(versions: &mut Vec<WorkflowVersion>, mut version: WorkflowVersion) -> WorkflowVersion {
    version.version = versions
        .iter()
        .filter(|v| v.workflow_id == version.workflow_id)
        .map(|v| v.version)
        .max()
        .unwrap_or(0)
        + 1;

    if version.is_active {
        for existing in versions
            .iter_mut()
            .filter(|v| v.workflow_id == version.workflow_id)
        {
            existing.is_active = false;
        }
    }

    versions.push(version.clone());
    version
}

#[async_trait]
impl WorkflowVersionRepository for InMemoryWorkflowVersionRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<WorkflowVersion>, DomainError> {
        let versions = self
            .versions
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(versions.iter().find(|v| v.id == id).cloned())
    }

    async fn find_active(&self, workflow_id: &str) -> Result<Option<WorkflowVersion>, DomainError> {
        let versions = self
            .versions
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(versions
            .iter()
            .find(|v| v.workflow_id == workflow_id && v.is_active)
            .cloned())
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<WorkflowVersion>, DomainError> {
        let versions = self
            .versions
            .read()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let mut result: Vec<_> = versions
            .iter()
            .filter(|v| v.workflow_id == workflow_id)
            .cloned()
            .collect();
        result.sort_by_key(|v| v.version);
        Ok(result)
    }

    async fn append(&self, version: WorkflowVersion) -> Result<WorkflowVersion, DomainError> {
        let mut versions = self
            .versions
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        Ok(append_locked(&mut versions, version))
    }

    async fn activate(&self, id: &str) -> Result<WorkflowVersion, DomainError> {
        let mut versions = self
            .versions
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        let workflow_id = versions
            .iter()
            .find(|v| v.id == id)
            .map(|v| v.workflow_id.clone())
            .ok_or_else(|| DomainError::not_found(format!("Workflow version '{}' not found", id)))?;

        let mut activated = None;
        for version in versions.iter_mut().filter(|v| v.workflow_id == workflow_id) {
            version.is_active = version.id == id;
            if version.is_active {
                activated = Some(version.clone());
            }
        }

        activated.ok_or_else(|| DomainError::internal("Activated version vanished"))
    }

    async fn insert_if_no_active(
        &self,
        version: WorkflowVersion,
    ) -> Result<BootstrapInsert, DomainError> {
        let mut versions = self
            .versions
            .write()
            .map_err(|_| DomainError::internal("Failed to acquire lock"))?;

        if let Some(active) = versions
            .iter()
            .find(|v| v.workflow_id == version.workflow_id && v.is_active)
        {
            return Ok(BootstrapInsert::AlreadyActive(active.clone()));
        }

        Ok(BootstrapInsert::Inserted(append_locked(
            &mut versions,
            version.activated(true),
        )))
    }
}
