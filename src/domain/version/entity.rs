//! Published workflow versions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::definition::{DefinitionFormat, WorkflowDefinition};

/// A published, immutable workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub id: String,
    pub workflow_id: String,
    /// Monotonic per workflow id, starting at 1
    pub version: u32,
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub format: DefinitionFormat,
    /// SHA-256 hex digest of `source`
    pub checksum: String,
    pub definition: WorkflowDefinition,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl WorkflowVersion {
    pub fn new(
        definition: WorkflowDefinition,
        source: impl Into<String>,
        format: DefinitionFormat,
        version: u32,
    ) -> Self {
        let source = source.into();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: definition.id().to_string(),
            version,
            title: definition.workflow.title.clone(),
            description: None,
            checksum: source_checksum(&source),
            source,
            format,
            definition,
            is_active: false,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn activated(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
}

pub fn source_checksum(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_sha256_hex() {
        assert_eq!(
            source_checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
