//! Workflow version domain

mod entity;
mod repository;

pub use entity::{source_checksum, WorkflowVersion};
pub use repository::{BootstrapInsert, WorkflowVersionRepository};

#[cfg(test)]
pub use repository::MockWorkflowVersionRepository;
#[cfg(test)]
pub use repository::tests as version_repository_tests;
