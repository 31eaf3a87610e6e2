//! Domain layer: workflow model, guards, repository traits and pure rules

pub mod actor;
pub mod audit;
pub mod deal;
pub mod definition;
pub mod error;
pub mod guard;
pub mod hashing;
pub mod queue;
pub mod sla;
pub mod task;
pub mod version;

pub use actor::{Actor, Role};
pub use audit::{AuditEntry, AuditRepository};
pub use deal::{Deal, DealRepository};
pub use definition::{DefinitionFormat, WorkflowDefinition};
pub use error::DomainError;
pub use guard::{GuardOutcome, GuardRule};
pub use queue::{QueueEntry, QueueRepository, QueueSink, QueueStatus, QueueTarget, SinkType};
pub use sla::SlaStatus;
pub use task::{Task, TaskRepository, TaskStatus};
pub use version::{WorkflowVersion, WorkflowVersionRepository};
