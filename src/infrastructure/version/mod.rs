//! Workflow version persistence

mod in_memory;
mod postgres_repository;

pub use in_memory::InMemoryWorkflowVersionRepository;
pub use postgres_repository::PostgresWorkflowVersionRepository;
