//! Transition audit persistence

mod in_memory;
mod postgres_repository;

pub use in_memory::InMemoryAuditRepository;
pub use postgres_repository::PostgresAuditRepository;
