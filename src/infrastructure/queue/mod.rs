//! Side-effect queue persistence

mod in_memory;
mod postgres_repository;

pub use in_memory::InMemoryQueueRepository;
pub use postgres_repository::PostgresQueueRepository;
