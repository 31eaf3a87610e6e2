//! Task persistence

mod in_memory;
mod postgres_repository;

pub use in_memory::InMemoryTaskRepository;
pub use postgres_repository::PostgresTaskRepository;
