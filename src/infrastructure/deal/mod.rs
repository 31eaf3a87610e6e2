//! Deal persistence

mod in_memory;
mod postgres_repository;

pub use in_memory::InMemoryDealRepository;
pub use postgres_repository::PostgresDealRepository;
