//! Deal domain

mod entity;
mod repository;

pub use entity::{default_guard_payload, Deal};
pub use repository::DealRepository;

#[cfg(test)]
pub use repository::MockDealRepository;
#[cfg(test)]
pub use repository::tests as deal_repository_tests;
