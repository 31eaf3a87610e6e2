//! Task domain

mod entity;
mod guard_keys;
mod repository;

pub use entity::{Task, TaskStatus};
pub use guard_keys::{guard_key_for_type, resolve_guard_key, storage_key};
pub use repository::{TaskCompletion, TaskInsert, TaskRepository};

#[cfg(test)]
pub use repository::MockTaskRepository;
#[cfg(test)]
pub use repository::tests as task_repository_tests;
