//! Side-effect queue domain

mod entity;
mod repository;
mod sink;

pub use entity::{NotificationKind, QueueEntry, QueueStats, QueueStatus, QueueTarget, SinkType};
pub use repository::QueueRepository;
pub use sink::QueueSink;

#[cfg(test)]
pub use repository::MockQueueRepository;
#[cfg(test)]
pub use repository::tests as queue_repository_tests;
#[cfg(test)]
pub use sink::MockQueueSink;
