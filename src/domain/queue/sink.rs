//! External delivery targets for queue entries

use async_trait::async_trait;

use super::{QueueEntry, SinkType};
use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Delivers one queue entry. Success or failure is all the dispatcher
/// needs to know; the transport is opaque.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueueSink: Send + Sync {
    /// Sink this implementation serves
    fn sink_type(&self) -> SinkType;

    /// Attempts delivery
    async fn deliver(&self, entry: &QueueEntry) -> Result<(), DomainError>;
}
