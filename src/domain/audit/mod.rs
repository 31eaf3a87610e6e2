//! Transition audit trail

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

#[cfg(test)]
use mockall::automock;

/// Record of one applied transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub deal_id: String,
    pub from_status: String,
    pub to_status: String,
    pub actor_id: Option<String>,
    pub actor_roles: Vec<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        deal_id: impl Into<String>,
        from_status: impl Into<String>,
        to_status: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            deal_id: deal_id.into(),
            from_status: from_status.into(),
            to_status: to_status.into(),
            actor_id: None,
            actor_roles: Vec::new(),
            reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: Option<String>, roles: Vec<String>) -> Self {
        self.actor_id = actor_id;
        self.actor_roles = roles;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Append-only audit storage
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends an entry
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError>;

    /// Entries of a deal, oldest first
    async fn list_by_deal(&self, deal_id: &str) -> Result<Vec<AuditEntry>, DomainError>;
}
