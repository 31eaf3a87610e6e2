//! Deal entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::guard::deep_merge;

/// A leasing deal moving through a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub workflow_id: String,
    /// Version in force when the deal was created
    pub workflow_version_id: String,
    pub status: String,
    /// Guard flags and business fields. Only ever deep-merged.
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Bumped on every write, used for optimistic concurrency
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_version_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            workflow_version_id: workflow_version_id.into(),
            status: status.into(),
            payload: default_guard_payload(),
            customer_id: None,
            asset_id: None,
            source: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Deep-merges caller data over the default guard flags
    pub fn with_payload(mut self, payload: Value) -> Self {
        deep_merge(&mut self.payload, payload);
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_asset(mut self, asset_id: impl Into<String>) -> Self {
        self.asset_id = Some(asset_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Guard flags every new deal starts with, all unset
pub fn default_guard_payload() -> Value {
    json!({
        "quotationPrepared": false,
        "vehicle": { "verified": false },
        "docs": { "required": { "allUploaded": false } },
        "risk": { "approved": false },
        "finance": { "approved": false },
        "investor": { "approved": false },
        "legal": { "contractReady": false },
        "esign": { "allSigned": false },
        "payments": { "advanceReceived": false, "supplierPaid": false },
        "delivery": { "confirmed": false }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::guard::resolve_path;

    #[test]
    fn test_new_deal_has_default_flags() {
        let deal = Deal::new("fast-lease-v1", "v-1", "NEW");

        assert_eq!(resolve_path(&deal.payload, "risk.approved"), Some(&json!(false)));
        assert_eq!(
            resolve_path(&deal.payload, "docs.required.allUploaded"),
            Some(&json!(false))
        );
        assert_eq!(deal.revision, 0);
    }

    #[test]
    fn test_with_payload_merges_over_defaults() {
        let deal = Deal::new("fast-lease-v1", "v-1", "NEW")
            .with_payload(json!({"payments": {"advanceReceived": true}, "amount": 120000}));

        assert_eq!(
            resolve_path(&deal.payload, "payments.advanceReceived"),
            Some(&json!(true))
        );
        assert_eq!(
            resolve_path(&deal.payload, "payments.supplierPaid"),
            Some(&json!(false))
        );
        assert_eq!(deal.payload["amount"], json!(120000));
    }
}
