//! Inbound integration events (e-signature, bank, credit bureau)
//!
//! Each event merges a small guard-relevant fragment into the deal payload
//! and then asks the transition engine to move the deal as the system actor.
//! A stage may route an event elsewhere through `webhooks.on_event`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::deal_service::DealServiceTrait;
use super::transition_engine::{TransitionEngineTrait, TransitionOutcome};
use super::version_service::WorkflowVersionServiceTrait;
use crate::domain::actor::Actor;
use crate::domain::deal::Deal;
use crate::domain::error::DomainError;
use crate::domain::guard::evaluate_all;

const STAGE_VEHICLE_DELIVERY: &str = "VEHICLE_DELIVERY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EsignStatus {
    Completed,
    Declined,
}

/// E-signature provider callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsignEvent {
    pub deal_id: String,
    pub status: EsignStatus,
    #[serde(default)]
    pub envelope_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Advance,
    Supplier,
}

impl PaymentKind {
    fn segment(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Supplier => "supplier",
        }
    }

    fn guard_flag(&self) -> &'static str {
        match self {
            Self::Advance => "advanceReceived",
            Self::Supplier => "supplierPaid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Confirmed,
    Failed,
}

/// Bank payment confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankEvent {
    pub deal_id: String,
    pub kind: PaymentKind,
    pub status: PaymentStatus,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub external_ref: Option<String>,
}

/// Credit bureau result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AecbEvent {
    pub deal_id: String,
    #[serde(default)]
    pub aecb_score: Option<i64>,
    pub approved: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Where an event asks the deal to go
#[derive(Debug, Clone, PartialEq, Eq)]
enum EventTarget {
    Stage(String),
    /// First passing transition out of the current stage
    Scan,
    Stay,
}

/// What handling an event did
#[derive(Debug, Clone, Serialize)]
pub struct InboundOutcome {
    pub event: String,
    pub deal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionOutcome>,
}

/// Trait for inbound event handling (for dynamic dispatch in AppState)
#[async_trait]
pub trait InboundEventServiceTrait: Send + Sync {
    async fn handle_esign(&self, event: EsignEvent) -> Result<InboundOutcome, DomainError>;

    async fn handle_bank(&self, event: BankEvent) -> Result<InboundOutcome, DomainError>;

    async fn handle_aecb(&self, event: AecbEvent) -> Result<InboundOutcome, DomainError>;
}

pub struct InboundEventService {
    deals: Arc<dyn DealServiceTrait>,
    transitions: Arc<dyn TransitionEngineTrait>,
    versions: Arc<dyn WorkflowVersionServiceTrait>,
}

impl InboundEventService {
    pub fn new(
        deals: Arc<dyn DealServiceTrait>,
        transitions: Arc<dyn TransitionEngineTrait>,
        versions: Arc<dyn WorkflowVersionServiceTrait>,
    ) -> Self {
        Self {
            deals,
            transitions,
            versions,
        }
    }

    /// Merges the fragment, resolves the target and attempts the move
    async fn apply(
        &self,
        event: &str,
        deal_id: &str,
        fragment: Value,
        fallback: EventTarget,
    ) -> Result<InboundOutcome, DomainError> {
        if deal_id.trim().is_empty() {
            return Err(DomainError::validation("deal_id is required"));
        }

        let deal = self.deals.merge_payload(deal_id, fragment).await?;

        let target = self.routed_target(&deal, event).await?.unwrap_or(fallback);
        let target = match target {
            EventTarget::Stay => {
                info!(deal_id = %deal_id, event, "Event recorded without transition");
                return Ok(InboundOutcome {
                    event: event.to_string(),
                    deal_id: deal_id.to_string(),
                    transition: None,
                });
            }
            EventTarget::Stage(stage) => Some(stage),
            EventTarget::Scan => None,
        };

        let outcome = self
            .transitions
            .attempt_transition(deal_id, target.as_deref(), &Actor::system())
            .await?;

        if outcome.applied {
            info!(
                deal_id = %deal_id,
                event,
                from = %outcome.previous_status,
                to = ?outcome.new_status,
                "Event moved deal"
            );
        } else {
            info!(
                deal_id = %deal_id,
                event,
                status = %outcome.previous_status,
                reason = ?outcome.reason,
                "Event did not move deal"
            );
        }

        Ok(InboundOutcome {
            event: event.to_string(),
            deal_id: deal_id.to_string(),
            transition: Some(outcome),
        })
    }

    /// Target the current stage declares for this event, when the route's
    /// conditions hold
    async fn routed_target(
        &self,
        deal: &Deal,
        event: &str,
    ) -> Result<Option<EventTarget>, DomainError> {
        let definition = self.versions.definition(&deal.workflow_version_id).await?;

        Ok(definition
            .stage(&deal.status)
            .and_then(|stage| stage.event_route(event))
            .filter(|route| {
                evaluate_all(&deal.payload, &route.conditions)
                    .iter()
                    .all(|outcome| outcome.ok)
            })
            .map(|route| EventTarget::Stage(route.transition_to.clone())))
    }
}

fn esign_fragment(event: &EsignEvent) -> Value {
    json!({
        "esign": {
            "status": event.status,
            "allSigned": event.status == EsignStatus::Completed,
            "envelopeId": event.envelope_id,
        }
    })
}

fn bank_fragment(event: &BankEvent) -> Value {
    let detail = json!({
        "status": event.status,
        "amount": event.amount,
        "currency": event.currency,
        "external_ref": event.external_ref,
        "received_at": Utc::now().to_rfc3339(),
    });

    let mut payments = serde_json::Map::new();
    payments.insert(event.kind.segment().to_string(), detail);
    // A failed payment is recorded but never clears an earlier confirmation
    if event.status == PaymentStatus::Confirmed {
        payments.insert(event.kind.guard_flag().to_string(), json!(true));
    }

    json!({ "payments": Value::Object(payments) })
}

fn aecb_fragment(event: &AecbEvent) -> Value {
    json!({
        "risk": {
            "approved": event.approved,
            "aecb_score": event.aecb_score,
            "notes": event.notes,
        }
    })
}

#[async_trait]
impl InboundEventServiceTrait for InboundEventService {
    #[instrument(skip(self, event), fields(deal_id = %event.deal_id))]
    async fn handle_esign(&self, event: EsignEvent) -> Result<InboundOutcome, DomainError> {
        let (name, fallback) = match event.status {
            EsignStatus::Completed => (
                "esign.completed",
                EventTarget::Stage(STAGE_VEHICLE_DELIVERY.to_string()),
            ),
            EsignStatus::Declined => ("esign.declined", EventTarget::Stay),
        };

        self.apply(name, &event.deal_id, esign_fragment(&event), fallback)
            .await
    }

    #[instrument(skip(self, event), fields(deal_id = %event.deal_id))]
    async fn handle_bank(&self, event: BankEvent) -> Result<InboundOutcome, DomainError> {
        let status = match event.status {
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        };
        let name = format!("bank.{}.{}", event.kind.segment(), status);
        let fallback = match event.status {
            PaymentStatus::Confirmed => EventTarget::Stage(STAGE_VEHICLE_DELIVERY.to_string()),
            PaymentStatus::Failed => EventTarget::Stay,
        };

        self.apply(&name, &event.deal_id, bank_fragment(&event), fallback)
            .await
    }

    #[instrument(skip(self, event), fields(deal_id = %event.deal_id))]
    async fn handle_aecb(&self, event: AecbEvent) -> Result<InboundOutcome, DomainError> {
        let fallback = if event.approved {
            EventTarget::Scan
        } else {
            EventTarget::Stay
        };

        self.apply("aecb.result", &event.deal_id, aecb_fragment(&event), fallback)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::ROLE_SYSTEM;
    use crate::infrastructure::services::testing::{deal_at, engine};

    #[test]
    fn test_event_payloads_deserialize() {
        let bank: BankEvent = serde_json::from_value(json!({
            "deal_id": "deal-1",
            "kind": "SUPPLIER",
            "status": "CONFIRMED",
            "amount": 95000.0,
            "currency": "AED"
        }))
        .unwrap();
        assert_eq!(bank.kind, PaymentKind::Supplier);
        assert!(bank.external_ref.is_none());

        let esign: Result<EsignEvent, _> =
            serde_json::from_value(json!({"deal_id": "deal-1", "status": "MAYBE"}));
        assert!(esign.is_err());
    }

    #[test]
    fn test_failed_payment_does_not_set_flag() {
        let fragment = bank_fragment(&BankEvent {
            deal_id: "deal-1".to_string(),
            kind: PaymentKind::Advance,
            status: PaymentStatus::Failed,
            amount: None,
            currency: None,
            external_ref: Some("ref-9".to_string()),
        });

        assert!(fragment["payments"].get("advanceReceived").is_none());
        assert_eq!(fragment["payments"]["advance"]["status"], json!("FAILED"));
        assert_eq!(fragment["payments"]["advance"]["external_ref"], json!("ref-9"));
    }

    #[tokio::test]
    async fn test_esign_completion_moves_funded_deal_to_delivery() {
        let e = engine();
        let deal = deal_at(
            &e,
            "SIGNING_FUNDING",
            json!({
                "payments": {"advanceReceived": true, "supplierPaid": true},
                "esign": {"allSigned": false}
            }),
        )
        .await;

        let outcome = e
            .services
            .events
            .handle_esign(EsignEvent {
                deal_id: deal.id.clone(),
                status: EsignStatus::Completed,
                envelope_id: Some("env-42".to_string()),
            })
            .await
            .unwrap();

        let transition = outcome.transition.unwrap();
        assert!(transition.applied);
        assert_eq!(transition.new_status.as_deref(), Some("VEHICLE_DELIVERY"));

        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(deal.status, "VEHICLE_DELIVERY");
        assert_eq!(deal.payload["esign"]["allSigned"], json!(true));
        assert_eq!(deal.payload["esign"]["envelopeId"], json!("env-42"));

        let audit = e.services.transitions.list_audit(&deal.id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].actor_roles, vec![ROLE_SYSTEM.to_string()]);
    }

    #[tokio::test]
    async fn test_bank_confirmation_records_flag_but_waits_for_other_guards() {
        let e = engine();
        let deal = deal_at(&e, "SIGNING_FUNDING", json!({})).await;

        let outcome = e
            .services
            .events
            .handle_bank(BankEvent {
                deal_id: deal.id.clone(),
                kind: PaymentKind::Advance,
                status: PaymentStatus::Confirmed,
                amount: Some(25000.0),
                currency: Some("AED".to_string()),
                external_ref: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.event, "bank.advance.confirmed");
        let transition = outcome.transition.unwrap();
        assert!(!transition.applied);
        assert!(transition.reason.unwrap().contains("esign.allSigned"));

        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(deal.status, "SIGNING_FUNDING");
        assert_eq!(deal.payload["payments"]["advanceReceived"], json!(true));
        assert_eq!(deal.payload["payments"]["advance"]["amount"], json!(25000.0));
    }

    #[tokio::test]
    async fn test_failed_payment_does_not_attempt_transition() {
        let e = engine();
        let deal = deal_at(&e, "SIGNING_FUNDING", json!({})).await;

        let outcome = e
            .services
            .events
            .handle_bank(BankEvent {
                deal_id: deal.id.clone(),
                kind: PaymentKind::Supplier,
                status: PaymentStatus::Failed,
                amount: None,
                currency: None,
                external_ref: None,
            })
            .await
            .unwrap();

        assert!(outcome.transition.is_none());
        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(deal.payload["payments"]["supplierPaid"], json!(false));
    }

    #[tokio::test]
    async fn test_aecb_approval_follows_stage_route() {
        let e = engine();
        let deal = deal_at(&e, "RISK_REVIEW", json!({})).await;

        let outcome = e
            .services
            .events
            .handle_aecb(AecbEvent {
                deal_id: deal.id.clone(),
                aecb_score: Some(712),
                approved: true,
                notes: None,
            })
            .await
            .unwrap();

        assert_eq!(
            outcome.transition.unwrap().new_status.as_deref(),
            Some("FINANCE_REVIEW")
        );
        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(deal.payload["risk"]["aecb_score"], json!(712));
    }

    #[tokio::test]
    async fn test_aecb_rejection_keeps_deal_in_review() {
        let e = engine();
        let deal = deal_at(&e, "RISK_REVIEW", json!({})).await;

        let outcome = e
            .services
            .events
            .handle_aecb(AecbEvent {
                deal_id: deal.id.clone(),
                aecb_score: Some(410),
                approved: false,
                notes: Some("thin file".to_string()),
            })
            .await
            .unwrap();

        assert!(outcome.transition.is_none());
        let deal = e.services.deals.get_deal(&deal.id).await.unwrap();
        assert_eq!(deal.status, "RISK_REVIEW");
        assert_eq!(deal.payload["risk"]["notes"], json!("thin file"));
    }

    #[tokio::test]
    async fn test_event_for_unknown_deal() {
        let e = engine();

        let result = e
            .services
            .events
            .handle_esign(EsignEvent {
                deal_id: "missing".to_string(),
                status: EsignStatus::Completed,
                envelope_id: None,
            })
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
