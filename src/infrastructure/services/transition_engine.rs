//! Transition engine
//!
//! Transitions out of a stage are tried in definition order and the first
//! one whose roles and guards pass is applied. A guard that does not hold is
//! a normal outcome reported in [`TransitionOutcome`], never an error. The
//! status write is conditional on the status the engine read, so two
//! concurrent movers cannot both win.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::entry_actions::{EntryActionExecutor, EntryActionReport};
use super::version_service::WorkflowVersionServiceTrait;
use crate::domain::actor::Actor;
use crate::domain::audit::{AuditEntry, AuditRepository};
use crate::domain::deal::{Deal, DealRepository};
use crate::domain::definition::{Transition, WorkflowDefinition};
use crate::domain::error::DomainError;
use crate::domain::guard::{evaluate_all, GuardOutcome};
use crate::infrastructure::observability::record_transition;

/// Result of a transition attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub applied: bool,
    pub previous_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_guards: Vec<GuardOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_actions: Option<EntryActionReport>,
    /// Set when the status moved but its entry actions did not all run.
    /// Replaying entry actions for the deal recovers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_action_error: Option<String>,
}

impl TransitionOutcome {
    fn rejected(
        previous_status: &str,
        reason: impl Into<String>,
        failed_guards: Vec<GuardOutcome>,
    ) -> Self {
        Self {
            applied: false,
            previous_status: previous_status.to_string(),
            new_status: None,
            reason: Some(reason.into()),
            failed_guards,
            entry_actions: None,
            entry_action_error: None,
        }
    }
}

/// Trait for transition operations (for dynamic dispatch in AppState)
#[async_trait]
pub trait TransitionEngineTrait: Send + Sync {
    /// Moves the deal to `target`, or with no target to the first
    /// transition out of its current stage that passes
    async fn attempt_transition(
        &self,
        deal_id: &str,
        target: Option<&str>,
        actor: &Actor,
    ) -> Result<TransitionOutcome, DomainError>;

    /// Re-runs the entry actions of the deal's current stage
    async fn replay_entry_actions(&self, deal_id: &str) -> Result<EntryActionReport, DomainError>;

    /// Applied transitions of a deal, oldest first
    async fn list_audit(&self, deal_id: &str) -> Result<Vec<AuditEntry>, DomainError>;
}

pub struct TransitionEngine {
    deals: Arc<dyn DealRepository>,
    audit: Arc<dyn AuditRepository>,
    versions: Arc<dyn WorkflowVersionServiceTrait>,
    entry_actions: Arc<EntryActionExecutor>,
}

impl TransitionEngine {
    pub fn new(
        deals: Arc<dyn DealRepository>,
        audit: Arc<dyn AuditRepository>,
        versions: Arc<dyn WorkflowVersionServiceTrait>,
        entry_actions: Arc<EntryActionExecutor>,
    ) -> Self {
        Self {
            deals,
            audit,
            versions,
            entry_actions,
        }
    }

    async fn load(&self, deal_id: &str) -> Result<(Deal, Arc<WorkflowDefinition>), DomainError> {
        let deal = self
            .deals
            .find_by_id(deal_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Deal '{}' not found", deal_id)))?;
        let definition = self.versions.definition(&deal.workflow_version_id).await?;
        Ok((deal, definition))
    }

    /// Picks the transition to apply, or explains why none applies
    fn select<'a>(
        deal: &Deal,
        definition: &'a WorkflowDefinition,
        target: Option<&str>,
        actor: &Actor,
    ) -> Result<&'a Transition, TransitionOutcome> {
        let current = deal.status.as_str();

        let candidates: Vec<&Transition> = match target {
            Some(target) => definition.find_transition(current, target).into_iter().collect(),
            None => definition.transitions_from(current).collect(),
        };

        if candidates.is_empty() {
            let reason = match target {
                Some(target) => format!("No transition from {} to {}", current, target),
                None => format!("No transitions defined from {}", current),
            };
            return Err(TransitionOutcome::rejected(current, reason, Vec::new()));
        }

        let mut failed_guards = Vec::new();
        let mut reasons = Vec::new();

        for transition in candidates {
            if !transition.permits(actor) {
                reasons.push(if transition.is_system_only() {
                    format!("{} -> {} is system-triggered only", transition.from, transition.to)
                } else {
                    format!(
                        "{} -> {} requires one of [{}]",
                        transition.from,
                        transition.to,
                        transition
                            .by_roles
                            .iter()
                            .map(|r| r.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                });
                continue;
            }

            let failed: Vec<GuardOutcome> = evaluate_all(&deal.payload, &transition.guards)
                .into_iter()
                .filter(|outcome| !outcome.ok)
                .collect();

            if failed.is_empty() {
                return Ok(transition);
            }

            reasons.push(format!(
                "{} -> {} guards not met: {}",
                transition.from,
                transition.to,
                failed
                    .iter()
                    .map(GuardOutcome::describe)
                    .collect::<Vec<_>>()
                    .join("; ")
            ));
            failed_guards.extend(failed);
        }

        Err(TransitionOutcome::rejected(
            current,
            reasons.join(" | "),
            failed_guards,
        ))
    }
}

#[async_trait]
impl TransitionEngineTrait for TransitionEngine {
    #[instrument(skip(self, actor), fields(roles = ?actor.role_codes()))]
    async fn attempt_transition(
        &self,
        deal_id: &str,
        target: Option<&str>,
        actor: &Actor,
    ) -> Result<TransitionOutcome, DomainError> {
        let (deal, definition) = self.load(deal_id).await?;
        let from = deal.status.clone();

        if target == Some(from.as_str()) {
            return Ok(TransitionOutcome {
                new_status: Some(from.clone()),
                ..TransitionOutcome::rejected(&from, format!("Deal is already in {}", from), vec![])
            });
        }

        let transition = match Self::select(&deal, &definition, target, actor) {
            Ok(transition) => transition,
            Err(outcome) => {
                record_transition(&from, target.unwrap_or("*"), "rejected");
                info!(
                    deal_id = %deal_id,
                    status = %from,
                    reason = outcome.reason.as_deref().unwrap_or_default(),
                    "Transition not applied"
                );
                return Ok(outcome);
            }
        };
        let to = transition.to.clone();

        let moved = match self.deals.update_status(deal_id, &from, &to).await {
            Ok(deal) => deal,
            Err(e) => {
                if e.is_conflict() {
                    record_transition(&from, &to, "conflict");
                }
                return Err(e);
            }
        };
        record_transition(&from, &to, "applied");
        info!(deal_id = %deal_id, from = %from, to = %to, "Deal transitioned");

        let audit = AuditEntry::new(deal_id, &from, &to)
            .with_actor(actor.user_id.clone(), actor.role_codes())
            .with_reason(match target {
                Some(_) => "requested",
                None => "auto",
            });
        if let Err(e) = self.audit.record(audit).await {
            warn!(deal_id = %deal_id, error = %e, "Failed to record transition audit entry");
        }

        let (entry_actions, entry_action_error) =
            match self.entry_actions.run(&moved, &definition).await {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    error!(
                        deal_id = %deal_id,
                        stage = %to,
                        error = %e,
                        "Entry actions failed after transition"
                    );
                    (None, Some(e.to_string()))
                }
            };

        Ok(TransitionOutcome {
            applied: true,
            previous_status: from,
            new_status: Some(to),
            reason: None,
            failed_guards: Vec::new(),
            entry_actions,
            entry_action_error,
        })
    }

    #[instrument(skip(self))]
    async fn replay_entry_actions(&self, deal_id: &str) -> Result<EntryActionReport, DomainError> {
        let (deal, definition) = self.load(deal_id).await?;
        self.entry_actions.run(&deal, &definition).await
    }

    async fn list_audit(&self, deal_id: &str) -> Result<Vec<AuditEntry>, DomainError> {
        self.audit.list_by_deal(deal_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::{Role, ROLE_FINANCE, ROLE_LEGAL, ROLE_OP_MANAGER, ROLE_RISK_MANAGER};
    use crate::domain::definition::DefinitionFormat;
    use crate::domain::task::TaskRepository;
    use crate::infrastructure::services::CreateVersionRequest;
    use crate::infrastructure::services::testing::{deal_at, engine};
    use serde_json::json;

    fn risk_manager() -> Actor {
        Actor::user("risk-1", vec![Role::new(ROLE_RISK_MANAGER)])
    }

    #[tokio::test]
    async fn test_failed_guard_is_reported_not_raised() {
        let e = engine();
        let deal = deal_at(&e, "RISK_REVIEW", json!({})).await;

        let outcome = e
            .services
            .transitions
            .attempt_transition(&deal.id, Some("FINANCE_REVIEW"), &risk_manager())
            .await
            .unwrap();

        assert!(!outcome.applied);
        assert_eq!(outcome.previous_status, "RISK_REVIEW");
        assert_eq!(outcome.failed_guards.len(), 1);
        assert_eq!(outcome.failed_guards[0].key, "risk.approved");
        assert_eq!(outcome.failed_guards[0].expected, json!(true));
        assert!(outcome.reason.unwrap().contains("risk.approved"));
    }

    #[tokio::test]
    async fn test_auto_scan_applies_first_passing_transition() {
        let e = engine();
        let deal = deal_at(&e, "RISK_REVIEW", json!({"risk": {"approved": true}})).await;

        let outcome = e
            .services
            .transitions
            .attempt_transition(&deal.id, None, &risk_manager())
            .await
            .unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.new_status.as_deref(), Some("FINANCE_REVIEW"));

        let tasks = e.repos.tasks.list_by_deal(&deal.id).await.unwrap();
        assert!(tasks.iter().any(|t| t.task_type == "FIN_CALC"));

        let audit = e.services.transitions.list_audit(&deal.id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].from_status, "RISK_REVIEW");
        assert_eq!(audit[0].actor_id.as_deref(), Some("risk-1"));
        assert_eq!(audit[0].reason.as_deref(), Some("auto"));
    }

    #[tokio::test]
    async fn test_role_not_permitted() {
        let e = engine();
        let deal = deal_at(&e, "RISK_REVIEW", json!({"risk": {"approved": true}})).await;
        let legal = Actor::user("legal-1", vec![Role::new(ROLE_LEGAL)]);

        let outcome = e
            .services
            .transitions
            .attempt_transition(&deal.id, Some("FINANCE_REVIEW"), &legal)
            .await
            .unwrap();

        assert!(!outcome.applied);
        assert!(outcome.reason.unwrap().contains("RISK_MANAGER"));
    }

    #[tokio::test]
    async fn test_transition_without_roles_is_system_only() {
        let e = engine();
        let published = e
            .services
            .versions
            .create_version(CreateVersionRequest {
                source: r#"
workflow: { id: gate-demo, title: Gate }
kanban_order: [A, B]
stages:
  A: { title: A }
  B: { title: B }
transitions:
  - { from: A, to: B }
"#
                .to_string(),
                format: DefinitionFormat::Yaml,
                activate: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let deal = e
            .repos
            .deals
            .create(Deal::new("gate-demo", &published.version.id, "A"))
            .await
            .unwrap();

        for actor in [
            Actor::user("ops-1", vec![Role::new(ROLE_OP_MANAGER)]),
            Actor::new(Some("anon".into()), vec![]),
        ] {
            let outcome = e
                .services
                .transitions
                .attempt_transition(&deal.id, Some("B"), &actor)
                .await
                .unwrap();

            assert!(!outcome.applied);
            assert!(outcome.reason.unwrap().contains("system-triggered only"));
        }

        let outcome = e
            .services
            .transitions
            .attempt_transition(&deal.id, Some("B"), &Actor::system())
            .await
            .unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.new_status.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_unknown_transition() {
        let e = engine();
        let deal = deal_at(&e, "NEW", json!({})).await;

        let outcome = e
            .services
            .transitions
            .attempt_transition(&deal.id, Some("ACTIVE"), &Actor::system())
            .await
            .unwrap();

        assert!(!outcome.applied);
        assert_eq!(outcome.reason.as_deref(), Some("No transition from NEW to ACTIVE"));
    }

    #[tokio::test]
    async fn test_repeated_transition_is_idempotent() {
        let e = engine();
        let deal = deal_at(&e, "RISK_REVIEW", json!({"risk": {"approved": true}})).await;
        let transitions = &e.services.transitions;

        let first = transitions
            .attempt_transition(&deal.id, Some("FINANCE_REVIEW"), &risk_manager())
            .await
            .unwrap();
        let second = transitions
            .attempt_transition(&deal.id, Some("FINANCE_REVIEW"), &risk_manager())
            .await
            .unwrap();

        assert!(first.applied);
        assert!(!second.applied);
        assert_eq!(second.new_status.as_deref(), Some("FINANCE_REVIEW"));

        let fin_calc: Vec<_> = e
            .repos
            .tasks
            .list_by_deal(&deal.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.task_type == "FIN_CALC")
            .collect();
        assert_eq!(fin_calc.len(), 1);
        assert_eq!(transitions.list_audit(&deal.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_needs_flag() {
        let e = engine();
        let deal = deal_at(&e, "FINANCE_REVIEW", json!({"finance": {"approved": true}})).await;
        let finance = Actor::user("fin-1", vec![Role::new(ROLE_FINANCE)]);

        let blocked = e
            .services
            .transitions
            .attempt_transition(&deal.id, Some("CANCELLED"), &finance)
            .await
            .unwrap();
        assert!(!blocked.applied);

        e.services
            .deals
            .merge_payload(&deal.id, json!({"cancellation": {"requested": true}}))
            .await
            .unwrap();

        // Forward move is now excluded, cancellation wins the scan
        let outcome = e
            .services
            .transitions
            .attempt_transition(&deal.id, None, &finance)
            .await
            .unwrap();
        assert_eq!(outcome.new_status.as_deref(), Some("CANCELLED"));
    }

    #[tokio::test]
    async fn test_replay_recreates_missing_side_effects_once() {
        let e = engine();
        let deal = deal_at(&e, "SIGNING_FUNDING", json!({})).await;

        let first = e.services.transitions.replay_entry_actions(&deal.id).await.unwrap();
        let second = e.services.transitions.replay_entry_actions(&deal.id).await.unwrap();

        assert_eq!(first.tasks_created.len(), 2);
        assert_eq!(second.tasks_existing.len(), 2);
        assert!(second.tasks_created.is_empty());
        assert_eq!(first.queued, second.queued);
    }

    #[tokio::test]
    async fn test_missing_deal() {
        let e = engine();
        let result = e
            .services
            .transitions
            .attempt_transition("missing", None, &Actor::system())
            .await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }
}
