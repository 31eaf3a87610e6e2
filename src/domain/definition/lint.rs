//! Publish-time lint for transition ordering
//!
//! The engine takes the first matching transition out of a stage. When two
//! transitions share a `from` and their guards can both hold at once, the
//! later one is only reachable by explicit target. That is legal but worth
//! flagging to the author.

use serde::Serialize;

use super::entity::{Transition, WorkflowDefinition};
use crate::domain::guard::{is_truthy, GuardRule, RuleOperator};

pub const AMBIGUOUS_TRANSITIONS: &str = "AMBIGUOUS_TRANSITIONS";

/// Non-fatal finding about a definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefinitionWarning {
    pub code: &'static str,
    pub from: String,
    pub first: String,
    pub second: String,
    pub message: String,
}

/// Reports pairs of transitions out of the same stage whose guard sets are
/// not provably exclusive
pub fn lint_definition(definition: &WorkflowDefinition) -> Vec<DefinitionWarning> {
    let mut warnings = Vec::new();

    for (i, first) in definition.transitions.iter().enumerate() {
        for second in definition.transitions.iter().skip(i + 1) {
            if first.from != second.from || first.to == second.to {
                continue;
            }

            if !guards_exclusive(first, second) {
                warnings.push(DefinitionWarning {
                    code: AMBIGUOUS_TRANSITIONS,
                    from: first.from.clone(),
                    first: first.to.clone(),
                    second: second.to.clone(),
                    message: format!(
                        "{} -> {} and {} -> {} can both match; {} wins by order",
                        first.from, first.to, second.from, second.to, first.to
                    ),
                });
            }
        }
    }

    warnings
}

fn guards_exclusive(a: &Transition, b: &Transition) -> bool {
    a.guards.iter().any(|ga| {
        b.guards
            .iter()
            .any(|gb| ga.key == gb.key && rules_contradict(ga, gb))
    })
}

fn rules_contradict(a: &GuardRule, b: &GuardRule) -> bool {
    use RuleOperator::*;

    match (a.operator(), b.operator()) {
        (Truthy, Falsy) | (Falsy, Truthy) => true,
        (Equals(x), Equals(y)) => x != y,
        (Equals(x), NotEquals(y)) | (NotEquals(y), Equals(x)) => x == y,
        (Equals(x), Truthy) | (Truthy, Equals(x)) => !is_truthy(Some(&x.to_json())),
        (Equals(x), Falsy) | (Falsy, Equals(x)) => is_truthy(Some(&x.to_json())),
        _ => false,
    }
}
