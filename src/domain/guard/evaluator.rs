//! Guard rule evaluation

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::resolve_path;
use super::literal::Literal;

/// Key whose `truthy` rule checks that every listed task is completed
pub const ALL_TASKS_COMPLETED_KEY: &str = "tasks.allCompleted";

/// A boolean predicate over a deal's data document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardRule {
    pub key: String,
    pub rule: String,
}

impl GuardRule {
    pub fn new(key: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            rule: rule.into(),
        }
    }

    pub fn truthy(key: impl Into<String>) -> Self {
        Self::new(key, "truthy")
    }

    pub fn operator(&self) -> RuleOperator {
        RuleOperator::parse(&self.rule)
    }
}

/// Parsed rule text
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOperator {
    Equals(Literal),
    NotEquals(Literal),
    Truthy,
    Falsy,
    Unsupported(String),
}

impl RuleOperator {
    pub fn parse(rule: &str) -> Self {
        let rule = rule.trim();

        if let Some(rest) = rule.strip_prefix("==") {
            return Self::Equals(Literal::parse(rest));
        }

        if let Some(rest) = rule.strip_prefix("!=") {
            return Self::NotEquals(Literal::parse(rest));
        }

        match rule {
            "truthy" => Self::Truthy,
            "falsy" => Self::Falsy,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

/// Result of evaluating one guard rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardOutcome {
    pub key: String,
    pub rule: String,
    pub ok: bool,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negate: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unsupported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl GuardOutcome {
    /// Short human-readable description of a failed guard
    pub fn describe(&self) -> String {
        if self.unsupported {
            return format!("{}: unsupported rule '{}'", self.key, self.rule);
        }

        let actual = self
            .actual
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "undefined".to_string());

        format!("{} {} (actual {})", self.key, self.rule.trim(), actual)
    }
}

/// Evaluates a rule against a document. Pure: no I/O, no mutation.
/// Unsupported rule text always fails.
pub fn evaluate(document: &Value, rule: &GuardRule) -> GuardOutcome {
    let actual = resolve_path(document, &rule.key);

    let (ok, expected, negate, unsupported) = match rule.operator() {
        RuleOperator::Equals(literal) => {
            (literal.strictly_equals(actual), literal.to_json(), false, false)
        }
        RuleOperator::NotEquals(literal) => {
            (!literal.strictly_equals(actual), literal.to_json(), true, false)
        }
        RuleOperator::Truthy if rule.key == ALL_TASKS_COMPLETED_KEY => {
            (all_tasks_completed(actual), Value::Bool(true), false, false)
        }
        RuleOperator::Truthy => (is_truthy(actual), Value::Bool(true), false, false),
        RuleOperator::Falsy => (!is_truthy(actual), Value::Bool(false), false, false),
        RuleOperator::Unsupported(_) => (false, Value::Null, false, true),
    };

    GuardOutcome {
        key: rule.key.clone(),
        rule: rule.rule.clone(),
        ok,
        expected,
        negate,
        unsupported,
        actual: actual.cloned(),
    }
}

/// Evaluates every rule, keeping outcomes in rule order
pub fn evaluate_all(document: &Value, rules: &[GuardRule]) -> Vec<GuardOutcome> {
    rules.iter().map(|rule| evaluate(document, rule)).collect()
}

/// Truthiness: unresolved, null, false, zero and the empty string are
/// falsy. Every container, even an empty one, is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn all_tasks_completed(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(tasks)) => tasks
            .iter()
            .all(|task| task.get("status").and_then(Value::as_str) == Some("completed")),
        _ => false,
    }
}
