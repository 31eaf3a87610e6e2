//! Guard evaluation over deal data documents

mod document;
mod evaluator;
mod literal;

pub use document::{deep_merge, merged, path_patch, resolve_path, set_path};
pub use evaluator::{
    evaluate, evaluate_all, is_truthy, GuardOutcome, GuardRule, RuleOperator,
    ALL_TASKS_COMPLETED_KEY,
};
pub use literal::{parse_number, Literal};
