//! Mapping from task types to the deal guard flags they fulfil

use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::Task;

static TASK_GUARD_KEYS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("CONFIRM_CAR", "tasks.confirmCar.completed"),
        ("PREPARE_QUOTE", "quotationPrepared"),
        ("VERIFY_VEHICLE", "vehicle.verified"),
        ("COLLECT_DOCS", "docs.required.allUploaded"),
        ("AECB_CHECK", "risk.approved"),
        ("FIN_CALC", "finance.approved"),
        ("INVESTOR_APPROVAL", "investor.approved"),
        ("PREPARE_CONTRACT", "legal.contractReady"),
        ("RECEIVE_ADVANCE", "payments.advanceReceived"),
        ("PAY_SUPPLIER", "payments.supplierPaid"),
        ("ARRANGE_DELIVERY", "delivery.confirmed"),
    ])
});

/// Guard key for a task type from the built-in table
pub fn guard_key_for_type(task_type: &str) -> Option<&'static str> {
    TASK_GUARD_KEYS.get(task_type).copied()
}

/// Guard key a completed task sets: the task's own declaration first,
/// then the per-type table
pub fn resolve_guard_key(task: &Task) -> Option<String> {
    task.declared_guard_key()
        .map(str::to_string)
        .or_else(|| guard_key_for_type(&task.task_type).map(str::to_string))
}

/// Key under `tasks.` where completion details are recorded
pub fn storage_key(guard_key: &str) -> String {
    if let Some(rest) = guard_key.strip_prefix("tasks.") {
        if let Some(segment) = rest.split('.').next().filter(|s| !s.is_empty()) {
            return segment.to_string();
        }
    }

    guard_key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
