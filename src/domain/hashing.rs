//! Deterministic action hashes used to deduplicate side effects

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::queue::SinkType;

/// Hash for a TASK_CREATE action: one task per deal, stage and task type
pub fn task_action_hash(deal_id: &str, stage: &str, task_type: &str) -> String {
    digest(&[deal_id, stage, task_type])
}

/// Hash for a queued side effect. `action` is serialized with sorted keys
/// so equal actions hash equally.
pub fn queue_action_hash(deal_id: &str, stage: &str, sink: SinkType, action: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(action, &mut canonical);
    digest(&[deal_id, stage, sink.as_str(), &canonical])
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();

    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_hash_is_deterministic() {
        let a = task_action_hash("deal-1", "NEW", "CONFIRM_CAR");
        let b = task_action_hash("deal-1", "NEW", "CONFIRM_CAR");
        let c = task_action_hash("deal-1", "OFFER_PREP", "CONFIRM_CAR");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_parts_do_not_run_together() {
        assert_ne!(
            task_action_hash("deal-1", "AB", "C"),
            task_action_hash("deal-1", "A", "BC")
        );
    }

    #[test]
    fn test_queue_hash_ignores_key_order() {
        let a = json!({"template": "x", "to_roles": ["FINANCE"]});
        let b = json!({"to_roles": ["FINANCE"], "template": "x"});

        assert_eq!(
            queue_action_hash("d", "S", SinkType::Notification, &a),
            queue_action_hash("d", "S", SinkType::Notification, &b)
        );
        assert_ne!(
            queue_action_hash("d", "S", SinkType::Notification, &a),
            queue_action_hash("d", "S", SinkType::Webhook, &a)
        );
    }
}
