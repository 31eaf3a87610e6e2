//! Path resolution and merging over deal data documents
//!
//! Documents are plain `serde_json::Value` trees. A path is a list of keys
//! joined with `.`; resolution never fails, it yields `None` when the path
//! leaves the tree.

use serde_json::{Map, Value};

/// Resolves a dotted path. Missing keys, non-container intermediates and an
/// empty path all resolve to `None`.
pub fn resolve_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = document;

    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(parse_index(segment)?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Array indices follow canonical integer spelling ("0", "12", never "01")
fn parse_index(segment: &str) -> Option<usize> {
    if segment.len() > 1 && segment.starts_with('0') {
        return None;
    }

    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    segment.parse().ok()
}

/// Builds a nested object holding `value` at `path`
pub fn path_patch(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |acc, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), acc);
        Value::Object(map)
    })
}

/// Writes `value` at `path`, creating or replacing intermediate objects
pub fn set_path(document: &mut Value, path: &str, value: Value) {
    deep_merge(document, path_patch(path, value));
}

/// Recursively merges `patch` into `target`. Objects merge key by key; any
/// other patch value replaces what was there.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, patch_value),
                    None => {
                        target_map.insert(key, patch_value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

/// Returns a merged copy without touching the inputs
pub fn merged(base: &Value, patch: &Value) -> Value {
    let mut result = base.clone();
    deep_merge(&mut result, patch.clone());
    result
}
