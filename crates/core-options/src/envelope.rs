//! Response-envelope unwrapping.
//!
//! Remote endpoints disagree about where the record list lives: some return
//! a bare array, others wrap it under `results`, `items`, `data`, or a
//! domain key, sometimes nested one level deeper. [`unwrap_envelope`]
//! tolerates all of them and degrades to an empty list rather than failing.

use serde_json::Value;
use tracing::debug;

/// Keys probed, in priority order, when a response body is an object.
const CANDIDATE_KEYS: [&str; 7] = [
    "sites", "tasks", "data", "results", "rows", "items", "payload",
];

/// Extract the record list from a decoded response body.
///
/// Resolution order:
/// 1. a bare array is returned as-is;
/// 2. the first candidate key holding an array wins;
/// 3. a candidate key holding an object is probed one level deeper for
///    `data` / `results` arrays;
/// 4. otherwise the first array-valued property anywhere on the object;
/// 5. otherwise empty.
pub fn unwrap_envelope(body: &Value) -> Vec<Value> {
    if let Value::Array(items) = body {
        return items.clone();
    }

    let Value::Object(map) = body else {
        debug!(target: "options", kind = body_kind(body), "envelope_not_unwrappable");
        return Vec::new();
    };

    for key in CANDIDATE_KEYS {
        match map.get(key) {
            Some(Value::Array(items)) => return items.clone(),
            Some(Value::Object(inner)) => {
                for nested in ["data", "results"] {
                    if let Some(Value::Array(items)) = inner.get(nested) {
                        return items.clone();
                    }
                }
            }
            _ => {}
        }
    }

    // Last resort: any array-valued property, in object order.
    for (key, value) in map {
        if let Value::Array(items) = value {
            debug!(target: "options", key = key.as_str(), "envelope_fallback_first_array");
            return items.clone();
        }
    }

    Vec::new()
}

fn body_kind(body: &Value) -> &'static str {
    match body {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn bare_array_passes_through() {
        let body = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(unwrap_envelope(&body), vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn named_key_wins_in_priority_order() {
        // `tasks` precedes `results` in the candidate list.
        let body = json!({"results": [{"id": "r"}], "tasks": [{"id": "t"}]});
        assert_eq!(unwrap_envelope(&body), vec![json!({"id": "t"})]);
    }

    #[test]
    fn nested_object_probed_for_data_and_results() {
        let body = json!({"data": {"results": [{"id": 2, "label": "B"}]}});
        assert_eq!(unwrap_envelope(&body), vec![json!({"id": 2, "label": "B"})]);
        let rows = json!({"payload": {"data": [{"id": 9}]}});
        assert_eq!(unwrap_envelope(&rows), vec![json!({"id": 9})]);
    }

    #[test]
    fn unexpected_key_falls_back_to_first_array() {
        let body = json!({"unexpectedKey": [{"id": 3, "label": "C"}]});
        assert_eq!(unwrap_envelope(&body), vec![json!({"id": 3, "label": "C"})]);
    }

    #[test]
    fn empty_and_unusable_bodies_yield_empty() {
        assert!(unwrap_envelope(&json!([])).is_empty());
        assert!(unwrap_envelope(&json!({})).is_empty());
        assert!(unwrap_envelope(&json!({"count": 3})).is_empty());
        assert!(unwrap_envelope(&json!(null)).is_empty());
        assert!(unwrap_envelope(&json!("nope")).is_empty());
    }
}
