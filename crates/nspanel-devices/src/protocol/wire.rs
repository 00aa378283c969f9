//! Helpers for building panel wire objects.

use serde_json::{Map, Value};

/// Recursively merge `source` into `target`. Nested objects are merged key
/// by key, any other value in `source` replaces the one in `target`.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_merge_named_instances() {
        let mut state = object(json!({"toggle": {"1": {"toggleState": "on"}}}));
        deep_merge(&mut state, object(json!({"toggle": {"2": {"toggleState": "off"}}})));
        deep_merge(&mut state, object(json!({"power": {"powerState": "on"}})));

        assert_eq!(
            Value::Object(state),
            json!({
                "toggle": {"1": {"toggleState": "on"}, "2": {"toggleState": "off"}},
                "power": {"powerState": "on"}
            })
        );
    }

    #[test]
    fn test_scalar_replaced() {
        let mut state = object(json!({"a": {"b": 1}}));
        deep_merge(&mut state, object(json!({"a": {"b": 2}})));
        assert_eq!(Value::Object(state), json!({"a": {"b": 2}}));
    }
}
