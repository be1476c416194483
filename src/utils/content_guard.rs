use serde_json::{json, Value};
use std::fmt::Display;

/// Builds the `{"error": "<message>"}` body returned by every failing tool call.
/// Tool output is always valid JSON, failures included.
pub fn error_payload(message: impl Display) -> String {
    json!({ "error": message.to_string() }).to_string()
}

/// Pretty-prints a successful tool result with two-space indentation.
pub fn render_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

/// Keeps at most `max_items` elements of a list result. Non-positive or absent caps,
/// and non-list values, pass through untouched.
pub fn cap_items(value: Value, max_items: Option<usize>) -> Value {
    match (value, max_items) {
        (Value::Array(mut items), Some(max)) if max > 0 => {
            items.truncate(max);
            Value::Array(items)
        }
        (value, _) => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_is_valid_json() {
        let payload = error_payload("HTTP status 404 for https://x/y: \"not found\"");
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            parsed["error"],
            "HTTP status 404 for https://x/y: \"not found\""
        );
    }

    #[test]
    fn caps_lists_only() {
        let list = json!([1, 2, 3, 4]);
        assert_eq!(cap_items(list.clone(), Some(2)), json!([1, 2]));
        assert_eq!(cap_items(list.clone(), Some(0)), list);
        assert_eq!(cap_items(list.clone(), None), list);
        assert_eq!(cap_items(json!({ "a": 1 }), Some(1)), json!({ "a": 1 }));
    }

    #[test]
    fn renders_with_two_space_indent() {
        let rendered = render_json(&json!({ "a": [1] })).unwrap();
        assert_eq!(rendered, "{\n  \"a\": [\n    1\n  ]\n}");
    }
}
