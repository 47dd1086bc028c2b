//! Recovery of double-encoded JSON bodies.
//!
//! Some producers stringify their payload once (or twice) before posting
//! it, so the body arrives as a JSON *string* containing JSON. The
//! contract tolerates up to three layers of such wrapping; anything deeper
//! is treated as the string it is.

use serde_json::Value;

const MAX_UNWRAP_DEPTH: usize = 3;

/// Unwrap string-encoded JSON layers, at most three deep.
///
/// A layer is only unwrapped when the trimmed string looks like a JSON
/// container (`{` or `[` prefix); plain strings pass through untouched, as
/// does a layer that fails to parse. The caller still has to check that
/// the final value is an object.
pub fn unwrap_nested_json(value: Value) -> Value {
    let mut current = value;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let inner = match &current {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(parsed) => parsed,
                        Err(_) => break,
                    }
                } else {
                    break;
                }
            }
            _ => break,
        };
        current = inner;
    }
    current
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_object_passes_through() {
        let v = json!({"a": 1});
        assert_eq!(unwrap_nested_json(v.clone()), v);
    }

    #[test]
    fn single_encoded_object_unwraps() {
        let v = Value::String(r#"{"session_id":"s-1"}"#.into());
        let out = unwrap_nested_json(v);
        assert_eq!(out["session_id"], "s-1");
    }

    #[test]
    fn double_encoded_object_unwraps() {
        let inner = r#"{"session_id":"s-1"}"#;
        let once = serde_json::to_string(inner).unwrap();
        let v = Value::String(once);
        let out = unwrap_nested_json(v);
        assert_eq!(out["session_id"], "s-1");
    }

    #[test]
    fn triple_encoded_object_unwraps() {
        let inner = r#"{"ok":true}"#;
        let once = serde_json::to_string(inner).unwrap();
        let twice = serde_json::to_string(&once).unwrap();
        let out = unwrap_nested_json(Value::String(twice));
        assert_eq!(out["ok"], true);
    }

    #[test]
    fn fourth_layer_is_not_unwrapped() {
        let inner = r#"{"ok":true}"#;
        let mut wrapped = inner.to_string();
        for _ in 0..3 {
            wrapped = serde_json::to_string(&wrapped).unwrap();
        }
        // Three unwraps still leave one string layer.
        let out = unwrap_nested_json(Value::String(wrapped));
        assert!(out.is_string());
    }

    #[test]
    fn plain_string_left_alone() {
        let v = Value::String("just text".into());
        assert_eq!(unwrap_nested_json(v.clone()), v);
    }

    #[test]
    fn whitespace_padded_json_string_unwraps() {
        let v = Value::String("  {\"a\":1}  ".into());
        assert_eq!(unwrap_nested_json(v)["a"], 1);
    }

    #[test]
    fn malformed_json_string_left_alone() {
        let v = Value::String("{not valid".into());
        assert_eq!(unwrap_nested_json(v.clone()), v);
    }

    #[test]
    fn encoded_array_unwraps_to_array() {
        let v = Value::String("[1,2,3]".into());
        let out = unwrap_nested_json(v);
        assert!(out.is_array());
    }

    #[test]
    fn non_string_scalars_untouched() {
        assert_eq!(unwrap_nested_json(json!(42)), json!(42));
        assert_eq!(unwrap_nested_json(Value::Null), Value::Null);
    }
}
