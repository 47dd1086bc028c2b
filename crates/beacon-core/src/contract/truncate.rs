//! Byte-capped metadata truncation.
//!
//! Metadata is measured as the UTF-8 byte length of its canonical JSON
//! serialization. Oversized objects collapse to a summary that preserves a
//! fixed set of priority keys; oversized strings keep a prefix cut at a
//! char boundary so multi-byte characters are never split.

use serde_json::{Map, Value};

/// Keys preserved verbatim in a truncation summary, in priority order.
const PRIORITY_KEYS: &[&str] = &[
    "command",
    "file_path",
    "query",
    "pattern",
    "error",
    "message",
    "tool_name",
    "path",
    "type",
];

/// Serialized metadata plus whether truncation occurred.
pub struct TruncatedMetadata {
    /// Canonical JSON (or raw string for string metadata), guaranteed to
    /// fit within the byte cap.
    pub json: String,
    pub truncated: bool,
}

/// Fit `metadata` within `max_payload_kb` KiB.
pub fn truncate_metadata(metadata: &Value, max_payload_kb: usize) -> TruncatedMetadata {
    let max_bytes = max_payload_kb * 1024;

    // String metadata is stored raw, so it is also truncated raw.
    if let Value::String(s) = metadata {
        if s.len() <= max_bytes {
            return TruncatedMetadata {
                json: s.clone(),
                truncated: false,
            };
        }
        return TruncatedMetadata {
            json: utf8_prefix(s, max_bytes).to_string(),
            truncated: true,
        };
    }

    let serialized = serde_json::to_string(metadata)
        .unwrap_or_else(|_| r#"{"_serialization_error":true}"#.to_string());
    if serialized.len() <= max_bytes {
        return TruncatedMetadata {
            json: serialized,
            truncated: false,
        };
    }

    let summary = match metadata {
        Value::Object(obj) => object_summary(obj, serialized.len()),
        _ => generic_summary(serialized.len()),
    };

    // Priority values may themselves be large; never exceed the cap.
    let json = if summary.len() <= max_bytes {
        summary
    } else {
        utf8_prefix(&summary, max_bytes).to_string()
    };

    TruncatedMetadata {
        json,
        truncated: true,
    }
}

/// Longest prefix of `input` that fits in `max_bytes` without splitting a
/// multi-byte character.
fn utf8_prefix(input: &str, max_bytes: usize) -> &str {
    if input.len() <= max_bytes {
        return input;
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

fn object_summary(obj: &Map<String, Value>, original_bytes: usize) -> String {
    let mut summary = Map::new();
    summary.insert("_truncated".into(), Value::Bool(true));
    summary.insert("_original_bytes".into(), Value::from(original_bytes));
    for &key in PRIORITY_KEYS {
        if let Some(value) = obj.get(key) {
            summary.insert(key.into(), value.clone());
        }
    }
    serde_json::to_string(&Value::Object(summary))
        .unwrap_or_else(|_| r#"{"_serialization_error":true}"#.to_string())
}

fn generic_summary(original_bytes: usize) -> String {
    serde_json::json!({
        "_truncated": true,
        "_original_bytes": original_bytes,
    })
    .to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_object_untouched() {
        let result = truncate_metadata(&json!({"command": "ls"}), 10);
        assert!(!result.truncated);
        assert_eq!(result.json, r#"{"command":"ls"}"#);
    }

    #[test]
    fn oversized_object_keeps_priority_keys() {
        let meta = json!({
            "command": "pnpm test",
            "file_path": "/src/app.ts",
            "blob": "x".repeat(4096),
        });
        let result = truncate_metadata(&meta, 1);
        assert!(result.truncated);
        assert!(result.json.len() <= 1024);

        let parsed: Value = serde_json::from_str(&result.json).unwrap();
        assert_eq!(parsed["_truncated"], true);
        assert!(parsed["_original_bytes"].as_u64().unwrap() > 4096);
        assert_eq!(parsed["command"], "pnpm test");
        assert_eq!(parsed["file_path"], "/src/app.ts");
        assert!(parsed.get("blob").is_none());
    }

    #[test]
    fn multibyte_blob_truncates_within_cap() {
        let meta = json!({
            "command": "pnpm test",
            "blob": "\u{1F600}".repeat(1200),
        });
        let result = truncate_metadata(&meta, 1);
        assert!(result.truncated);
        assert!(result.json.len() <= 1024);
        let parsed: Value = serde_json::from_str(&result.json).unwrap();
        assert_eq!(parsed["command"], "pnpm test");
    }

    #[test]
    fn string_metadata_kept_when_small() {
        let result = truncate_metadata(&Value::String("short note".into()), 1);
        assert!(!result.truncated);
        assert_eq!(result.json, "short note");
    }

    #[test]
    fn string_metadata_cut_at_char_boundary() {
        // 255 'a's then a 4-byte emoji: the emoji straddles the 256-byte mark.
        let mut s = "a".repeat(255);
        s.push('\u{1F600}');
        s.push_str(&"b".repeat(2048));
        let result = truncate_metadata(&Value::String(s), 1);
        assert!(result.truncated);
        assert!(result.json.len() <= 1024);
        assert!(result.json.is_char_boundary(result.json.len()));
    }

    #[test]
    fn array_metadata_gets_generic_summary() {
        let meta = Value::Array(vec![json!("x".repeat(2048))]);
        let result = truncate_metadata(&meta, 1);
        assert!(result.truncated);
        let parsed: Value = serde_json::from_str(&result.json).unwrap();
        assert_eq!(parsed["_truncated"], true);
        assert!(parsed["_original_bytes"].is_number());
    }

    #[test]
    fn oversized_priority_value_still_respects_cap() {
        let meta = json!({"error": "e".repeat(4096)});
        let result = truncate_metadata(&meta, 1);
        assert!(result.truncated);
        assert!(result.json.len() <= 1024);
    }

    #[test]
    fn zero_cap_yields_empty_string_metadata() {
        let result = truncate_metadata(&Value::String("anything".into()), 0);
        assert!(result.truncated);
        assert!(result.json.is_empty());
    }

    #[test]
    fn utf8_prefix_never_splits() {
        let s = "ab\u{00E9}cd"; // é is two bytes, at offset 2..4
        assert_eq!(utf8_prefix(s, 3), "ab");
        assert_eq!(utf8_prefix(s, 4), "ab\u{00E9}");
        assert_eq!(utf8_prefix(s, 100), s);
    }

    #[test]
    fn exact_fit_is_not_truncated() {
        let meta = Value::String("a".repeat(1024));
        let result = truncate_metadata(&meta, 1);
        assert!(!result.truncated);
        assert_eq!(result.json.len(), 1024);
    }
}
