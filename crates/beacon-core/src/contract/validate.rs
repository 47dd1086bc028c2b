//! Payload validation and normalization.
//!
//! All field errors for a payload are accumulated and returned together;
//! a payload is either fully accepted or fully rejected.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::decode::unwrap_nested_json;
use super::event::{NormalizedEvent, ValidationError, EVENT_SOURCES, EVENT_STATUSES, EVENT_TYPES};

/// Validate and normalize a raw inbound body.
///
/// Tolerates double-encoded bodies (see [`unwrap_nested_json`]). Returns
/// every field violation at once on rejection.
pub fn normalize_payload(body: Value) -> Result<NormalizedEvent, Vec<ValidationError>> {
    let body = unwrap_nested_json(body);
    let Some(map) = body.as_object() else {
        return Err(vec![ValidationError::new(
            "body",
            "must be a JSON object",
        )]);
    };

    let mut errors = Vec::new();

    let session_id = required_string(map, "session_id", &mut errors);
    let agent_type = required_string(map, "agent_type", &mut errors);
    let event_type = required_string(map, "event_type", &mut errors);

    if !event_type.is_empty() && !EVENT_TYPES.contains(&event_type.as_str()) {
        errors.push(ValidationError::new(
            "event_type",
            format!("must be one of: {}", EVENT_TYPES.join(", ")),
        ));
    }

    let status = normalize_status(map, &event_type, &mut errors);
    let source = optional_string(map, "source", &mut errors);
    if let Some(src) = source.as_deref() {
        if !EVENT_SOURCES.contains(&src) {
            errors.push(ValidationError::new(
                "source",
                format!("must be one of: {}", EVENT_SOURCES.join(", ")),
            ));
        }
    }

    let event_id = optional_string(map, "event_id", &mut errors);
    let tool_name = optional_string(map, "tool_name", &mut errors);
    let branch = optional_string(map, "branch", &mut errors);
    let project = optional_string(map, "project", &mut errors);
    let model = optional_string(map, "model", &mut errors);

    let tokens_in = token_count(map, "tokens_in", &mut errors);
    let tokens_out = token_count(map, "tokens_out", &mut errors);
    let cache_read_tokens = token_count(map, "cache_read_tokens", &mut errors);
    let cache_write_tokens = token_count(map, "cache_write_tokens", &mut errors);
    let duration_ms = duration(map, &mut errors);
    let cost_usd = cost(map, &mut errors);
    let client_timestamp = client_timestamp(map, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NormalizedEvent {
        event_id,
        session_id,
        agent_type,
        event_type,
        tool_name,
        status,
        tokens_in,
        tokens_out,
        cache_read_tokens,
        cache_write_tokens,
        branch,
        project,
        duration_ms,
        metadata: map
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
        client_timestamp,
        model,
        cost_usd,
        source,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Field extractors
// ─────────────────────────────────────────────────────────────────────────────

fn required_string(
    map: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<ValidationError>,
) -> String {
    match map.get(field) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                errors.push(ValidationError::new(field, "must be a non-empty string"));
            }
            trimmed.to_string()
        }
        _ => {
            errors.push(ValidationError::new(field, "must be a string"));
            String::new()
        }
    }
}

fn optional_string(
    map: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            errors.push(ValidationError::new(
                field,
                "must be a string when provided",
            ));
            None
        }
    }
}

/// Token counts: missing defaults to 0, a negative number clamps to 0,
/// anything non-numeric is a field error.
fn token_count(map: &Map<String, Value>, field: &str, errors: &mut Vec<ValidationError>) -> i64 {
    match map.get(field) {
        None | Some(Value::Null) => 0,
        Some(Value::Number(n)) => whole_number(n)
            .map(|i| i.max(0))
            .unwrap_or_else(|| {
                errors.push(ValidationError::new(
                    field,
                    "must be an integer when provided",
                ));
                0
            }),
        Some(_) => {
            errors.push(ValidationError::new(
                field,
                "must be an integer when provided",
            ));
            0
        }
    }
}

/// Duration: missing or negative becomes null; non-numeric is an error.
fn duration(map: &Map<String, Value>, errors: &mut Vec<ValidationError>) -> Option<i64> {
    match map.get("duration_ms") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match whole_number(n) {
            Some(i) if i >= 0 => Some(i),
            Some(_) => None,
            None => {
                errors.push(ValidationError::new(
                    "duration_ms",
                    "must be an integer when provided",
                ));
                None
            }
        },
        Some(_) => {
            errors.push(ValidationError::new(
                "duration_ms",
                "must be an integer when provided",
            ));
            None
        }
    }
}

fn cost(map: &Map<String, Value>, errors: &mut Vec<ValidationError>) -> Option<f64> {
    match map.get("cost_usd") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f >= 0.0 => Some(f),
            _ => {
                errors.push(ValidationError::new(
                    "cost_usd",
                    "must be a non-negative number when provided",
                ));
                None
            }
        },
        Some(_) => {
            errors.push(ValidationError::new(
                "cost_usd",
                "must be a non-negative number when provided",
            ));
            None
        }
    }
}

fn normalize_status(
    map: &Map<String, Value>,
    event_type: &str,
    errors: &mut Vec<ValidationError>,
) -> String {
    let default = if event_type == "error" { "error" } else { "success" };
    match map.get("status") {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => {
            if !EVENT_STATUSES.contains(&s.as_str()) {
                errors.push(ValidationError::new(
                    "status",
                    format!("must be one of: {}", EVENT_STATUSES.join(", ")),
                ));
            }
            s.clone()
        }
        Some(_) => {
            errors.push(ValidationError::new(
                "status",
                "must be a string when provided",
            ));
            default.to_string()
        }
    }
}

/// Parse the client timestamp as RFC 3339 and re-serialize as UTC.
fn client_timestamp(
    map: &Map<String, Value>,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    match map.get("client_timestamp") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(parsed) => Some(
                parsed
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            Err(_) => {
                errors.push(ValidationError::new(
                    "client_timestamp",
                    "must be an ISO-8601 timestamp with timezone",
                ));
                None
            }
        },
        Some(_) => {
            errors.push(ValidationError::new(
                "client_timestamp",
                "must be an ISO-8601 timestamp string when provided",
            ));
            None
        }
    }
}

/// A JSON number as a whole i64, accepting float encodings of integers.
fn whole_number(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Some(f as i64)
        }
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
