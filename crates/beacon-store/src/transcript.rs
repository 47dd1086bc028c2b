//! Transcript reconstruction.
//!
//! Projects a session's chronological event stream into role-tagged
//! entries the dashboard can render as a conversation. The projection is
//! finite and read-only — it never mutates the underlying events.

use serde::Serialize;
use serde_json::Value;

use crate::rows::EventRow;

/// One rendered transcript line.
#[derive(Clone, Debug, Serialize)]
pub struct TranscriptEntry {
    pub role: &'static str,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub timestamp: String,
}

/// Project chronological events into transcript entries.
pub fn project(events: Vec<EventRow>) -> Vec<TranscriptEntry> {
    events.into_iter().map(to_entry).collect()
}

fn role(event_type: &str) -> &'static str {
    match event_type {
        "session_start" | "session_end" => "system",
        "user_prompt" => "user",
        "tool_use" => "tool",
        "error" => "error",
        _ => "assistant",
    }
}

fn to_entry(event: EventRow) -> TranscriptEntry {
    let detail = extract_detail(&event);
    TranscriptEntry {
        role: role(&event.event_type),
        entry_type: event.event_type,
        tool_name: event.tool_name,
        detail,
        status: (event.status != "success").then_some(event.status),
        model: event.model,
        tokens_in: (event.tokens_in > 0).then_some(event.tokens_in),
        tokens_out: (event.tokens_out > 0).then_some(event.tokens_out),
        cost_usd: event.cost_usd.filter(|c| *c > 0.0),
        duration_ms: event.duration_ms,
        timestamp: event.client_timestamp.unwrap_or(event.created_at),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

/// Best human-readable one-liner buried in the metadata, if any.
fn extract_detail(event: &EventRow) -> Option<String> {
    let meta: Value = serde_json::from_str(&event.metadata).ok()?;
    let obj = meta.as_object()?;

    if event.event_type == "user_prompt" {
        if let Some(message) = obj.get("message").and_then(scalar) {
            return Some(message);
        }
    }
    for key in ["content_preview", "command", "file_path", "pattern", "query"] {
        if let Some(value) = obj.get(key).and_then(scalar) {
            return Some(value);
        }
    }
    if let Some(error) = obj.get("error") {
        if let Some(value) = scalar(error) {
            return Some(value);
        }
        if let Some(message) = error
            .as_object()
            .and_then(|e| e.get("message"))
            .and_then(scalar)
        {
            return Some(message);
        }
    }
    obj.get("diff_preview").and_then(scalar)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
