//! Contract types: the closed enums and the normalized event shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of accepted event types. Extending this set is a contract
/// version bump, not a runtime concern.
pub const EVENT_TYPES: &[&str] = &[
    "session_start",
    "session_end",
    "tool_use",
    "user_prompt",
    "llm_request",
    "llm_response",
    "response",
    "error",
    "plan_step",
    "file_change",
    "git_commit",
];

/// Accepted event statuses.
pub const EVENT_STATUSES: &[&str] = &["success", "error", "timeout"];

/// Accepted source tags.
pub const EVENT_SOURCES: &[&str] = &["api", "hook", "otel", "import"];

/// One field-level contract violation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A validated, normalized event ready for persistence.
///
/// String fields are trimmed; token counts are non-negative; `status` and
/// `event_type` are members of their enums; `client_timestamp` is UTC
/// RFC 3339. `metadata` is the raw (not yet truncated) JSON value.
#[derive(Clone, Debug)]
pub struct NormalizedEvent {
    pub event_id: Option<String>,
    pub session_id: String,
    pub agent_type: String,
    pub event_type: String,
    pub tool_name: Option<String>,
    pub status: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub branch: Option<String>,
    pub project: Option<String>,
    pub duration_ms: Option<i64>,
    pub metadata: Value,
    pub client_timestamp: Option<String>,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub source: Option<String>,
}
