//! Database row types.
//!
//! These mirror the raw table shapes. `metadata` stays a JSON string — the
//! dashboard parses it client-side, and keeping it opaque here avoids a
//! decode/encode round-trip on every read.

use rusqlite::Row;
use serde::Serialize;

/// Raw row from `agents`.
#[derive(Clone, Debug, Serialize)]
pub struct AgentRow {
    pub id: String,
    pub agent_type: String,
    pub name: Option<String>,
    pub registered_at: String,
    pub last_seen_at: String,
}

impl AgentRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            agent_type: row.get("agent_type")?,
            name: row.get("name")?,
            registered_at: row.get("registered_at")?,
            last_seen_at: row.get("last_seen_at")?,
        })
    }
}

/// Raw row from `sessions`.
#[derive(Clone, Debug, Serialize)]
pub struct SessionRow {
    pub id: String,
    pub agent_id: String,
    pub agent_type: String,
    pub project: Option<String>,
    pub branch: Option<String>,
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub last_event_at: String,
    pub metadata: String,
}

impl SessionRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            agent_id: row.get("agent_id")?,
            agent_type: row.get("agent_type")?,
            project: row.get("project")?,
            branch: row.get("branch")?,
            status: row.get("status")?,
            started_at: row.get("started_at")?,
            ended_at: row.get("ended_at")?,
            last_event_at: row.get("last_event_at")?,
            metadata: row.get("metadata")?,
        })
    }
}

/// Raw row from `events`.
#[derive(Clone, Debug, Serialize)]
pub struct EventRow {
    pub id: i64,
    pub event_id: Option<String>,
    pub session_id: String,
    pub agent_type: String,
    pub event_type: String,
    pub tool_name: Option<String>,
    pub status: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub branch: Option<String>,
    pub project: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: String,
    pub client_timestamp: Option<String>,
    pub metadata: String,
    pub payload_truncated: i64,
    pub model: Option<String>,
    pub cost_usd: Option<f64>,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub source: String,
}

impl EventRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            session_id: row.get("session_id")?,
            agent_type: row.get("agent_type")?,
            event_type: row.get("event_type")?,
            tool_name: row.get("tool_name")?,
            status: row.get("status")?,
            tokens_in: row.get("tokens_in")?,
            tokens_out: row.get("tokens_out")?,
            branch: row.get("branch")?,
            project: row.get("project")?,
            duration_ms: row.get("duration_ms")?,
            created_at: row.get("created_at")?,
            client_timestamp: row.get("client_timestamp")?,
            metadata: row.get("metadata")?,
            payload_truncated: row.get("payload_truncated")?,
            model: row.get("model")?,
            cost_usd: row.get("cost_usd")?,
            cache_read_tokens: row.get("cache_read_tokens")?,
            cache_write_tokens: row.get("cache_write_tokens")?,
            source: row.get("source")?,
        })
    }
}

/// Raw row from `import_state`.
#[derive(Clone, Debug, Serialize)]
pub struct ImportStateRow {
    pub source: String,
    pub file_path: String,
    pub file_hash: String,
    pub file_size: Option<i64>,
    pub events_imported: i64,
    pub imported_at: String,
}

impl ImportStateRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source: row.get("source")?,
            file_path: row.get("file_path")?,
            file_hash: row.get("file_hash")?,
            file_size: row.get("file_size")?,
            events_imported: row.get("events_imported")?,
            imported_at: row.get("imported_at")?,
        })
    }
}
