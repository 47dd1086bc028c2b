//! Session listing, detail and transcript handlers.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_store::SessionFilters;

use super::error::ApiError;
use crate::state::AppState;

const DEFAULT_DETAIL_EVENTS: i64 = 10;

/// Query-string filters for the session list.
#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    status: Option<String>,
    exclude_status: Option<String>,
    agent_type: Option<String>,
    since: Option<String>,
    limit: Option<String>,
}

/// GET /api/sessions
pub async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Value>, ApiError> {
    let filters = SessionFilters {
        status: query.status,
        exclude_status: query.exclude_status,
        agent_type: query.agent_type,
        since: query.since,
        limit: query.limit.as_deref().and_then(|raw| raw.trim().parse().ok()),
    };
    let sessions = state.store.list_sessions(&filters)?;
    let total = sessions.len();
    Ok(Json(json!({ "sessions": sessions, "total": total })))
}

/// Query options for session detail.
#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    event_limit: Option<String>,
    limit: Option<String>,
}

/// GET /api/sessions/{id} — detail plus most recent events.
pub async fn detail_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .store
        .get_session(&session_id)?
        .ok_or(ApiError::NotFound("Session not found"))?;

    let requested = query
        .event_limit
        .as_deref()
        .or(query.limit.as_deref())
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_DETAIL_EVENTS);
    let limit = requested.clamp(0, state.config.max_feed as i64);

    let events = state.store.recent_session_events(&session_id, limit)?;
    Ok(Json(json!({ "session": session, "events": events })))
}

/// GET /api/sessions/{id}/transcript
pub async fn transcript_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.store.get_session(&session_id)?.is_none() {
        return Err(ApiError::NotFound("Session not found"));
    }
    let entries = state.store.session_transcript(&session_id)?;
    Ok(Json(json!({ "session_id": session_id, "entries": entries })))
}
