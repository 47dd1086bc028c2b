//! Event ingest and feed handlers.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_store::EventFilters;

use super::error::ApiError;
use crate::ingest::{self, IngestResult};
use crate::state::AppState;

const DEFAULT_FEED_LIMIT: i64 = 50;

/// Parse a request body as JSON, with a JSON-shaped 400 on garbage.
fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Err(ApiError::InvalidEnvelope("Request body must be JSON"));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::InvalidEnvelope("Request body must be JSON"))
}

/// POST /api/events — ingest one event.
pub async fn ingest_single_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload = parse_body(&body)?;
    let result = ingest::ingest_one(&state, payload)
        .await?
        .map_err(ApiError::InvalidPayload)?;

    let status = match result {
        IngestResult::Created { .. } => StatusCode::CREATED,
        IngestResult::Duplicate => StatusCode::OK,
    };
    Ok((status, Json(ingest::single_response(&result))))
}

/// POST /api/events/batch — ingest many events in one transaction.
pub async fn ingest_batch_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload = parse_body(&body)?;
    let items = payload
        .get("events")
        .and_then(Value::as_array)
        .cloned()
        .ok_or(ApiError::InvalidEnvelope("Expected { events: [...] }"))?;

    let result = ingest::ingest_batch(&state, items).await?;
    Ok((StatusCode::CREATED, Json(ingest::batch_response(&result))))
}

/// Query-string filters for the events feed.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    agent_type: Option<String>,
    event_type: Option<String>,
    tool_name: Option<String>,
    session_id: Option<String>,
    branch: Option<String>,
    model: Option<String>,
    source: Option<String>,
    since: Option<String>,
    until: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
}

/// GET /api/events — filtered feed with total count.
pub async fn list_events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = parse_i64(query.limit.as_deref()).unwrap_or(DEFAULT_FEED_LIMIT);
    // limit=0 stays unbounded; anything else is capped by the feed size.
    let limit = if limit > 0 {
        limit.min(state.config.max_feed as i64)
    } else {
        0
    };

    let filters = EventFilters {
        agent_type: query.agent_type,
        event_type: query.event_type,
        tool_name: query.tool_name,
        session_id: query.session_id,
        branch: query.branch,
        model: query.model,
        source: query.source,
        since: query.since,
        until: query.until,
        limit,
        offset: parse_i64(query.offset.as_deref()).unwrap_or(0).max(0),
    };

    let (events, total) = state.store.query_events(&filters)?;
    Ok(Json(json!({ "events": events, "total": total })))
}

fn parse_i64(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse().ok())
}
