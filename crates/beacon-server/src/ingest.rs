//! The ingest pipeline.
//!
//! One event's path: decode/validate (contract) → branch enrichment →
//! metadata truncation → pricing fallback → transactional persistence
//! (store) → broadcast. Batch ingest validates items independently and
//! persists the accepted ones in a single transaction.

use serde_json::{json, Value};
use tracing::warn;

use beacon_core::contract::{
    normalize_payload, truncate_metadata, NormalizedEvent, TruncatedMetadata, ValidationError,
};
use beacon_core::pricing::{self, TokenCounts};
use beacon_store::{IngestOutcome, NewEvent};

use crate::state::AppState;

/// Result of a single-event ingest.
#[derive(Debug)]
pub enum IngestResult {
    Created { id: i64 },
    Duplicate,
}

/// Result of a batch ingest.
pub struct BatchResult {
    pub ids: Vec<i64>,
    pub duplicates: usize,
    pub rejected: Vec<BatchRejection>,
}

/// One rejected batch item.
#[derive(Debug, serde::Serialize)]
pub struct BatchRejection {
    pub index: usize,
    pub errors: Vec<ValidationError>,
}

/// A normalized event with its storage-ready derived pieces.
///
/// Owns the truncated metadata string so [`NewEvent`]'s borrows have a
/// stable home across a whole batch.
pub struct PreparedEvent {
    event: NormalizedEvent,
    metadata: TruncatedMetadata,
    cost_usd: Option<f64>,
}

impl PreparedEvent {
    /// Derive everything persistence needs from a normalized event.
    pub async fn assemble(state: &AppState, mut event: NormalizedEvent) -> Self {
        if event.branch.is_none() {
            if let Some(project) = event.project.as_deref() {
                event.branch = state.branches.resolve(project).await;
            }
        }

        let metadata = truncate_metadata(&event.metadata, state.config.max_payload_kb);
        let cost_usd = resolve_cost(&event);
        Self {
            event,
            metadata,
            cost_usd,
        }
    }

    /// Borrowed view for the store.
    pub fn as_new_event(&self) -> NewEvent<'_> {
        NewEvent {
            event_id: self.event.event_id.as_deref(),
            session_id: &self.event.session_id,
            agent_type: &self.event.agent_type,
            event_type: &self.event.event_type,
            tool_name: self.event.tool_name.as_deref(),
            status: &self.event.status,
            tokens_in: self.event.tokens_in,
            tokens_out: self.event.tokens_out,
            branch: self.event.branch.as_deref(),
            project: self.event.project.as_deref(),
            duration_ms: self.event.duration_ms,
            client_timestamp: self.event.client_timestamp.as_deref(),
            metadata: &self.metadata.json,
            payload_truncated: self.metadata.truncated,
            model: self.event.model.as_deref(),
            cost_usd: self.cost_usd,
            cache_read_tokens: self.event.cache_read_tokens,
            cache_write_tokens: self.event.cache_write_tokens,
            source: self.event.source.as_deref().unwrap_or("api"),
        }
    }
}

/// A client-supplied cost wins; otherwise price the request when a model
/// and some token volume are present.
fn resolve_cost(event: &NormalizedEvent) -> Option<f64> {
    if event.cost_usd.is_some() {
        return event.cost_usd;
    }
    let model = event.model.as_deref()?;
    if event.tokens_in == 0 && event.tokens_out == 0 {
        return None;
    }
    pricing::calculate_cost(
        model,
        TokenCounts {
            input: event.tokens_in,
            output: event.tokens_out,
            cache_read: event.cache_read_tokens,
            cache_write: event.cache_write_tokens,
        },
    )
}

/// Ingest one raw payload.
pub async fn ingest_one(
    state: &AppState,
    body: Value,
) -> Result<Result<IngestResult, Vec<ValidationError>>, beacon_store::StoreError> {
    let event = match normalize_payload(body) {
        Ok(event) => event,
        Err(errors) => return Ok(Err(errors)),
    };
    let outcome = ingest_normalized(state, event).await?;
    Ok(Ok(outcome))
}

/// Ingest an already-normalized event (shared with the OTLP path and
/// in-process importers).
pub async fn ingest_normalized(
    state: &AppState,
    event: NormalizedEvent,
) -> Result<IngestResult, beacon_store::StoreError> {
    let prepared = PreparedEvent::assemble(state, event).await;
    let outcome = state.store.ingest(&prepared.as_new_event())?;
    Ok(announce(state, outcome))
}

/// Ingest a batch envelope's items. The caller has already unwrapped the
/// `events` array.
pub async fn ingest_batch(
    state: &AppState,
    items: Vec<Value>,
) -> Result<BatchResult, beacon_store::StoreError> {
    let mut rejected = Vec::new();
    let mut prepared = Vec::new();
    for (index, item) in items.into_iter().enumerate() {
        match normalize_payload(item) {
            Ok(event) => prepared.push(PreparedEvent::assemble(state, event).await),
            Err(errors) => rejected.push(BatchRejection { index, errors }),
        }
    }

    let new_events: Vec<NewEvent<'_>> = prepared.iter().map(PreparedEvent::as_new_event).collect();
    let outcomes = state.store.ingest_many(&new_events)?;

    let mut ids = Vec::new();
    let mut duplicates = 0;
    for outcome in outcomes {
        match announce(state, outcome) {
            IngestResult::Created { id } => ids.push(id),
            IngestResult::Duplicate => duplicates += 1,
        }
    }

    Ok(BatchResult {
        ids,
        duplicates,
        rejected,
    })
}

/// Publish broadcast messages for a persisted event and fold the outcome.
fn announce(state: &AppState, outcome: IngestOutcome) -> IngestResult {
    match outcome {
        IngestOutcome::Duplicate => IngestResult::Duplicate,
        IngestOutcome::Created {
            row,
            session_changed,
        } => {
            let id = row.id;
            let session_id = row.session_id.clone();
            match serde_json::to_value(&row) {
                Ok(payload) => state.hub.publish("event", &payload),
                Err(err) => warn!(error = %err, "failed to serialize event broadcast"),
            }
            if session_changed {
                publish_session_update(state, &session_id);
            }
            IngestResult::Created { id }
        }
    }
}

fn publish_session_update(state: &AppState, session_id: &str) {
    match state.store.get_session(session_id) {
        Ok(Some(session)) => match serde_json::to_value(&session) {
            Ok(payload) => state.hub.publish("session_update", &payload),
            Err(err) => warn!(error = %err, "failed to serialize session broadcast"),
        },
        Ok(None) => {}
        Err(err) => warn!(error = %err, session_id, "session lookup for broadcast failed"),
    }
}

/// Build the single-ingest response body.
pub fn single_response(result: &IngestResult) -> Value {
    match result {
        IngestResult::Created { id } => json!({
            "received": 1,
            "ids": [id],
            "duplicates": 0,
        }),
        IngestResult::Duplicate => json!({
            "received": 0,
            "ids": [],
            "duplicates": 1,
        }),
    }
}

/// Build the batch response body.
pub fn batch_response(result: &BatchResult) -> Value {
    json!({
        "received": result.ids.len(),
        "ids": result.ids,
        "duplicates": result.duplicates,
        "rejected": result.rejected,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::config::Config;
    use beacon_store::{EventFilters, Store};
    use serde_json::json;

    fn state() -> AppState {
        let config = Config::resolve(|_| None, std::path::Path::new("."));
        AppState::new(config, Store::in_memory().unwrap())
    }

    fn payload(event_id: Option<&str>) -> Value {
        let mut body = json!({
            "session_id": "s-1",
            "agent_type": "claude_code",
            "event_type": "tool_use",
            "tokens_in": 100,
            "tokens_out": 50,
            "cost_usd": 0.01
        });
        if let Some(id) = event_id {
            body["event_id"] = json!(id);
        }
        body
    }

    #[tokio::test]
    async fn valid_event_created() {
        let state = state();
        let result = ingest_one(&state, payload(None)).await.unwrap().unwrap();
        assert!(matches!(result, IngestResult::Created { id: 1 }));
    }

    #[tokio::test]
    async fn invalid_event_returns_field_errors() {
        let state = state();
        let errors = ingest_one(&state, json!({"agent_type": "x"}))
            .await
            .unwrap()
            .unwrap_err();
        assert!(errors.iter().any(|e| e.field == "session_id"));
        assert!(errors.iter().any(|e| e.field == "event_type"));
    }

    #[tokio::test]
    async fn duplicate_reported_not_errored() {
        let state = state();
        let _ = ingest_one(&state, payload(Some("evt-1"))).await.unwrap();
        let result = ingest_one(&state, payload(Some("evt-1")))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, IngestResult::Duplicate));
    }

    #[tokio::test]
    async fn cost_computed_when_absent() {
        let state = state();
        let body = json!({
            "session_id": "s-1",
            "agent_type": "codex",
            "event_type": "llm_response",
            "model": "o3",
            "tokens_in": 1000000,
            "tokens_out": 0
        });
        let _ = ingest_one(&state, body).await.unwrap().unwrap();
        let (rows, _) = state.store.query_events(&EventFilters::default()).unwrap();
        assert!((rows[0].cost_usd.unwrap() - 2.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn client_cost_preserved_verbatim() {
        let state = state();
        let body = json!({
            "session_id": "s-1",
            "agent_type": "codex",
            "event_type": "llm_response",
            "model": "o3",
            "tokens_in": 1000000,
            "cost_usd": 0.42
        });
        let _ = ingest_one(&state, body).await.unwrap().unwrap();
        let (rows, _) = state.store.query_events(&EventFilters::default()).unwrap();
        assert!((rows[0].cost_usd.unwrap() - 0.42).abs() < 1e-12);
    }

    #[tokio::test]
    async fn no_cost_without_token_volume() {
        let state = state();
        let body = json!({
            "session_id": "s-1",
            "agent_type": "codex",
            "event_type": "llm_request",
            "model": "o3"
        });
        let _ = ingest_one(&state, body).await.unwrap().unwrap();
        let (rows, _) = state.store.query_events(&EventFilters::default()).unwrap();
        assert!(rows[0].cost_usd.is_none());
    }

    #[tokio::test]
    async fn oversized_metadata_truncated_on_the_way_in() {
        let state = state(); // 10 KiB default cap
        let body = json!({
            "session_id": "s-1",
            "agent_type": "codex",
            "event_type": "tool_use",
            "metadata": {"command": "pnpm test", "blob": "x".repeat(20_000)}
        });
        let _ = ingest_one(&state, body).await.unwrap().unwrap();
        let (rows, _) = state.store.query_events(&EventFilters::default()).unwrap();
        assert_eq!(rows[0].payload_truncated, 1);
        assert!(rows[0].metadata.len() <= 10 * 1024);
        let meta: Value = serde_json::from_str(&rows[0].metadata).unwrap();
        assert_eq!(meta["command"], "pnpm test");
        assert_eq!(meta["_truncated"], true);
    }

    #[tokio::test]
    async fn created_event_broadcast_to_subscribers() {
        let state = state();
        let mut sub =
            crate::sse::SseHub::subscribe(&state.hub, crate::sse::SubscriberFilter::default())
                .unwrap();
        let _ = sub.rx.recv().await; // connected

        let _ = ingest_one(&state, payload(None)).await.unwrap().unwrap();

        let frame: Value = serde_json::from_str(&sub.rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "event");
        assert_eq!(frame["payload"]["session_id"], "s-1");

        // New session: a session_update follows.
        let frame: Value = serde_json::from_str(&sub.rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "session_update");
        assert_eq!(frame["payload"]["status"], "active");
    }

    #[tokio::test]
    async fn duplicates_do_not_broadcast() {
        let state = state();
        let _ = ingest_one(&state, payload(Some("evt-1"))).await.unwrap();

        let mut sub =
            crate::sse::SseHub::subscribe(&state.hub, crate::sse::SubscriberFilter::default())
                .unwrap();
        let _ = sub.rx.recv().await;

        let _ = ingest_one(&state, payload(Some("evt-1"))).await.unwrap();
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn batch_mixed_validity() {
        let state = state();
        let _ = ingest_one(&state, payload(Some("known"))).await.unwrap();

        let items = vec![
            payload(Some("fresh")),
            payload(Some("known")),
            json!({"session_id": "s-1", "agent_type": "codex"}),
            json!({"session_id": "", "agent_type": "codex", "event_type": "tool_use"}),
        ];
        let result = ingest_batch(&state, items).await.unwrap();
        assert_eq!(result.ids.len(), 1);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.rejected.len(), 2);
        assert_eq!(result.rejected[0].index, 2);
        assert!(result.rejected[0].errors.iter().any(|e| e.field == "event_type"));
        assert_eq!(result.rejected[1].index, 3);
        assert!(result.rejected[1].errors.iter().any(|e| e.field == "session_id"));
    }

    #[tokio::test]
    async fn batch_response_shape() {
        let result = BatchResult {
            ids: vec![4, 5],
            duplicates: 1,
            rejected: vec![],
        };
        let body = batch_response(&result);
        assert_eq!(body["received"], 2);
        assert_eq!(body["ids"], json!([4, 5]));
        assert_eq!(body["duplicates"], 1);
        assert_eq!(body["rejected"], json!([]));
    }

    #[tokio::test]
    async fn single_response_shapes() {
        let created = single_response(&IngestResult::Created { id: 9 });
        assert_eq!(created["received"], 1);
        assert_eq!(created["ids"], json!([9]));

        let duplicate = single_response(&IngestResult::Duplicate);
        assert_eq!(duplicate["received"], 0);
        assert_eq!(duplicate["duplicates"], 1);
    }
}
