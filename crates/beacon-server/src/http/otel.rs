//! OTLP JSON endpoints.
//!
//! Logs and metrics parse into normalized events and ride the same
//! ingest pipeline as direct HTTP producers; traces are accepted and
//! discarded. Protobuf content is turned away with a hint to switch the
//! exporter to JSON.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde_json::{json, Value};
use tracing::warn;

use super::error::ApiError;
use crate::ingest;
use crate::otel::{parse_logs, parse_metrics};
use crate::state::AppState;

fn reject_protobuf(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if content_type.contains("protobuf") {
        return Err(ApiError::Unsupported);
    }
    Ok(())
}

fn parse_json(body: &Bytes) -> Result<Value, ApiError> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|_| ApiError::InvalidEnvelope("Invalid JSON payload"))
}

/// POST /api/otel/v1/logs
pub async fn logs_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    reject_protobuf(&headers)?;
    let payload = parse_json(&body)?;

    for event in parse_logs(&payload) {
        if let Err(err) = ingest::ingest_normalized(&state, event).await {
            warn!(error = %err, "otel log event insert failed");
        }
    }
    Ok((StatusCode::OK, Json(json!({}))))
}

/// POST /api/otel/v1/metrics
pub async fn metrics_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    reject_protobuf(&headers)?;
    let payload = parse_json(&body)?;

    let deltas = {
        let mut counters = state.otel_counters.lock();
        parse_metrics(&payload, &mut counters)
    };

    for delta in deltas {
        if !delta.has_signal() {
            continue;
        }
        if let Err(err) = ingest::ingest_normalized(&state, delta.into_event()).await {
            warn!(error = %err, "otel metric event insert failed");
        }
    }
    Ok((StatusCode::OK, Json(json!({}))))
}

/// POST /api/otel/v1/traces — accepted stub.
pub async fn traces_handler(headers: HeaderMap, _body: Bytes) -> Result<impl IntoResponse, ApiError> {
    reject_protobuf(&headers)?;
    Ok((StatusCode::OK, Json(json!({}))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protobuf_content_types_rejected() {
        for content_type in ["application/x-protobuf", "application/protobuf"] {
            let mut headers = HeaderMap::new();
            let _ = headers.insert("content-type", content_type.parse().unwrap());
            assert!(reject_protobuf(&headers).is_err());
        }
    }

    #[test]
    fn json_and_absent_content_types_accepted() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("content-type", "application/json".parse().unwrap());
        assert!(reject_protobuf(&headers).is_ok());
        assert!(reject_protobuf(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn empty_body_parses_to_empty_object() {
        let value = parse_json(&Bytes::new()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn malformed_body_rejected() {
        assert!(parse_json(&Bytes::from_static(b"protobuf-bytes")).is_err());
    }
}
