//! Central error mapping.
//!
//! Every handler funnels failures through [`ApiError`], which renders the
//! uniform `{error, details?}` JSON body. No HTML error pages, ever;
//! duplicates are a success mode and never appear here.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use beacon_core::contract::ValidationError;
use beacon_store::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failure modes surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Contract rejection: 400 with field details.
    #[error("invalid payload")]
    InvalidPayload(Vec<ValidationError>),

    /// Malformed request envelope: 400.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// Unknown resource: 404.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Unsupported media type (protobuf on OTLP routes): 415.
    #[error("unsupported media type")]
    Unsupported,

    /// SSE registry full: 503 echoing the bound.
    #[error("sse registry saturated")]
    Saturated { max_clients: usize },

    /// Store failure: 500; the server keeps running.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidPayload(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid event payload", "details": details })),
            )
                .into_response(),
            Self::InvalidEnvelope(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Self::Unsupported => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(json!({
                    "error": "Protobuf not supported. Use JSON format.",
                    "hint": "Set OTEL_EXPORTER_OTLP_PROTOCOL=http/json",
                })),
            )
                .into_response(),
            Self::Saturated { max_clients } => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "SSE client limit reached", "max_clients": max_clients })),
            )
                .into_response(),
            Self::Store(err) => {
                error!(error = %err, "store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
