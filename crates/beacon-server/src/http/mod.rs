//! HTTP surface: route table and handlers, all under `/api`.

pub mod error;
pub mod events;
pub mod health;
pub mod otel;
pub mod sessions;
pub mod stats;
pub mod stream;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Every `/api` route, ready to be stacked with middleware and state.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health::health_handler))
        .route(
            "/api/events",
            post(events::ingest_single_handler).get(events::list_events_handler),
        )
        .route("/api/events/batch", post(events::ingest_batch_handler))
        .route("/api/stats", get(stats::stats_handler))
        .route("/api/stats/tools", get(stats::tools_handler))
        .route("/api/stats/cost", get(stats::cost_handler))
        .route("/api/stats/usage-monitor", get(stats::usage_monitor_handler))
        .route("/api/sessions", get(sessions::list_handler))
        .route("/api/sessions/{id}", get(sessions::detail_handler))
        .route(
            "/api/sessions/{id}/transcript",
            get(sessions::transcript_handler),
        )
        .route("/api/filter-options", get(stats::filter_options_handler))
        .route("/api/stream", get(stream::stream_handler))
        .route("/api/otel/v1/logs", post(otel::logs_handler))
        .route("/api/otel/v1/metrics", post(otel::metrics_handler))
        .route("/api/otel/v1/traces", post(otel::traces_handler))
}
