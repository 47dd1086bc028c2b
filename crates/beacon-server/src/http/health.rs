//! `/api/health` — process health and live counters.

use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Seconds since startup.
    pub uptime: u64,
    pub db_size_bytes: u64,
    pub sse_clients: usize,
}

/// Build a health response from live counters.
pub fn health_snapshot(start_time: Instant, db_size_bytes: u64, sse_clients: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime: start_time.elapsed().as_secs(),
        db_size_bytes,
        sse_clients,
    }
}

/// GET /api/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_snapshot(
        state.start_time,
        state.store.db_size_bytes(),
        state.hub.client_count(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_counters() {
        let snapshot = health_snapshot(Instant::now(), 4096, 2);
        assert_eq!(snapshot.status, "ok");
        assert_eq!(snapshot.db_size_bytes, 4096);
        assert_eq!(snapshot.sse_clients, 2);
        assert!(snapshot.uptime < 2);
    }

    #[test]
    fn serializes_expected_keys() {
        let json = serde_json::to_value(health_snapshot(Instant::now(), 0, 0)).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime"].is_number());
        assert!(json["db_size_bytes"].is_number());
        assert!(json["sse_clients"].is_number());
    }
}
