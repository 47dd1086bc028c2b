//! Aggregation endpoints: stats, tool analytics, cost, filter options,
//! usage monitor.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use beacon_store::StatsFilters;

use super::error::ApiError;
use crate::state::AppState;

/// Shared query filters for the aggregation endpoints.
#[derive(Debug, Deserialize)]
pub struct AggregationQuery {
    agent_type: Option<String>,
    since: Option<String>,
}

impl AggregationQuery {
    fn filters(self) -> StatsFilters {
        StatsFilters {
            agent_type: self.agent_type,
            since: self.since,
        }
    }
}

/// GET /api/stats
pub async fn stats_handler(
    State(state): State<AppState>,
    Query(query): Query<AggregationQuery>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.store.stats(&query.filters())?;
    Ok(Json(serde_json::to_value(&stats).map_err(
        beacon_store::StoreError::from,
    )?))
}

/// GET /api/stats/tools
pub async fn tools_handler(
    State(state): State<AppState>,
    Query(query): Query<AggregationQuery>,
) -> Result<Json<Value>, ApiError> {
    let tools = state.store.tool_analytics(&query.filters())?;
    Ok(Json(json!({ "tools": tools })))
}

/// GET /api/stats/cost
pub async fn cost_handler(
    State(state): State<AppState>,
    Query(query): Query<AggregationQuery>,
) -> Result<Json<Value>, ApiError> {
    let breakdown = state.store.cost_breakdown(&query.filters())?;
    Ok(Json(serde_json::to_value(&breakdown).map_err(
        beacon_store::StoreError::from,
    )?))
}

/// GET /api/stats/usage-monitor
pub async fn usage_monitor_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let usage = state.store.usage_monitor(&state.config.usage_monitor)?;
    Ok(Json(serde_json::to_value(&usage).map_err(
        beacon_store::StoreError::from,
    )?))
}

/// GET /api/filter-options
pub async fn filter_options_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    let options = state.store.filter_options()?;
    Ok(Json(serde_json::to_value(&options).map_err(
        beacon_store::StoreError::from,
    )?))
}
