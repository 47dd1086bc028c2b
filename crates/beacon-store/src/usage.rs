//! Usage-monitor rollups.
//!
//! For each configured agent kind, two rolling windows over the events
//! table: the session window and the extended window. Token-limited kinds
//! sum `tokens_in + tokens_out`; cost-limited kinds sum `cost_usd`.

use beacon_core::config::{AgentUsageConfig, UsageLimitType, UsageMonitorConfig};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::errors::Result;

/// One rolling window of usage against its limit.
#[derive(Debug, Serialize)]
pub struct UsageWindow {
    pub used: f64,
    pub limit: f64,
    #[serde(rename = "windowHours")]
    pub window_hours: i64,
    #[serde(rename = "limitType")]
    pub limit_type: &'static str,
}

/// Usage rollups for one agent kind.
#[derive(Debug, Serialize)]
pub struct AgentUsage {
    pub agent_type: String,
    pub session: UsageWindow,
    pub extended: UsageWindow,
}

/// Compute both windows for every configured agent kind.
pub fn get_usage_monitor(
    conn: &Connection,
    config: &UsageMonitorConfig,
) -> Result<Vec<AgentUsage>> {
    let mut report = Vec::new();
    for kind in config.configured_kinds() {
        let limits = config.for_agent(kind);
        report.push(AgentUsage {
            agent_type: (*kind).to_string(),
            session: window(conn, kind, limits, limits.session_window_hours, limits.session_limit)?,
            extended: window(
                conn,
                kind,
                limits,
                limits.extended_window_hours,
                limits.extended_limit,
            )?,
        });
    }
    Ok(report)
}

fn window(
    conn: &Connection,
    agent_type: &str,
    limits: &AgentUsageConfig,
    hours: i64,
    limit: f64,
) -> Result<UsageWindow> {
    let cutoff = format!("-{hours} hours");
    let used: f64 = match limits.limit_type {
        UsageLimitType::Tokens => conn.query_row(
            "SELECT COALESCE(SUM(tokens_in + tokens_out), 0)
             FROM events
             WHERE agent_type = ?1
               AND created_at >= strftime('%Y-%m-%dT%H:%M:%SZ', 'now', ?2)",
            params![agent_type, cutoff],
            |row| row.get::<_, i64>(0),
        )? as f64,
        UsageLimitType::Cost => conn.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0.0)
             FROM events
             WHERE agent_type = ?1
               AND created_at >= strftime('%Y-%m-%dT%H:%M:%SZ', 'now', ?2)",
            params![agent_type, cutoff],
            |row| row.get(0),
        )?,
    };

    Ok(UsageWindow {
        used,
        limit,
        window_hours: hours,
        limit_type: limits.limit_type.as_str(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
