//! Read-only aggregation projections: stats, tool analytics, cost
//! breakdowns and filter options.
//!
//! Every function returns a stable shape (zeros, empty maps/arrays) when
//! nothing matches, so the dashboard never special-cases an empty store.

use std::collections::BTreeMap;

use chrono::DateTime;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::errors::Result;

/// Shared filters for aggregation queries.
#[derive(Clone, Debug, Default)]
pub struct StatsFilters {
    pub agent_type: Option<String>,
    pub since: Option<String>,
}

impl StatsFilters {
    /// WHERE fragment over the events table.
    fn events_where(&self, values: &mut Vec<String>) -> String {
        let mut sql = String::from(" WHERE 1=1");
        if let Some(agent_type) = &self.agent_type {
            values.push(agent_type.clone());
            sql.push_str(&format!(" AND agent_type = ?{}", values.len()));
        }
        if let Some(since) = &self.since {
            values.push(since.clone());
            sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
        }
        sql
    }

    fn sessions_where(&self, values: &mut Vec<String>) -> String {
        let mut sql = String::from(" WHERE 1=1");
        if let Some(agent_type) = &self.agent_type {
            values.push(agent_type.clone());
            sql.push_str(&format!(" AND agent_type = ?{}", values.len()));
        }
        if let Some(since) = &self.since {
            values.push(since.clone());
            sql.push_str(&format!(" AND last_event_at >= ?{}", values.len()));
        }
        sql
    }
}

/// Aggregate counters for the dashboard header and the stats broadcast.
#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_events: i64,
    pub active_sessions: i64,
    pub total_sessions: i64,
    pub total_tokens_in: i64,
    pub total_tokens_out: i64,
    pub total_cost_usd: f64,
    pub tool_breakdown: BTreeMap<String, i64>,
    pub agent_breakdown: BTreeMap<String, i64>,
    pub model_breakdown: BTreeMap<String, i64>,
    /// Distinct branches, most recently seen first.
    pub branches: Vec<String>,
}

/// Per-tool analytics row.
#[derive(Debug, Serialize)]
pub struct ToolStat {
    pub tool_name: String,
    pub total_calls: i64,
    pub error_count: i64,
    pub error_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub by_agent: BTreeMap<String, i64>,
}

/// One bucket of the cost timeline.
#[derive(Debug, Serialize)]
pub struct CostBucket {
    pub bucket: String,
    pub cost_usd: f64,
    pub tokens: i64,
}

/// Cost attributed to one project or model.
#[derive(Debug, Serialize)]
pub struct CostByKey {
    pub name: String,
    pub cost_usd: f64,
}

/// Cost breakdowns: timeline plus top spenders.
#[derive(Debug, Serialize)]
pub struct CostBreakdown {
    pub timeline: Vec<CostBucket>,
    pub by_project: Vec<CostByKey>,
    pub by_model: Vec<CostByKey>,
}

/// A branch with the time it was last seen.
#[derive(Debug, Serialize)]
pub struct BranchOption {
    pub value: String,
    pub last_seen: String,
}

/// Distinct values per filterable dimension.
#[derive(Debug, Serialize)]
pub struct FilterOptions {
    pub agent_types: Vec<String>,
    pub event_types: Vec<String>,
    pub tool_names: Vec<String>,
    pub models: Vec<String>,
    pub projects: Vec<String>,
    pub branches: Vec<BranchOption>,
    pub sources: Vec<String>,
}

/// Number of projects/models reported in each cost top list.
const COST_TOP_N: usize = 10;

/// Timeline bucketing flips from hourly to daily past this range.
const HOURLY_RANGE_HOURS: i64 = 48;

/// Aggregate counters, breakdowns and branch list.
pub fn get_stats(conn: &Connection, filters: &StatsFilters) -> Result<Stats> {
    let mut values: Vec<String> = Vec::new();
    let events_where = filters.events_where(&mut values);

    let (total_events, total_tokens_in, total_tokens_out, total_cost_usd) = conn.query_row(
        &format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(tokens_in), 0),
                    COALESCE(SUM(tokens_out), 0),
                    COALESCE(SUM(cost_usd), 0.0)
             FROM events{events_where}"
        ),
        params_from_iter(values.iter()),
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        },
    )?;

    let mut session_values: Vec<String> = Vec::new();
    let sessions_where = filters.sessions_where(&mut session_values);
    let (total_sessions, active_sessions) = conn.query_row(
        &format!(
            "SELECT COUNT(*), COALESCE(SUM(status = 'active'), 0)
             FROM sessions{sessions_where}"
        ),
        params_from_iter(session_values.iter()),
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
    )?;

    let tool_breakdown = breakdown(
        conn,
        &format!(
            "SELECT tool_name, COUNT(*) FROM events{events_where}
             AND tool_name IS NOT NULL GROUP BY tool_name"
        ),
        &values,
    )?;
    let agent_breakdown = breakdown(
        conn,
        &format!("SELECT agent_type, COUNT(*) FROM events{events_where} GROUP BY agent_type"),
        &values,
    )?;
    let model_breakdown = breakdown(
        conn,
        &format!(
            "SELECT model, COUNT(*) FROM events{events_where}
             AND model IS NOT NULL GROUP BY model"
        ),
        &values,
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT branch FROM events{events_where}
         AND branch IS NOT NULL GROUP BY branch ORDER BY MAX(created_at) DESC"
    ))?;
    let branches = stmt
        .query_map(params_from_iter(values.iter()), |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(Stats {
        total_events,
        active_sessions,
        total_sessions,
        total_tokens_in,
        total_tokens_out,
        total_cost_usd,
        tool_breakdown,
        agent_breakdown,
        model_breakdown,
        branches,
    })
}

/// Per-tool call counts, error rates and latency.
pub fn get_tool_analytics(conn: &Connection, filters: &StatsFilters) -> Result<Vec<ToolStat>> {
    let mut values: Vec<String> = Vec::new();
    let events_where = filters.events_where(&mut values);
    let tool_where = format!("{events_where} AND event_type = 'tool_use' AND tool_name IS NOT NULL");

    let mut by_agent: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare(&format!(
            "SELECT tool_name, agent_type, COUNT(*) FROM events{tool_where}
             GROUP BY tool_name, agent_type"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (tool, agent, count) = row?;
            let _ = by_agent.entry(tool).or_default().insert(agent, count);
        }
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT tool_name,
                COUNT(*),
                COALESCE(SUM(status = 'error'), 0),
                AVG(duration_ms)
         FROM events{tool_where}
         GROUP BY tool_name
         ORDER BY COUNT(*) DESC, tool_name ASC"
    ))?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<f64>>(3)?,
        ))
    })?;

    let mut tools = Vec::new();
    for row in rows {
        let (tool_name, total_calls, error_count, avg_duration_ms) = row?;
        let error_rate = if total_calls > 0 {
            error_count as f64 / total_calls as f64
        } else {
            0.0
        };
        let agents = by_agent.remove(&tool_name).unwrap_or_default();
        tools.push(ToolStat {
            tool_name,
            total_calls,
            error_count,
            error_rate,
            avg_duration_ms,
            by_agent: agents,
        });
    }
    Ok(tools)
}

/// Cost timeline plus top projects and models by spend.
pub fn get_cost_breakdown(conn: &Connection, filters: &StatsFilters) -> Result<CostBreakdown> {
    let mut values: Vec<String> = Vec::new();
    let events_where = filters.events_where(&mut values);
    let cost_where = format!("{events_where} AND cost_usd IS NOT NULL");

    // Range of priced events decides the bucket granularity.
    let (min_ts, max_ts) = conn.query_row(
        &format!("SELECT MIN(created_at), MAX(created_at) FROM events{cost_where}"),
        params_from_iter(values.iter()),
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        },
    )?;

    let hourly = match (&min_ts, &max_ts) {
        (Some(min), Some(max)) => range_hours(min, max) <= HOURLY_RANGE_HOURS,
        _ => true,
    };
    let bucket_expr = if hourly {
        "strftime('%Y-%m-%dT%H:00:00Z', created_at)"
    } else {
        "strftime('%Y-%m-%d', created_at)"
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {bucket_expr} AS bucket,
                COALESCE(SUM(cost_usd), 0.0),
                COALESCE(SUM(tokens_in + tokens_out), 0)
         FROM events{cost_where}
         GROUP BY bucket ORDER BY bucket ASC"
    ))?;
    let timeline = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(CostBucket {
                bucket: row.get(0)?,
                cost_usd: row.get(1)?,
                tokens: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let by_project = top_costs(
        conn,
        &format!(
            "SELECT project, COALESCE(SUM(cost_usd), 0.0) AS total
             FROM events{cost_where} AND project IS NOT NULL
             GROUP BY project ORDER BY total DESC LIMIT {COST_TOP_N}"
        ),
        &values,
    )?;
    let by_model = top_costs(
        conn,
        &format!(
            "SELECT model, COALESCE(SUM(cost_usd), 0.0) AS total
             FROM events{cost_where} AND model IS NOT NULL
             GROUP BY model ORDER BY total DESC LIMIT {COST_TOP_N}"
        ),
        &values,
    )?;

    Ok(CostBreakdown {
        timeline,
        by_project,
        by_model,
    })
}

/// Distinct values for every dashboard filter control.
pub fn get_filter_options(conn: &Connection) -> Result<FilterOptions> {
    let distinct = |column: &str| -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {column} FROM events WHERE {column} IS NOT NULL ORDER BY {column} ASC"
        ))?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(rows)
    };

    let mut stmt = conn.prepare(
        "SELECT branch, MAX(created_at) FROM events
         WHERE branch IS NOT NULL GROUP BY branch ORDER BY MAX(created_at) DESC",
    )?;
    let branches = stmt
        .query_map([], |row| {
            Ok(BranchOption {
                value: row.get(0)?,
                last_seen: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(FilterOptions {
        agent_types: distinct("agent_type")?,
        event_types: distinct("event_type")?,
        tool_names: distinct("tool_name")?,
        models: distinct("model")?,
        projects: distinct("project")?,
        branches,
        sources: distinct("source")?,
    })
}

fn breakdown(conn: &Connection, sql: &str, values: &[String]) -> Result<BTreeMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut map = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        let _ = map.insert(key, count);
    }
    Ok(map)
}

fn top_costs(conn: &Connection, sql: &str, values: &[String]) -> Result<Vec<CostByKey>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(CostByKey {
                name: row.get(0)?,
                cost_usd: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn range_hours(min: &str, max: &str) -> i64 {
    match (
        DateTime::parse_from_rfc3339(min),
        DateTime::parse_from_rfc3339(max),
    ) {
        (Ok(a), Ok(b)) => (b - a).num_hours(),
        _ => 0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
