//! Event repository — the append-only event log.
//!
//! Events are immutable once written; the single exception is the batch
//! cost recalculation, which rewrites `cost_usd` only. Duplicate detection
//! rides on the UNIQUE constraint over `event_id` with `ON CONFLICT DO
//! NOTHING`, surfaced to callers as a row-change count rather than an
//! error.

use beacon_core::pricing::{self, TokenCounts};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::errors::Result;
use crate::rows::EventRow;

const EVENT_COLUMNS: &str = "id, event_id, session_id, agent_type, event_type, tool_name, status, \
     tokens_in, tokens_out, branch, project, duration_ms, created_at, client_timestamp, \
     metadata, payload_truncated, model, cost_usd, cache_read_tokens, cache_write_tokens, source";

/// Fully resolved event, ready for insertion.
///
/// Metadata is already truncated/serialized and `cost_usd` already carries
/// the client-provided or computed value; the repository adds nothing but
/// the server clock.
pub struct NewEvent<'a> {
    pub event_id: Option<&'a str>,
    pub session_id: &'a str,
    pub agent_type: &'a str,
    pub event_type: &'a str,
    pub tool_name: Option<&'a str>,
    pub status: &'a str,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub branch: Option<&'a str>,
    pub project: Option<&'a str>,
    pub duration_ms: Option<i64>,
    pub client_timestamp: Option<&'a str>,
    pub metadata: &'a str,
    pub payload_truncated: bool,
    pub model: Option<&'a str>,
    pub cost_usd: Option<f64>,
    pub cache_read_tokens: i64,
    pub cache_write_tokens: i64,
    pub source: &'a str,
}

/// Filters for the events feed query.
#[derive(Clone, Debug, Default)]
pub struct EventFilters {
    pub agent_type: Option<String>,
    pub event_type: Option<String>,
    pub tool_name: Option<String>,
    pub session_id: Option<String>,
    pub branch: Option<String>,
    pub model: Option<String>,
    pub source: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    /// `0` means unbounded.
    pub limit: i64,
    pub offset: i64,
}

impl EventFilters {
    fn where_clause(&self, values: &mut Vec<String>) -> String {
        let mut sql = String::from(" WHERE 1=1");
        let mut eq = |column: &str, value: &Option<String>, sql: &mut String| {
            if let Some(v) = value {
                values.push(v.clone());
                sql.push_str(&format!(" AND {column} = ?{}", values.len()));
            }
        };
        eq("agent_type", &self.agent_type, &mut sql);
        eq("event_type", &self.event_type, &mut sql);
        eq("tool_name", &self.tool_name, &mut sql);
        eq("session_id", &self.session_id, &mut sql);
        eq("branch", &self.branch, &mut sql);
        eq("model", &self.model, &mut sql);
        eq("source", &self.source, &mut sql);
        if let Some(since) = &self.since {
            values.push(since.clone());
            sql.push_str(&format!(" AND created_at >= ?{}", values.len()));
        }
        if let Some(until) = &self.until {
            values.push(until.clone());
            sql.push_str(&format!(" AND created_at <= ?{}", values.len()));
        }
        sql
    }
}

/// Event repository — stateless, every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Whether an event with this external id is already persisted.
    pub fn event_id_exists(conn: &Connection, event_id: &str) -> Result<bool> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE event_id = ?1)",
            params![event_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    /// Insert one event. Returns the stored row, or `None` when the
    /// `event_id` UNIQUE constraint swallowed the insert.
    pub fn insert(conn: &Connection, event: &NewEvent<'_>) -> Result<Option<EventRow>> {
        let changed = conn.execute(
            "INSERT INTO events (
                event_id, session_id, agent_type, event_type, tool_name, status,
                tokens_in, tokens_out, branch, project, duration_ms,
                created_at, client_timestamp, metadata, payload_truncated,
                model, cost_usd, cache_read_tokens, cache_write_tokens, source
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19
             )
             ON CONFLICT(event_id) DO NOTHING",
            params![
                event.event_id,
                event.session_id,
                event.agent_type,
                event.event_type,
                event.tool_name,
                event.status,
                event.tokens_in,
                event.tokens_out,
                event.branch,
                event.project,
                event.duration_ms,
                event.client_timestamp,
                event.metadata,
                event.payload_truncated as i64,
                event.model,
                event.cost_usd,
                event.cache_read_tokens,
                event.cache_write_tokens,
                event.source,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }
        let rowid = conn.last_insert_rowid();
        let row = conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![rowid],
            EventRow::from_row,
        )?;
        Ok(Some(row))
    }

    /// Fetch by internal rowid.
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<EventRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![id],
                EventRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Filtered feed query, newest first. Returns the page plus the total
    /// match count ignoring limit/offset.
    pub fn query(conn: &Connection, filters: &EventFilters) -> Result<(Vec<EventRow>, i64)> {
        let mut values: Vec<String> = Vec::new();
        let where_sql = filters.where_clause(&mut values);

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM events{where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events{where_sql} ORDER BY id DESC"
        );
        if filters.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", filters.limit));
        }
        if filters.offset > 0 {
            if filters.limit <= 0 {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", filters.offset));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), EventRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((rows, total))
    }

    /// Most recent events of one session (newest first).
    pub fn recent_for_session(
        conn: &Connection,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<EventRow>> {
        let mut sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 ORDER BY id DESC"
        );
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![session_id], EventRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// A session's full event history in chronological order.
    pub fn chronological_for_session(
        conn: &Connection,
        session_id: &str,
    ) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE session_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![session_id], EventRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Recompute `cost_usd` for every event that names a model, from the
    /// currently loaded pricing tables. Events whose model is unknown keep
    /// their stored value. Returns the number of rows updated.
    pub fn recalculate_costs(conn: &Connection) -> Result<usize> {
        let mut stmt = conn.prepare(
            "SELECT id, model, tokens_in, tokens_out, cache_read_tokens, cache_write_tokens
             FROM events WHERE model IS NOT NULL",
        )?;
        let candidates = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut update = conn.prepare("UPDATE events SET cost_usd = ?1 WHERE id = ?2")?;
        let mut updated = 0;
        for (id, model, tokens_in, tokens_out, cache_read, cache_write) in candidates {
            let tokens = TokenCounts {
                input: tokens_in,
                output: tokens_out,
                cache_read,
                cache_write,
            };
            if let Some(cost) = pricing::calculate_cost(&model, tokens) {
                updated += update.execute(params![cost, id])?;
            }
        }
        Ok(updated)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
