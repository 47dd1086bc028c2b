//! Session repository — lifecycle state machine SQL.
//!
//! Status transitions live here as single statements so the store facade
//! can compose them inside one transaction per ingest:
//!
//! - live events upsert to `active` (reactivating idle/ended sessions)
//! - a live `session_end` demotes `active` to `idle` without `ended_at`
//! - historical imports create sessions directly in `ended`
//! - the sweeper demotes stale `active` rows to `idle` and stale `idle`
//!   rows to `ended`, stamping `ended_at`

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::errors::Result;
use crate::rows::SessionRow;

const SESSION_COLUMNS: &str =
    "id, agent_id, agent_type, project, branch, status, started_at, ended_at, last_event_at, metadata";

/// Filters for listing sessions.
#[derive(Clone, Debug, Default)]
pub struct SessionFilters {
    pub status: Option<String>,
    pub exclude_status: Option<String>,
    pub agent_type: Option<String>,
    pub since: Option<String>,
    /// `None` or `Some(0)` means unbounded.
    pub limit: Option<i64>,
}

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Upsert for a live event: create as `active`, or refresh
    /// `last_event_at` and reactivate, clearing any stale `ended_at`.
    /// Project and branch stick once known.
    pub fn upsert_live(
        conn: &Connection,
        id: &str,
        agent_id: &str,
        agent_type: &str,
        project: Option<&str>,
        branch: Option<&str>,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (id, agent_id, agent_type, project, branch)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               last_event_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now'),
               status = 'active',
               ended_at = NULL,
               project = COALESCE(excluded.project, sessions.project),
               branch = COALESCE(excluded.branch, sessions.branch)",
            params![id, agent_id, agent_type, project, branch],
        )?;
        Ok(())
    }

    /// Upsert for a historical import: a new session lands directly in
    /// `ended` with all timestamps taken from the event's client clock; an
    /// existing session keeps its lifecycle untouched.
    pub fn upsert_historical(
        conn: &Connection,
        id: &str,
        agent_id: &str,
        agent_type: &str,
        project: Option<&str>,
        branch: Option<&str>,
        client_timestamp: &str,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions
               (id, agent_id, agent_type, project, branch, status, started_at, ended_at, last_event_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'ended', ?6, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
               project = COALESCE(excluded.project, sessions.project),
               branch = COALESCE(excluded.branch, sessions.branch)",
            params![id, agent_id, agent_type, project, branch, client_timestamp],
        )?;
        Ok(())
    }

    /// A live `session_end`: `active` drops to `idle`, `ended_at` stays
    /// unset so the card remains visible until the sweeper retires it.
    pub fn mark_idle_on_end(conn: &Connection, id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET status = 'idle' WHERE id = ?1 AND status = 'active'",
            params![id],
        )?;
        Ok(changed > 0)
    }

    /// Current status, if the session exists.
    pub fn status(conn: &Connection, id: &str) -> Result<Option<String>> {
        let status = conn
            .query_row(
                "SELECT status FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    /// Idle sweep: returns `(idled, ended)` row counts.
    pub fn sweep(conn: &Connection, timeout_minutes: u64) -> Result<(usize, usize)> {
        let idle_cutoff = format!("-{timeout_minutes} minutes");
        let idled = conn.execute(
            "UPDATE sessions SET status = 'idle'
             WHERE status = 'active'
               AND last_event_at < strftime('%Y-%m-%dT%H:%M:%SZ', 'now', ?1)",
            params![idle_cutoff],
        )?;

        let end_cutoff = format!("-{} minutes", timeout_minutes * 2);
        let ended = conn.execute(
            "UPDATE sessions
             SET status = 'ended', ended_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE status = 'idle'
               AND last_event_at < strftime('%Y-%m-%dT%H:%M:%SZ', 'now', ?1)",
            params![end_cutoff],
        )?;

        Ok((idled, ended))
    }

    /// Fetch one session.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                SessionRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List sessions, most recently active first.
    pub fn list(conn: &Connection, filters: &SessionFilters) -> Result<Vec<SessionRow>> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE 1=1");
        let mut values: Vec<String> = Vec::new();

        if let Some(status) = &filters.status {
            values.push(status.clone());
            sql.push_str(&format!(" AND status = ?{}", values.len()));
        }
        if let Some(exclude) = &filters.exclude_status {
            values.push(exclude.clone());
            sql.push_str(&format!(" AND status != ?{}", values.len()));
        }
        if let Some(agent_type) = &filters.agent_type {
            values.push(agent_type.clone());
            sql.push_str(&format!(" AND agent_type = ?{}", values.len()));
        }
        if let Some(since) = &filters.since {
            values.push(since.clone());
            sql.push_str(&format!(" AND last_event_at >= ?{}", values.len()));
        }

        sql.push_str(" ORDER BY last_event_at DESC");
        if let Some(limit) = filters.limit {
            if limit > 0 {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), SessionRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
