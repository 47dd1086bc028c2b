//! High-level [`Store`] facade.
//!
//! Owns the connection pool plus the single-writer lane: every mutating
//! operation takes the writer lock and runs inside one transaction, so
//! callers never observe partial state and `SQLite` never sees two
//! concurrent writers. Reads go straight to the pool.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;

use beacon_core::config::UsageMonitorConfig;

use crate::aggregate::{self, CostBreakdown, FilterOptions, Stats, StatsFilters};
use crate::connection::{new_file_pool, new_memory_pool, ConnectionPool, PooledConnection};
use crate::errors::Result;
use crate::migrations::run_migrations;
use crate::repositories::agent::AgentRepo;
use crate::repositories::event::EventRepo;
use crate::repositories::import_state::ImportStateRepo;
use crate::repositories::session::SessionRepo;
use crate::rows::{EventRow, ImportStateRow, SessionRow};
use crate::transcript::{self, TranscriptEntry};
use crate::usage::{self, AgentUsage};

pub use crate::repositories::event::{EventFilters, NewEvent};
pub use crate::repositories::session::SessionFilters;

/// Imported events older than this finalize their session immediately.
const HISTORICAL_IMPORT_AGE_MINUTES: i64 = 60;

/// Result of ingesting one event.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The event was persisted.
    Created {
        row: EventRow,
        /// Whether the owning session changed status (created counts).
        session_changed: bool,
    },
    /// The `event_id` was already known; nothing was written and no
    /// session/agent state advanced.
    Duplicate,
}

/// Result of one idle sweep.
#[derive(Clone, Copy, Debug, Default)]
pub struct SweepOutcome {
    pub idled: usize,
    pub ended: usize,
}

impl SweepOutcome {
    /// Whether anything changed status this pass.
    pub fn changed(self) -> bool {
        self.idled > 0 || self.ended > 0
    }
}

/// Outcomes of a batch ingest, in input order.
pub type BatchOutcome = Vec<IngestOutcome>;

/// The embedded store. Cheap to share behind an `Arc`.
pub struct Store {
    pool: ConnectionPool,
    write_lock: Mutex<()>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the store at `path` and bring the schema current.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            // Missing data dir is normal on first run; open() reports real failures.
            let _ = std::fs::create_dir_all(parent);
        }
        let pool = new_file_pool(&path.to_string_lossy())?;
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
            path: Some(path.to_path_buf()),
        };
        let _ = run_migrations(&*store.read()?)?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let pool = new_memory_pool()?;
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
            path: None,
        };
        let _ = run_migrations(&*store.read()?)?;
        Ok(store)
    }

    fn read(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Trivial liveness probe used by the startup gate.
    pub fn health_check(&self) -> Result<()> {
        let _: i64 = self.read()?.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(())
    }

    /// Size of the database file in bytes (0 for in-memory stores).
    pub fn db_size_bytes(&self) -> u64 {
        self.path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes (single-writer lane)
    // ─────────────────────────────────────────────────────────────────────

    /// Ingest one event: duplicate check, agent/session upsert, lifecycle
    /// transition and insert, atomically.
    pub fn ingest(&self, event: &NewEvent<'_>) -> Result<IngestOutcome> {
        let _writer = self.write_lock.lock();
        let conn = self.read()?;
        let tx = conn.unchecked_transaction()?;
        let outcome = ingest_in_tx(&tx, event)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Ingest a batch inside a single transaction. Outcomes line up with
    /// the input; duplicates are per-event, not batch-fatal.
    pub fn ingest_many(&self, events: &[NewEvent<'_>]) -> Result<BatchOutcome> {
        let _writer = self.write_lock.lock();
        let conn = self.read()?;
        let tx = conn.unchecked_transaction()?;
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(ingest_in_tx(&tx, event)?);
        }
        tx.commit()?;
        Ok(outcomes)
    }

    /// Run one idle sweep.
    pub fn sweep_sessions(&self, timeout_minutes: u64) -> Result<SweepOutcome> {
        let _writer = self.write_lock.lock();
        let conn = self.read()?;
        let tx = conn.unchecked_transaction()?;
        let (idled, ended) = SessionRepo::sweep(&tx, timeout_minutes)?;
        tx.commit()?;
        Ok(SweepOutcome { idled, ended })
    }

    /// Recompute `cost_usd` across history from the current pricing
    /// tables. Returns the number of rows rewritten.
    pub fn recalculate_costs(&self) -> Result<usize> {
        let _writer = self.write_lock.lock();
        let conn = self.read()?;
        let tx = conn.unchecked_transaction()?;
        let updated = EventRepo::recalculate_costs(&tx)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Record import bookkeeping for a file.
    pub fn set_import_state(
        &self,
        source: &str,
        file_path: &str,
        file_hash: &str,
        file_size: Option<i64>,
        events_imported: i64,
    ) -> Result<()> {
        let _writer = self.write_lock.lock();
        ImportStateRepo::upsert(
            &*self.read()?,
            source,
            file_path,
            file_hash,
            file_size,
            events_imported,
        )
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Import bookkeeping for a file, if present.
    pub fn import_state(&self, source: &str, file_path: &str) -> Result<Option<ImportStateRow>> {
        ImportStateRepo::get(&*self.read()?, source, file_path)
    }

    /// One session by id.
    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        SessionRepo::get(&*self.read()?, id)
    }

    /// Filtered session listing.
    pub fn list_sessions(&self, filters: &SessionFilters) -> Result<Vec<SessionRow>> {
        SessionRepo::list(&*self.read()?, filters)
    }

    /// Most recent events of one session.
    pub fn recent_session_events(&self, session_id: &str, limit: i64) -> Result<Vec<EventRow>> {
        EventRepo::recent_for_session(&*self.read()?, session_id, limit)
    }

    /// Transcript projection of one session.
    pub fn session_transcript(&self, session_id: &str) -> Result<Vec<TranscriptEntry>> {
        let events = EventRepo::chronological_for_session(&*self.read()?, session_id)?;
        Ok(transcript::project(events))
    }

    /// Filtered events feed with total match count.
    pub fn query_events(&self, filters: &EventFilters) -> Result<(Vec<EventRow>, i64)> {
        EventRepo::query(&*self.read()?, filters)
    }

    /// Aggregate stats.
    pub fn stats(&self, filters: &StatsFilters) -> Result<Stats> {
        aggregate::get_stats(&*self.read()?, filters)
    }

    /// Per-tool analytics.
    pub fn tool_analytics(&self, filters: &StatsFilters) -> Result<Vec<aggregate::ToolStat>> {
        aggregate::get_tool_analytics(&*self.read()?, filters)
    }

    /// Cost breakdowns.
    pub fn cost_breakdown(&self, filters: &StatsFilters) -> Result<CostBreakdown> {
        aggregate::get_cost_breakdown(&*self.read()?, filters)
    }

    /// Distinct filter values.
    pub fn filter_options(&self) -> Result<FilterOptions> {
        aggregate::get_filter_options(&*self.read()?)
    }

    /// Usage-monitor rollups.
    pub fn usage_monitor(&self, config: &UsageMonitorConfig) -> Result<Vec<AgentUsage>> {
        usage::get_usage_monitor(&*self.read()?, config)
    }
}

/// The ingest pipeline inside an open transaction.
fn ingest_in_tx(conn: &Connection, event: &NewEvent<'_>) -> Result<IngestOutcome> {
    // Duplicates first: a replayed event must not advance any state.
    if let Some(event_id) = event.event_id {
        if EventRepo::event_id_exists(conn, event_id)? {
            return Ok(IngestOutcome::Duplicate);
        }
    }

    let agent_id = AgentRepo::default_agent_id(event.agent_type);
    AgentRepo::upsert(conn, &agent_id, event.agent_type)?;

    let previous_status = SessionRepo::status(conn, event.session_id)?;

    if let Some(client_timestamp) = historical_timestamp(event) {
        SessionRepo::upsert_historical(
            conn,
            event.session_id,
            &agent_id,
            event.agent_type,
            event.project,
            event.branch,
            client_timestamp,
        )?;
    } else {
        SessionRepo::upsert_live(
            conn,
            event.session_id,
            &agent_id,
            event.agent_type,
            event.project,
            event.branch,
        )?;
        if event.event_type == "session_end" {
            let _ = SessionRepo::mark_idle_on_end(conn, event.session_id)?;
        }
    }

    let row = match EventRepo::insert(conn, event)? {
        Some(row) => row,
        // Unreachable while all writes hold the writer lock: the pre-check
        // above sees every committed and in-transaction event_id. If the
        // UNIQUE constraint still swallows the insert, report a duplicate;
        // the agent/session upserts above commit with the transaction.
        None => return Ok(IngestOutcome::Duplicate),
    };

    let current_status = SessionRepo::status(conn, event.session_id)?;
    let session_changed = previous_status != current_status;

    Ok(IngestOutcome::Created {
        row,
        session_changed,
    })
}

/// For import-sourced events: the client timestamp, when old enough to be
/// historical backfill rather than live traffic.
fn historical_timestamp<'a>(event: &'a NewEvent<'_>) -> Option<&'a str> {
    if event.source != "import" {
        return None;
    }
    let raw = event.client_timestamp?;
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    let age = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
    (age > Duration::minutes(HISTORICAL_IMPORT_AGE_MINUTES)).then_some(raw)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
