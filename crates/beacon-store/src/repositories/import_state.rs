//! Import bookkeeping repository.
//!
//! The historical importer is an external collaborator; the store only
//! persists its (source, file path) → (hash, count, timestamp) records so
//! backfill stays idempotent across runs.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::Result;
use crate::rows::ImportStateRow;

/// Import-state repository — stateless, every method takes `&Connection`.
pub struct ImportStateRepo;

impl ImportStateRepo {
    /// Bookkeeping for one imported file, if any.
    pub fn get(conn: &Connection, source: &str, file_path: &str) -> Result<Option<ImportStateRow>> {
        let row = conn
            .query_row(
                "SELECT source, file_path, file_hash, file_size, events_imported, imported_at
                 FROM import_state WHERE source = ?1 AND file_path = ?2",
                params![source, file_path],
                ImportStateRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Record (or replace) the import state for a file.
    pub fn upsert(
        conn: &Connection,
        source: &str,
        file_path: &str,
        file_hash: &str,
        file_size: Option<i64>,
        events_imported: i64,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO import_state (source, file_path, file_hash, file_size, events_imported, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
             ON CONFLICT(source, file_path) DO UPDATE SET
               file_hash = excluded.file_hash,
               file_size = excluded.file_size,
               events_imported = excluded.events_imported,
               imported_at = excluded.imported_at",
            params![source, file_path, file_hash, file_size, events_imported],
        )?;
        Ok(())
    }
}
