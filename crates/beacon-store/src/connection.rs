//! `SQLite` connection pool with WAL mode and foreign keys enabled.
//!
//! Uses `r2d2` with the `r2d2_sqlite` backend. A [`PragmaCustomizer`] runs
//! on every new connection so WAL mode, foreign keys, busy timeout and
//! synchronous level are always in force.

use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::errors::Result;

/// Alias for the pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u32 = 5_000;
const CONNECTION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};\
             PRAGMA foreign_keys = ON;\
             PRAGMA synchronous = NORMAL;"
        ))?;
        Ok(())
    }
}

/// Create a file-backed pool.
pub fn new_file_pool(path: &str) -> Result<ConnectionPool> {
    build(SqliteConnectionManager::file(path))
}

/// Create an in-memory pool (for tests).
///
/// Uses a uniquely named shared-cache memory database so every pooled
/// connection sees the same data.
pub fn new_memory_pool() -> Result<ConnectionPool> {
    static NEXT_ID: AtomicU64 = AtomicU64::new(0);
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let uri = format!("file:beacon-mem-{id}?mode=memory&cache=shared");
    let manager = SqliteConnectionManager::file(uri).with_flags(
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI,
    );
    build(manager)
}

fn build(manager: SqliteConnectionManager) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .connection_timeout(std::time::Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .connection_customizer(Box::new(PragmaCustomizer))
        .build(manager)?;
    Ok(pool)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pool_shares_data_between_connections() {
        let pool = new_memory_pool().unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
                .unwrap();
        }
        let conn = pool.get().unwrap();
        let x: i64 = conn.query_row("SELECT x FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(x, 7);
    }

    #[test]
    fn memory_pools_are_isolated_from_each_other() {
        let a = new_memory_pool().unwrap();
        let b = new_memory_pool().unwrap();
        a.get()
            .unwrap()
            .execute_batch("CREATE TABLE only_in_a (x INTEGER);")
            .unwrap();
        let missing: std::result::Result<i64, _> = b.get().unwrap().query_row(
            "SELECT COUNT(*) FROM only_in_a",
            [],
            |r| r.get(0),
        );
        assert!(missing.is_err());
    }

    #[test]
    fn file_pool_enables_wal_and_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = new_file_pool(path.to_str().unwrap()).unwrap();
        let conn = pool.get().unwrap();

        let journal: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(journal, "wal");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn pool_hands_out_multiple_connections() {
        let pool = new_memory_pool().unwrap();
        let conns: Vec<_> = (0..4).map(|_| pool.get().unwrap()).collect();
        assert_eq!(conns.len(), 4);
    }
}
