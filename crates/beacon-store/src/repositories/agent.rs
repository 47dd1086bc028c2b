//! Agent repository.
//!
//! Agents are created on first sight and only ever refreshed afterwards;
//! rows are never deleted.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::Result;
use crate::rows::AgentRow;

/// Agent repository — stateless, every method takes `&Connection`.
pub struct AgentRepo;

impl AgentRepo {
    /// Identity used when a producer does not register an explicit agent.
    pub fn default_agent_id(agent_type: &str) -> String {
        format!("{agent_type}-default")
    }

    /// Create the agent if absent, refresh `last_seen_at` otherwise.
    pub fn upsert(conn: &Connection, id: &str, agent_type: &str) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO agents (id, agent_type)
             VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE
               SET last_seen_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
            params![id, agent_type],
        )?;
        Ok(())
    }

    /// Fetch an agent by id.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<AgentRow>> {
        let row = conn
            .query_row(
                "SELECT id, agent_type, name, registered_at, last_seen_at
                 FROM agents WHERE id = ?1",
                params![id],
                AgentRow::from_row,
            )
            .optional()?;
        Ok(row)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn default_agent_id_format() {
        assert_eq!(AgentRepo::default_agent_id("claude_code"), "claude_code-default");
    }

    #[test]
    fn upsert_creates_agent() {
        let conn = conn();
        AgentRepo::upsert(&conn, "codex-default", "codex").unwrap();
        let agent = AgentRepo::get(&conn, "codex-default").unwrap().unwrap();
        assert_eq!(agent.agent_type, "codex");
        assert!(agent.name.is_none());
    }

    #[test]
    fn upsert_refreshes_last_seen() {
        let conn = conn();
        AgentRepo::upsert(&conn, "codex-default", "codex").unwrap();
        conn.execute(
            "UPDATE agents SET last_seen_at = '2020-01-01T00:00:00Z' WHERE id = 'codex-default'",
            [],
        )
        .unwrap();

        AgentRepo::upsert(&conn, "codex-default", "codex").unwrap();
        let agent = AgentRepo::get(&conn, "codex-default").unwrap().unwrap();
        assert!(agent.last_seen_at > "2020-01-01T00:00:00Z".to_string());
    }

    #[test]
    fn upsert_does_not_duplicate() {
        let conn = conn();
        AgentRepo::upsert(&conn, "codex-default", "codex").unwrap();
        AgentRepo::upsert(&conn, "codex-default", "codex").unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM agents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn get_missing_agent_is_none() {
        let conn = conn();
        assert!(AgentRepo::get(&conn, "nobody").unwrap().is_none());
    }
}
