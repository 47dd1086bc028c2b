//! # beacon-store
//!
//! Embedded relational store for the beacon engine, built on `SQLite`
//! (WAL mode) behind an `r2d2` connection pool:
//!
//! - **Migrations**: versioned, embedded SQL applied idempotently at startup
//! - **Repositories**: stateless SQL modules for agents, sessions, events
//!   and import bookkeeping
//! - **Store facade**: the single-writer lane every mutation funnels
//!   through, plus read-side query methods
//! - **Aggregation**: stats, tool analytics, cost breakdowns, filter
//!   options and usage-monitor windows
//! - **Transcript**: chronological projection of a session's events

#![deny(unsafe_code)]

pub mod aggregate;
pub mod connection;
pub mod errors;
pub mod migrations;
pub mod repositories;
pub mod rows;
pub mod store;
pub mod transcript;
pub mod usage;

pub use aggregate::StatsFilters;
pub use connection::{new_file_pool, new_memory_pool, ConnectionPool, PooledConnection};
pub use errors::{Result, StoreError};
pub use rows::{AgentRow, EventRow, ImportStateRow, SessionRow};
pub use store::{
    BatchOutcome, EventFilters, IngestOutcome, NewEvent, SessionFilters, Store, SweepOutcome,
};
