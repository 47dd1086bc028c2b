//! # beacon-server
//!
//! The engine's HTTP surface and runtime:
//!
//! - **Ingest**: contract validation, pricing fallback, transactional
//!   persistence and broadcast, single and batch
//! - **SSE**: bounded subscriber registry with per-client filters and
//!   non-blocking fan-out
//! - **HTTP API**: events, sessions, transcripts, stats, filter options,
//!   health, OTLP JSON endpoints
//! - **Runtime**: periodic stats broadcast, idle sweeper, auto-import
//!   trigger, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod git;
pub mod http;
pub mod import;
pub mod ingest;
pub mod otel;
pub mod server;
pub mod shutdown;
pub mod sse;
pub mod state;
pub mod tasks;

pub use server::{Server, ServerError};
pub use state::AppState;
