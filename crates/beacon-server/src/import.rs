//! Seam for the historical importer collaborator.
//!
//! Importers live outside the engine — they read agent log files, produce
//! normalized events with `source = import`, and feed them through the
//! ingest path (HTTP or direct store calls), using the store's
//! import-state bookkeeping for idempotence. The runtime only needs a way
//! to trigger a run on a schedule.

use std::sync::Arc;

use async_trait::async_trait;
use beacon_store::Store;

/// Error type importers report; the trigger logs and swallows it.
pub type ImportError = Box<dyn std::error::Error + Send + Sync>;

/// One runnable importer.
#[async_trait]
pub trait ImportRunner: Send + Sync {
    /// Run one import pass. Returns how many new events were persisted.
    async fn run(&self, store: Arc<Store>) -> Result<u64, ImportError>;
}
