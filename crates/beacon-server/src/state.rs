//! Shared application state.
//!
//! One registry of services, built once at startup and handed to every
//! request handler explicitly. Nothing here is process-global; the only
//! load-once state in the system is the pricing tables inside
//! `beacon-core`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use beacon_core::config::Config;
use beacon_store::Store;
use parking_lot::Mutex;

use crate::git::BranchResolver;
use crate::sse::SseHub;

/// Services shared by all handlers and background tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub hub: Arc<SseHub>,
    pub branches: Arc<BranchResolver>,
    /// Last-seen values for OTLP cumulative counters, keyed by
    /// (session, agent, metric, model, token type). Resets on restart.
    pub otel_counters: Arc<Mutex<HashMap<String, f64>>>,
    pub start_time: Instant,
}

impl AppState {
    /// Assemble the service registry around an open store.
    pub fn new(config: Config, store: Store) -> Self {
        let hub = SseHub::new(config.max_sse_clients);
        let branches = BranchResolver::new(config.projects_root.clone());
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            hub: Arc::new(hub),
            branches: Arc::new(branches),
            otel_counters: Arc::new(Mutex::new(HashMap::new())),
            start_time: Instant::now(),
        }
    }
}
