//! Server assembly: router, listener, background tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use beacon_core::config::Config;
use beacon_core::pricing;
use beacon_store::{Store, StoreError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::http::api_router;
use crate::import::ImportRunner;
use crate::shutdown::ShutdownCoordinator;
use crate::state::AppState;
use crate::tasks;

const MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup failures. These are fatal: the binary reports them on one line
/// and exits non-zero.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store initialization failed: {0}")]
    Store(#[from] StoreError),

    #[error("listener bind failed: {0}")]
    Bind(#[from] std::io::Error),
}

/// The assembled engine: state, HTTP server and runtime tasks.
pub struct Server {
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Server {
    /// Open the store, verify it, load pricing and assemble state.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let store = Store::open(&config.db_path)?;
        store.health_check()?;
        pricing::preload();
        Ok(Self::from_state(AppState::new(config, store)))
    }

    /// Assemble around an existing state (tests use in-memory stores).
    pub fn from_state(state: AppState) -> Self {
        Self {
            state,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The full middleware-wrapped router.
    pub fn router(&self) -> Router {
        api_router()
            .with_state(self.state.clone())
            // Outermost layers run first on the way in.
            .layer(CatchPanicLayer::new())
            .layer(CorsLayer::permissive())
            .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
    }

    /// Launch the periodic tasks, registering them for shutdown.
    pub fn spawn_tasks(&self, importer: Option<Arc<dyn ImportRunner>>) {
        let token = self.shutdown.token();
        self.shutdown.register(tasks::spawn_stats_broadcast(
            self.state.clone(),
            token.clone(),
        ));
        self.shutdown
            .register(tasks::spawn_idle_sweeper(self.state.clone(), token.clone()));
        if let Some(runner) = importer {
            if let Some(handle) = tasks::spawn_auto_import(self.state.clone(), runner, token) {
                self.shutdown.register(handle);
            }
        }
    }

    /// Bind and serve. Returns the bound address and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    token.cancelled().await;
                })
                .await;
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
            }
            info!("server stopped");
        });

        Ok((addr, handle))
    }

    /// Stop accepting connections, drain tasks, release everything.
    pub async fn stop(&self) {
        self.shutdown.graceful_shutdown(None).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
