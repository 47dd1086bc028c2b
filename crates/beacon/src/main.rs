//! # beacon
//!
//! Server binary: resolves configuration, opens the store, starts the
//! HTTP/SSE engine and its periodic tasks, and shuts everything down
//! cleanly on SIGINT/SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use beacon_core::config::Config;
use beacon_server::Server;
use beacon_store::Store;
use clap::{Parser, Subcommand};
use tracing::info;

/// Local-first observability hub for AI coding agents.
#[derive(Debug, Parser)]
#[command(name = "beacon", about = "Local-first observability hub for AI coding agents")]
struct Cli {
    /// Host to bind (overrides BEACON_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides BEACON_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database path (overrides BEACON_DB_PATH).
    #[arg(long)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Recompute cost_usd across all stored events from the current
    /// pricing tables, then exit.
    RecalcCosts,
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("beacon=info,beacon_server=info,beacon_store=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    match cli.command {
        Some(Command::RecalcCosts) => recalc_costs(config),
        None => serve(config).await,
    }
}

fn recalc_costs(config: Config) -> Result<()> {
    let store = Store::open(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    let updated = store
        .recalculate_costs()
        .context("cost recalculation failed")?;
    println!("recalculated cost_usd on {updated} event(s)");
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let bind_addr = config.bind_addr();
    let server = Server::new(config).context("startup failed")?;

    server.spawn_tasks(None);
    let (addr, serve_handle) = server
        .listen()
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(%addr, "beacon ready");

    wait_for_termination().await;
    info!("shutdown signal received");

    server.stop().await;
    serve_handle.await.context("server task panicked")?;
    Ok(())
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
