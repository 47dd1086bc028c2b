//! Periodic runtime tasks.
//!
//! Each task is a tokio loop racing its interval against the shutdown
//! token. Errors are logged and swallowed — the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::import::ImportRunner;
use crate::state::AppState;
use beacon_store::StatsFilters;

/// Idle sweeper cadence.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Delay before the first auto-import pass.
const AUTO_IMPORT_WARMUP: Duration = Duration::from_secs(5);

/// Stats broadcast loop: every `stats_interval_ms`, publish the full
/// snapshot to connected subscribers. Skips the queries entirely when
/// nobody is listening.
pub fn spawn_stats_broadcast(state: AppState, token: CancellationToken) -> JoinHandle<()> {
    let interval = Duration::from_millis(state.config.stats_interval_ms);
    tokio::spawn(async move {
        loop {
            if sleep_or_cancel(interval, &token).await {
                break;
            }
            let _ = broadcast_stats_once(&state);
        }
    })
}

/// One stats broadcast pass. Returns whether a message was published.
pub fn broadcast_stats_once(state: &AppState) -> bool {
    if state.hub.client_count() == 0 {
        return false;
    }

    let stats = match state.store.stats(&StatsFilters::default()) {
        Ok(stats) => stats,
        Err(err) => {
            warn!(error = %err, "stats snapshot failed");
            return false;
        }
    };
    let usage = match state.store.usage_monitor(&state.config.usage_monitor) {
        Ok(usage) => usage,
        Err(err) => {
            warn!(error = %err, "usage monitor snapshot failed");
            Vec::new()
        }
    };

    let mut payload = match serde_json::to_value(&stats) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "stats serialization failed");
            return false;
        }
    };
    if let Some(map) = payload.as_object_mut() {
        let _ = map.insert(
            "usage_monitor".into(),
            serde_json::to_value(&usage).unwrap_or_default(),
        );
    }

    state.hub.publish("stats", &payload);
    true
}

/// Idle sweeper loop: every 60 s, demote stale sessions and announce any
/// changes.
pub fn spawn_idle_sweeper(state: AppState, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if sleep_or_cancel(SWEEP_INTERVAL, &token).await {
                break;
            }
            let _ = sweep_once(&state);
        }
    })
}

/// One sweep pass. Returns the transition counts.
pub fn sweep_once(state: &AppState) -> (usize, usize) {
    match state
        .store
        .sweep_sessions(state.config.session_timeout_minutes)
    {
        Ok(outcome) => {
            if outcome.changed() {
                info!(idled = outcome.idled, ended = outcome.ended, "idle sweep");
                state.hub.publish(
                    "session_update",
                    &json!({
                        "reason": "idle_sweep",
                        "idled": outcome.idled,
                        "ended": outcome.ended,
                    }),
                );
            }
            (outcome.idled, outcome.ended)
        }
        Err(err) => {
            error!(error = %err, "idle sweep failed");
            (0, 0)
        }
    }
}

/// Auto-import trigger: first pass shortly after startup, then on the
/// configured interval. No-op when the interval is zero.
pub fn spawn_auto_import(
    state: AppState,
    runner: Arc<dyn ImportRunner>,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    let minutes = state.config.auto_import_interval_minutes;
    if minutes == 0 {
        return None;
    }
    let interval = Duration::from_secs(minutes * 60);

    Some(tokio::spawn(async move {
        if sleep_or_cancel(AUTO_IMPORT_WARMUP, &token).await {
            return;
        }
        run_import_once(&state, runner.as_ref()).await;

        loop {
            if sleep_or_cancel(interval, &token).await {
                break;
            }
            run_import_once(&state, runner.as_ref()).await;
        }
    }))
}

/// One import pass; announces when new events landed.
pub async fn run_import_once(state: &AppState, runner: &dyn ImportRunner) {
    match runner.run(Arc::clone(&state.store)).await {
        Ok(0) => {}
        Ok(imported) => {
            info!(imported, "auto-import pass complete");
            state.hub.publish(
                "session_update",
                &json!({ "reason": "auto_import", "imported": imported }),
            );
        }
        Err(err) => error!(error = %err, "auto-import pass failed"),
    }
}

/// Sleep for `duration` unless the token fires first. True means cancelled.
async fn sleep_or_cancel(duration: Duration, token: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = token.cancelled() => true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
