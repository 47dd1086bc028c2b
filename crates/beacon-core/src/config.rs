//! Runtime configuration resolved from an environment-variable bag.
//!
//! Every knob is looked up as `BEACON_<SUFFIX>`, then as
//! `BEACON_DESKTOP_<SUFFIX>` (set by the desktop shell that embeds the
//! engine), then falls back to its default. A malformed value falls through
//! to the next precedence level — a single bad variable never aborts
//! startup.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const ENV_PREFIX: &str = "BEACON_";
const DESKTOP_PREFIX: &str = "BEACON_DESKTOP_";

/// What a usage-monitor window counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageLimitType {
    /// Sum of `tokens_in + tokens_out`.
    Tokens,
    /// Sum of `cost_usd`.
    Cost,
}

impl UsageLimitType {
    /// Wire name for the limit type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tokens => "tokens",
            Self::Cost => "cost",
        }
    }
}

/// Rolling-window usage limits for one agent kind.
#[derive(Clone, Debug)]
pub struct AgentUsageConfig {
    pub limit_type: UsageLimitType,
    pub session_window_hours: i64,
    pub session_limit: f64,
    pub extended_window_hours: i64,
    pub extended_limit: f64,
}

/// Usage-monitor limits for the known agent kinds.
#[derive(Clone, Debug)]
pub struct UsageMonitorConfig {
    pub claude_code: AgentUsageConfig,
    pub codex: AgentUsageConfig,
    pub default: AgentUsageConfig,
}

impl UsageMonitorConfig {
    /// Limits for the given agent kind, falling back to the defaults.
    pub fn for_agent(&self, agent_type: &str) -> &AgentUsageConfig {
        match agent_type {
            "claude_code" => &self.claude_code,
            "codex" => &self.codex,
            _ => &self.default,
        }
    }

    /// The agent kinds that carry explicit limits, in reporting order.
    pub fn configured_kinds(&self) -> &'static [&'static str] {
        &["claude_code", "codex"]
    }
}

/// Typed runtime configuration for the engine.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Metadata byte cap in KiB.
    pub max_payload_kb: usize,
    /// Idle threshold in minutes; the end threshold is twice this.
    pub session_timeout_minutes: u64,
    /// Cap on live-feed event queries.
    pub max_feed: usize,
    pub stats_interval_ms: u64,
    pub max_sse_clients: usize,
    pub sse_heartbeat_ms: u64,
    /// Auto-import period in minutes; `0` disables the trigger.
    pub auto_import_interval_minutes: u64,
    /// Root directory the git branch resolver searches under.
    pub projects_root: PathBuf,
    pub usage_monitor: UsageMonitorConfig,
}

impl Config {
    /// Resolve configuration from the process environment and cwd.
    pub fn from_env() -> Self {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve(|key| env::var(key).ok(), &cwd)
    }

    /// Resolve configuration from an arbitrary variable bag.
    ///
    /// `get` is called with fully prefixed keys (`BEACON_PORT`,
    /// `BEACON_DESKTOP_PORT`, ...). Exposed separately from [`from_env`]
    /// so tests never touch process-global state.
    ///
    /// [`from_env`]: Config::from_env
    pub fn resolve(get: impl Fn(&str) -> Option<String>, cwd: &Path) -> Self {
        let bag = Bag { get: &get };

        let default_window_hours = bag.i64_min("SESSION_WINDOW_HOURS", 5, 1);

        Self {
            host: bag.string("HOST", "127.0.0.1"),
            port: bag.parsed("PORT", 3141),
            db_path: bag
                .raw("DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/beacon.db")),
            max_payload_kb: bag.parsed("MAX_PAYLOAD_KB", 10),
            session_timeout_minutes: bag.parsed("SESSION_TIMEOUT_MINUTES", 5),
            max_feed: bag.parsed("MAX_FEED", 200),
            stats_interval_ms: bag.parsed("STATS_INTERVAL_MS", 5000),
            max_sse_clients: bag.parsed("MAX_SSE_CLIENTS", 50),
            sse_heartbeat_ms: bag.parsed("SSE_HEARTBEAT_MS", 30_000),
            auto_import_interval_minutes: bag.parsed("AUTO_IMPORT_MINUTES", 10),
            projects_root: bag
                .raw("PROJECTS_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| detect_projects_root(cwd)),
            usage_monitor: UsageMonitorConfig {
                claude_code: AgentUsageConfig {
                    limit_type: UsageLimitType::Tokens,
                    session_window_hours: bag.i64_min(
                        "SESSION_WINDOW_HOURS_CLAUDE_CODE",
                        default_window_hours,
                        1,
                    ),
                    session_limit: bag.f64_min("SESSION_TOKEN_LIMIT_CLAUDE_CODE", 44_000.0, 0.0),
                    extended_window_hours: bag.i64_min("EXTENDED_WINDOW_HOURS_CLAUDE_CODE", 24, 1),
                    extended_limit: bag.f64_min("EXTENDED_TOKEN_LIMIT_CLAUDE_CODE", 0.0, 0.0),
                },
                codex: AgentUsageConfig {
                    limit_type: UsageLimitType::Cost,
                    session_window_hours: bag.i64_min(
                        "SESSION_WINDOW_HOURS_CODEX",
                        default_window_hours,
                        1,
                    ),
                    session_limit: bag.f64_min("SESSION_COST_LIMIT_CODEX", 500.0, 0.0),
                    extended_window_hours: bag.i64_min("EXTENDED_WINDOW_HOURS_CODEX", 168, 1),
                    extended_limit: bag.f64_min("EXTENDED_COST_LIMIT_CODEX", 1500.0, 0.0),
                },
                default: AgentUsageConfig {
                    limit_type: UsageLimitType::Tokens,
                    session_window_hours: default_window_hours,
                    session_limit: 0.0,
                    extended_window_hours: 24,
                    extended_limit: 0.0,
                },
            },
        }
    }

    /// `host:port` for the TCP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Key lookup with explicit-over-desktop precedence.
struct Bag<'a> {
    get: &'a dyn Fn(&str) -> Option<String>,
}

impl Bag<'_> {
    /// First non-empty value among `BEACON_<suffix>`, `BEACON_DESKTOP_<suffix>`.
    fn raw(&self, suffix: &str) -> Option<String> {
        for prefix in [ENV_PREFIX, DESKTOP_PREFIX] {
            if let Some(value) = (self.get)(&format!("{prefix}{suffix}")) {
                if !value.trim().is_empty() {
                    return Some(value);
                }
            }
        }
        None
    }

    fn string(&self, suffix: &str, default: &str) -> String {
        self.raw(suffix).unwrap_or_else(|| default.to_string())
    }

    /// Parse each precedence level independently so a malformed explicit
    /// value still lets a valid desktop override through.
    fn parsed<T: FromStr + Copy>(&self, suffix: &str, default: T) -> T {
        for prefix in [ENV_PREFIX, DESKTOP_PREFIX] {
            if let Some(value) = (self.get)(&format!("{prefix}{suffix}")) {
                if let Ok(parsed) = value.trim().parse::<T>() {
                    return parsed;
                }
            }
        }
        default
    }

    fn i64_min(&self, suffix: &str, default: i64, min: i64) -> i64 {
        for prefix in [ENV_PREFIX, DESKTOP_PREFIX] {
            if let Some(value) = (self.get)(&format!("{prefix}{suffix}")) {
                match value.trim().parse::<i64>() {
                    Ok(parsed) if parsed >= min => return parsed,
                    _ => {}
                }
            }
        }
        default
    }

    fn f64_min(&self, suffix: &str, default: f64, min: f64) -> f64 {
        for prefix in [ENV_PREFIX, DESKTOP_PREFIX] {
            if let Some(value) = (self.get)(&format!("{prefix}{suffix}")) {
                match value.trim().parse::<f64>() {
                    Ok(parsed) if parsed >= min => return parsed,
                    _ => {}
                }
            }
        }
        default
    }
}

/// Walk up from `cwd` looking for a directory that holds at least two git
/// checkouts — a plausible projects folder. Falls back to `cwd`.
fn detect_projects_root(cwd: &Path) -> PathBuf {
    for ancestor in cwd.ancestors().skip(1) {
        if count_git_checkouts(ancestor) >= 2 {
            return ancestor.to_path_buf();
        }
    }
    cwd.to_path_buf()
}

fn count_git_checkouts(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().join(".git").exists())
        .count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
