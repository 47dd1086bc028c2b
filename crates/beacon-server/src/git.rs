//! Git branch resolver.
//!
//! Given a project name, reports the checked-out branch of
//! `<projects_root>/<project>`, or `None`. Two bounds keep this cheap on
//! the ingest path: a hard timeout on the `git` subprocess and a short
//! cache that also remembers negative results.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::process::Command;
use tracing::debug;

const GIT_TIMEOUT: Duration = Duration::from_secs(2);
const CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    branch: Option<String>,
    resolved_at: Instant,
}

/// Resolves and caches current branches per project.
pub struct BranchResolver {
    projects_root: PathBuf,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl BranchResolver {
    pub fn new(projects_root: PathBuf) -> Self {
        Self {
            projects_root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current branch of the project checkout, if resolvable in time.
    pub async fn resolve(&self, project: &str) -> Option<String> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(project) {
                if entry.resolved_at.elapsed() < CACHE_TTL {
                    return entry.branch.clone();
                }
            }
        }

        let branch = self.query_git(project).await;
        let _ = self.cache.lock().insert(
            project.to_string(),
            CacheEntry {
                branch: branch.clone(),
                resolved_at: Instant::now(),
            },
        );
        branch
    }

    async fn query_git(&self, project: &str) -> Option<String> {
        let dir = self.project_dir(project)?;
        let run = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(&dir)
            .output();

        let output = match tokio::time::timeout(GIT_TIMEOUT, run).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(_) => return None,
            Err(_) => {
                debug!(project, "git branch lookup timed out");
                return None;
            }
        };

        let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!branch.is_empty()).then_some(branch)
    }

    /// The project checkout directory, refusing names that escape the root.
    fn project_dir(&self, project: &str) -> Option<PathBuf> {
        let name = Path::new(project);
        let plain = name
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
            && name.components().count() == 1;
        if !plain {
            return None;
        }
        let dir = self.projects_root.join(project);
        dir.is_dir().then_some(dir)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
