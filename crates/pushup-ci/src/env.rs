//! Run environment threaded through every operation of a CI run.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::info;

use crate::changed_files::{list_changed_files, ChangedFiles};
use crate::domain::error::{CiError, Result};
use crate::domain::refs::{GitBranch, GitRefs};
use crate::domain::settings::Settings;
use crate::engine::{CliReportEngine, ReportEngine};
use crate::git::{GitCli, VersionControl, DEFAULT_REMOTE, FETCH_HEAD};
use crate::output_files::OutputFileManager;
use crate::provider::ProviderApi;

/// Immutable context of one run plus the shared state its operations need.
///
/// Cloning is cheap and clones share the working-tree lock and caches.
#[derive(Clone)]
pub struct RunEnv {
    pub refs: GitRefs,
    pub settings: Arc<Settings>,
    pub api: Arc<dyn ProviderApi>,
    pub git: Arc<dyn VersionControl>,
    pub engine: Arc<dyn ReportEngine>,
    worktree: Arc<Mutex<()>>,
    changed_files: Arc<OnceCell<Arc<ChangedFiles>>>,
    git_root: Arc<OnceCell<PathBuf>>,
}

impl RunEnv {
    /// Environment using the `git` binary and the CLI engine.
    pub fn new(refs: GitRefs, settings: Settings, api: Arc<dyn ProviderApi>) -> Self {
        let git = GitCli::new(&settings.directory).with_timeout(settings.process_timeout_secs);
        let engine = CliReportEngine::new(&settings);
        Self::with_components(refs, settings, api, Arc::new(git), Arc::new(engine))
    }

    /// Environment with injected version-control and engine implementations.
    pub fn with_components(
        refs: GitRefs,
        settings: Settings,
        api: Arc<dyn ProviderApi>,
        git: Arc<dyn VersionControl>,
        engine: Arc<dyn ReportEngine>,
    ) -> Self {
        Self {
            refs,
            settings: Arc::new(settings),
            api,
            git,
            engine,
            worktree: Arc::new(Mutex::new(())),
            changed_files: Arc::new(OnceCell::new()),
            git_root: Arc::new(OnceCell::new()),
        }
    }

    pub fn output_files(&self) -> OutputFileManager {
        OutputFileManager::new(&self.settings)
    }

    /// Exclusive access to the working tree. Held for the whole of a base
    /// branch checkout and for fetches that move `FETCH_HEAD`.
    pub(crate) async fn lock_worktree(&self) -> MutexGuard<'_, ()> {
        self.worktree.lock().await
    }

    /// Repository root, resolved once per run.
    pub async fn git_root(&self) -> Result<PathBuf> {
        self.git_root
            .get_or_try_init(|| async { self.git.toplevel().await })
            .await
            .cloned()
    }

    /// Files changed between `base` and HEAD, computed once per run.
    pub async fn changed_files(&self, base: &GitBranch) -> Result<Arc<ChangedFiles>> {
        self.changed_files
            .get_or_try_init(|| async {
                let _worktree = self.lock_worktree().await;
                self.git.fetch(DEFAULT_REMOTE, &base.git_ref, Some(1)).await?;
                let files = list_changed_files(self.git.as_ref(), FETCH_HEAD, Some("HEAD")).await?;
                info!(
                    base_ref = %base.git_ref,
                    count = files.len(),
                    "listed changed files"
                );
                Ok::<_, CiError>(Arc::new(files))
            })
            .await
            .map(Arc::clone)
    }
}

impl std::fmt::Debug for RunEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEnv")
            .field("refs", &self.refs)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LocalProvider;

    #[test]
    fn test_clones_share_state() {
        let env = RunEnv::new(
            GitRefs::head_only(GitBranch::new("main", "abc")),
            Settings::new("/repo"),
            Arc::new(LocalProvider),
        );
        let clone = env.clone();
        assert!(Arc::ptr_eq(&env.worktree, &clone.worktree));
        assert!(Arc::ptr_eq(&env.changed_files, &clone.changed_files));
        assert!(format!("{clone:?}").contains("RunEnv"));
    }
}
