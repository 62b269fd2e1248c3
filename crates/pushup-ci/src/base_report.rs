//! Obtaining the base-commit report for a comparison.
//!
//! The provider's artifact cache is tried first. Otherwise the base commit is
//! checked out, the tool is probed with `print-config` and, if usable there,
//! a report is collected. The working tree is always returned to the commit
//! it was on before the checkout.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::domain::error::{CiError, Result};
use crate::domain::project::ProjectConfig;
use crate::domain::refs::GitBranch;
use crate::domain::result::OutputFiles;
use crate::engine::{CommandContext, PersistConfig};
use crate::env::RunEnv;
use crate::git::{
    capture_head_sha, checkout, guard_against_tracked_changes, VersionControl, DEFAULT_REMOTE,
};
use crate::obs::{self, BaseSource};
use crate::output_files::{OutputKind, ReportData};

/// Run `f` with the working tree switched to `base`.
///
/// Holds the run's working-tree lock for the whole scope. After `f` finishes,
/// fails or panics, the previous checkout is restored and HEAD is verified to
/// be back on the commit it started from; a mismatch is a
/// [`CiError::CheckoutRestore`].
pub async fn run_in_base_branch<T, F, Fut>(env: &RunEnv, base: &GitBranch, f: F) -> Result<T>
where
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    let _worktree = env.lock_worktree().await;
    let git = env.git.as_ref();

    let original = capture_head_sha(git).await?;
    guard_against_tracked_changes(git).await?;
    git.fetch(DEFAULT_REMOTE, &base.git_ref, Some(1)).await?;
    checkout(git, &base.sha, true).await?;
    info!(base_ref = %base.git_ref, sha = %base.short_sha(), "switched to base branch");

    let outcome = AssertUnwindSafe(async move { f().await })
        .catch_unwind()
        .await;
    let restored = restore_checkout(git, &original).await;

    match outcome {
        Err(panic) => {
            if let Err(e) = &restored {
                error!(error = %e, "failed to restore checkout after panic");
            }
            std::panic::resume_unwind(panic)
        }
        Ok(result) => {
            if let Err(restore_err) = restored {
                if let Err(e) = &result {
                    warn!(error = %e, "base branch work failed before restore failure");
                }
                return Err(restore_err);
            }
            result
        }
    }
}

async fn restore_checkout(git: &dyn VersionControl, original: &str) -> Result<()> {
    if let Err(e) = checkout(git, "-", true).await {
        warn!(error = %e, "checkout of previous ref failed, falling back to commit");
        checkout(git, original, true).await?;
    }
    let actual = capture_head_sha(git).await?;
    if actual != original {
        return Err(CiError::CheckoutRestore {
            expected: original.to_string(),
            actual,
        });
    }
    debug!(sha = %original, "restored original checkout");
    Ok(())
}

/// Probe whether the tool is usable in the current checkout.
///
/// Any failure means "not usable" and yields `None`.
pub async fn check_print_config(env: &RunEnv, ctx: &CommandContext) -> Option<PersistConfig> {
    match env.engine.print_config(ctx).await {
        Ok(persist) => Some(persist),
        Err(e) => {
            debug!(error = %e, directory = %ctx.directory.display(), "print-config failed");
            None
        }
    }
}

/// Base report from the provider's artifact cache, archived into the
/// previous-report slot. Every failure degrades to `None`.
pub async fn load_cached_base_report(
    env: &RunEnv,
    project: Option<&ProjectConfig>,
) -> Option<ReportData> {
    let artifacts = env.api.artifacts()?;
    let name = project.map(|p| p.name.as_str());

    let path = match artifacts.download_report_artifact(name).await {
        Ok(Some(path)) => path,
        Ok(None) => {
            debug!(project = ?name, "no cached base report");
            return None;
        }
        Err(e) => {
            warn!(project = ?name, error = %e, "failed to download cached base report");
            return None;
        }
    };

    match env
        .output_files()
        .save_report(name, OutputKind::Previous, &OutputFiles::new(path))
        .await
    {
        Ok(report) => {
            info!(project = ?name, "using cached base report");
            Some(report)
        }
        Err(e) => {
            warn!(project = ?name, error = %e, "failed to archive cached base report");
            None
        }
    }
}

/// Base report for one project: the cache first, then a collection run at
/// the base commit. `Ok(None)` means the tool is not usable at the base.
pub async fn collect_previous_report(
    env: &RunEnv,
    project: Option<&ProjectConfig>,
    base: &GitBranch,
    ctx: &CommandContext,
) -> Result<Option<ReportData>> {
    let name = project.map(|p| p.name.as_str());
    let label = name.unwrap_or("-");

    if let Some(cached) = load_cached_base_report(env, project).await {
        obs::emit_base_resolved(label, BaseSource::Cache);
        return Ok(Some(cached));
    }

    let report = run_in_base_branch(env, base, || async {
        let Some(persist) = check_print_config(env, ctx).await else {
            info!(
                project = %label,
                base_ref = %base.git_ref,
                "tool not configured in base branch, skipping comparison"
            );
            return Ok(None);
        };
        env.engine.collect(ctx).await?;
        let report = env
            .output_files()
            .save_report(
                name,
                OutputKind::Previous,
                &persist.report_files(&ctx.directory),
            )
            .await?;
        Ok(Some(report))
    })
    .await?;

    let source = if report.is_some() {
        BaseSource::Collected
    } else {
        BaseSource::Absent
    };
    obs::emit_base_resolved(label, source);
    Ok(report)
}
