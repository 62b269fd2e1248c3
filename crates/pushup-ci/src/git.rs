//! Version-control client and the safety wrappers around branch switching.
//!
//! [`VersionControl`] is the injectable seam; [`GitCli`] drives the `git`
//! binary. The free functions compose the raw operations into the guarded
//! forms the orchestration relies on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::error::{CiError, Result};
use crate::process::{execute_process, ProcessConfig};

/// Remote the base ref is fetched from.
pub const DEFAULT_REMOTE: &str = "origin";
/// Marker left behind by the last `git fetch`.
pub const FETCH_HEAD: &str = "FETCH_HEAD";

/// Operations the CI core needs from version control.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Fetch `git_ref` from `remote` without requiring a tracking branch.
    async fn fetch(&self, remote: &str, git_ref: &str, depth: Option<u32>) -> Result<()>;

    /// Raw `git checkout <args>`.
    async fn checkout(&self, args: &[&str]) -> Result<()>;

    /// Resolve a revision to a full SHA.
    async fn rev_parse(&self, rev: &str) -> Result<String>;

    /// Paths reported by `git status --porcelain`.
    async fn status(&self) -> Result<Vec<String>>;

    /// Like [`status`](Self::status), ignoring untracked files.
    async fn tracked_changes(&self) -> Result<Vec<String>>;

    /// Discard tracked changes.
    async fn reset_hard(&self) -> Result<()>;

    /// Remove untracked files and directories.
    async fn clean(&self) -> Result<()>;

    /// Raw `git diff <args>` output.
    async fn diff(&self, args: &[String]) -> Result<String>;

    /// Absolute path of the repository root.
    async fn toplevel(&self) -> Result<PathBuf>;

    /// Checked-out branch name, `None` when HEAD is detached.
    async fn current_branch(&self) -> Result<Option<String>>;
}

/// [`VersionControl`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
    timeout_secs: Option<u64>,
}

impl GitCli {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn git<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = ProcessConfig::new("git", &self.dir)
            .args(args)
            .timeout(self.timeout_secs);
        let command = config.args.join(" ");
        match execute_process(&config).await {
            Ok(output) => Ok(output.stdout),
            Err(CiError::Process { stderr, .. }) => Err(CiError::Git {
                command,
                stderr: stderr.trim().to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn fetch(&self, remote: &str, git_ref: &str, depth: Option<u32>) -> Result<()> {
        let mut args = vec!["fetch".to_string(), remote.to_string(), git_ref.to_string()];
        if let Some(depth) = depth {
            args.push(format!("--depth={depth}"));
        }
        self.git(args).await?;
        Ok(())
    }

    async fn checkout(&self, args: &[&str]) -> Result<()> {
        let mut full = vec!["checkout"];
        full.extend_from_slice(args);
        self.git(full).await?;
        Ok(())
    }

    async fn rev_parse(&self, rev: &str) -> Result<String> {
        let out = self.git(["rev-parse", rev]).await?;
        let sha = out.trim().to_string();
        if sha.is_empty() {
            return Err(CiError::Git {
                command: format!("rev-parse {rev}"),
                stderr: "returned empty output".to_string(),
            });
        }
        Ok(sha)
    }

    async fn status(&self) -> Result<Vec<String>> {
        let out = self.git(["status", "--porcelain"]).await?;
        Ok(parse_porcelain(&out))
    }

    async fn tracked_changes(&self) -> Result<Vec<String>> {
        let out = self
            .git(["status", "--porcelain", "--untracked-files=no"])
            .await?;
        Ok(parse_porcelain(&out))
    }

    async fn reset_hard(&self) -> Result<()> {
        self.git(["reset", "--hard"]).await?;
        Ok(())
    }

    async fn clean(&self) -> Result<()> {
        self.git(["clean", "-f", "-d"]).await?;
        Ok(())
    }

    async fn diff(&self, args: &[String]) -> Result<String> {
        let mut full = vec!["diff".to_string()];
        full.extend(args.iter().cloned());
        self.git(full).await
    }

    async fn toplevel(&self) -> Result<PathBuf> {
        let out = self.git(["rev-parse", "--show-toplevel"]).await?;
        Ok(PathBuf::from(out.trim()))
    }

    async fn current_branch(&self) -> Result<Option<String>> {
        let out = self.git(["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let name = out.trim();
        Ok((!name.is_empty() && name != "HEAD").then(|| name.to_string()))
    }
}

fn parse_porcelain(out: &str) -> Vec<String> {
    out.lines()
        .filter(|line| line.len() > 3)
        .map(|line| line[3..].to_string())
        .collect()
}

/// Fail fast if the working tree has uncommitted changes.
pub async fn guard_against_local_changes(git: &dyn VersionControl) -> Result<()> {
    let files = git.status().await?;
    if !files.is_empty() {
        warn!(files = files.len(), "working tree is dirty");
        return Err(CiError::LocalChanges { files });
    }
    Ok(())
}

/// Fail fast if tracked files were modified. Untracked output survives a
/// forced checkout, modified tracked files do not.
pub async fn guard_against_tracked_changes(git: &dyn VersionControl) -> Result<()> {
    let files = git.tracked_changes().await?;
    if !files.is_empty() {
        warn!(files = files.len(), "tracked files have uncommitted changes");
        return Err(CiError::LocalChanges { files });
    }
    Ok(())
}

/// Switch the working tree to `target`, optionally forcing.
pub async fn checkout(git: &dyn VersionControl, target: &str, force: bool) -> Result<()> {
    if force {
        git.checkout(&["-f", target]).await
    } else {
        git.checkout(&[target]).await
    }
}

/// Guarded checkout: optionally discard local changes, refuse to switch over
/// a dirty tree, then check out `target`.
pub async fn safe_checkout(git: &dyn VersionControl, target: &str, force_clean: bool) -> Result<()> {
    if force_clean {
        info!(target = %target, "discarding local changes before checkout");
        git.reset_hard().await?;
        git.clean().await?;
    }
    guard_against_local_changes(git).await?;
    checkout(git, target, false).await?;
    debug!(target = %target, "checked out");
    Ok(())
}

/// Capture the HEAD commit SHA.
pub async fn capture_head_sha(git: &dyn VersionControl) -> Result<String> {
    git.rev_parse("HEAD").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn capture_head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        let sha = capture_head_sha(&git).await.unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn rev_parse_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new(dir.path());
        let err = git.rev_parse("HEAD").await.unwrap_err();
        assert!(matches!(err, CiError::Git { .. }));
    }

    #[tokio::test]
    async fn guard_passes_on_clean_tree() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        guard_against_local_changes(&git).await.unwrap();
    }

    #[tokio::test]
    async fn guard_rejects_untracked_file() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("stray.txt"), "x").unwrap();
        let git = GitCli::new(repo.path());
        let err = guard_against_local_changes(&git).await.unwrap_err();
        match err {
            CiError::LocalChanges { files } => assert_eq!(files, vec!["stray.txt"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn safe_checkout_refuses_dirty_tree() {
        let repo = make_git_repo();
        run_git(repo.path(), &["branch", "other"]);
        std::fs::write(repo.path().join("stray.txt"), "x").unwrap();
        let git = GitCli::new(repo.path());
        let err = safe_checkout(&git, "other", false).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn safe_checkout_force_clean_discards_changes() {
        let repo = make_git_repo();
        run_git(repo.path(), &["branch", "other"]);
        std::fs::write(repo.path().join("stray.txt"), "x").unwrap();
        let git = GitCli::new(repo.path());
        safe_checkout(&git, "other", true).await.unwrap();
        assert!(!repo.path().join("stray.txt").exists());
        assert!(git.status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tracked_guard_ignores_untracked_output() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("README.md"), "hello").unwrap();
        run_git(repo.path(), &["add", "README.md"]);
        run_git(repo.path(), &["commit", "-m", "readme"]);
        std::fs::create_dir_all(repo.path().join(".code-pushup")).unwrap();
        std::fs::write(repo.path().join(".code-pushup/report.json"), "{}").unwrap();
        let git = GitCli::new(repo.path());
        guard_against_tracked_changes(&git).await.unwrap();

        std::fs::write(repo.path().join("README.md"), "edited").unwrap();
        let err = guard_against_tracked_changes(&git).await.unwrap_err();
        match err {
            CiError::LocalChanges { files } => assert_eq!(files, vec!["README.md"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn current_branch_is_none_when_detached() {
        let repo = make_git_repo();
        let git = GitCli::new(repo.path());
        assert!(git.current_branch().await.unwrap().is_some());

        let sha = capture_head_sha(&git).await.unwrap();
        git.checkout(&["--detach", &sha]).await.unwrap();
        assert_eq!(git.current_branch().await.unwrap(), None);
    }
}
