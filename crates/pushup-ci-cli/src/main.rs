//! `pushup-ci`: run the Code PushUp CI flow from a terminal or a CI job.
//!
//! Collects reports at the head commit, compares against `--base-ref` when
//! given and prints the run result as JSON on stdout. Logs go to stderr.
//! Pull-request comments are never posted from here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{debug, info};

use pushup_ci::git::{DEFAULT_REMOTE, FETCH_HEAD};
use pushup_ci::telemetry::{init_tracing, level_for};
use pushup_ci::{
    run_in_ci, GitBranch, GitCli, GitRefs, LocalProvider, MonorepoMode, MonorepoTool,
    Parallelism, RunEnv, Settings, VersionControl,
};

#[derive(Parser, Debug)]
#[command(name = "pushup-ci")]
#[command(version = pushup_ci::VERSION)]
#[command(about = "Collect, compare and report Code PushUp results in CI", long_about = None)]
struct Cli {
    /// Repository (or monorepo root) to run in
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,

    /// TOML settings file; flags override its values
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Head branch name (default: current branch)
    #[arg(long)]
    head_ref: Option<String>,

    /// Head commit (default: HEAD)
    #[arg(long)]
    head_sha: Option<String>,

    /// Base branch to compare against; omit for a push run
    #[arg(long)]
    base_ref: Option<String>,

    /// Base commit (default: tip of the base branch on origin)
    #[arg(long, requires = "base_ref")]
    base_sha: Option<String>,

    /// Monorepo mode; auto-detects the tool unless one is named
    #[arg(long, num_args = 0..=1, value_name = "TOOL")]
    monorepo: Option<Option<MonorepoTool>>,

    /// Run monorepo projects in bulk, optionally with a worker count
    #[arg(long, num_args = 0..=1, value_name = "WORKERS")]
    parallel: Option<Option<usize>>,

    /// Only run these monorepo projects
    #[arg(long = "project", value_name = "NAME")]
    projects: Vec<String>,

    /// Do not attribute new issues to changed files
    #[arg(long)]
    no_detect_new_issues: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config_file {
            Some(path) => Settings::load(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };

        settings.directory = std::fs::canonicalize(&self.directory)
            .with_context(|| format!("Directory not found: {}", self.directory.display()))?;
        settings.skip_comment = true;
        if self.verbose {
            settings = settings.with_debug(true);
        }
        if self.no_detect_new_issues {
            settings = settings.with_detect_new_issues(false);
        }
        if let Some(tool) = self.monorepo {
            settings = settings.with_monorepo(match tool {
                Some(tool) => MonorepoMode::Tool(tool),
                None => MonorepoMode::Auto,
            });
        }
        match self.parallel {
            Some(Some(0)) => bail!("--parallel worker count must be positive"),
            Some(Some(n)) => settings = settings.with_parallel(Parallelism::Workers(n)),
            Some(None) => settings = settings.with_parallel(Parallelism::Default),
            None => {}
        }
        if !self.projects.is_empty() {
            settings = settings.with_projects(self.projects.clone());
        }
        settings.validate()?;
        Ok(settings)
    }
}

async fn resolve_refs(cli: &Cli, git: &dyn VersionControl) -> Result<GitRefs> {
    let head_sha = match &cli.head_sha {
        Some(sha) => sha.clone(),
        None => git.rev_parse("HEAD").await.context("Failed to resolve HEAD")?,
    };
    let head_ref = match &cli.head_ref {
        Some(name) => name.clone(),
        None => git
            .current_branch()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| head_sha.clone()),
    };
    let head = GitBranch::new(head_ref, head_sha);

    let Some(base_ref) = &cli.base_ref else {
        return Ok(GitRefs::head_only(head));
    };
    let base_sha = match &cli.base_sha {
        Some(sha) => sha.clone(),
        None => resolve_base_sha(git, base_ref).await?,
    };
    Ok(GitRefs::with_base(head, GitBranch::new(base_ref, base_sha)))
}

async fn resolve_base_sha(git: &dyn VersionControl, base_ref: &str) -> Result<String> {
    let remote_ref = format!("{DEFAULT_REMOTE}/{base_ref}");
    if let Ok(sha) = git.rev_parse(&remote_ref).await {
        return Ok(sha);
    }
    debug!(base_ref = %base_ref, "base ref not known locally, fetching");
    git.fetch(DEFAULT_REMOTE, base_ref, Some(1))
        .await
        .with_context(|| format!("Failed to fetch base ref {base_ref}"))?;
    Ok(git.rev_parse(FETCH_HEAD).await?)
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    let git = GitCli::new(&settings.directory).with_timeout(settings.process_timeout_secs);
    let refs = resolve_refs(&cli, &git).await?;
    info!(
        directory = %settings.directory.display(),
        head = %refs.head.git_ref,
        base = refs.base.as_ref().map(|b| b.git_ref.as_str()).unwrap_or("-"),
        "starting run"
    );

    let env = RunEnv::new(refs, settings, Arc::new(LocalProvider));
    let result = run_in_ci(&env).await.context("CI run failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn check_directory(path: &Path) -> Result<()> {
    if !path.is_dir() {
        bail!("Not a directory: {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    check_directory(&cli.directory)?;
    let settings = cli.settings()?;
    init_tracing(cli.json, level_for(settings.debug));
    run(cli, settings).await
}
