//! Monorepo tool detection and member discovery.
//!
//! Each supported tool is a [`MonorepoHandler`]. Handlers are tried in a
//! fixed priority order; the first one whose configuration is present wins.

pub mod npm;
pub mod nx;
pub mod packages;
pub mod pnpm;
pub mod turbo;
pub mod yarn;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::error::{CiError, Result};
use crate::domain::project::ProjectConfig;
use crate::domain::settings::{MonorepoMode, Parallelism, Settings};

pub use npm::NpmHandler;
pub use nx::NxHandler;
pub use pnpm::PnpmHandler;
pub use turbo::TurboHandler;
pub use yarn::{YarnClassicHandler, YarnModernHandler};

/// Supported monorepo tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonorepoTool {
    Nx,
    Turbo,
    Yarn,
    Pnpm,
    Npm,
}

impl std::fmt::Display for MonorepoTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MonorepoTool::Nx => "nx",
            MonorepoTool::Turbo => "turbo",
            MonorepoTool::Yarn => "yarn",
            MonorepoTool::Pnpm => "pnpm",
            MonorepoTool::Npm => "npm",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for MonorepoTool {
    type Err = CiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nx" => Ok(MonorepoTool::Nx),
            "turbo" => Ok(MonorepoTool::Turbo),
            "yarn" => Ok(MonorepoTool::Yarn),
            "pnpm" => Ok(MonorepoTool::Pnpm),
            "npm" => Ok(MonorepoTool::Npm),
            other => Err(CiError::Config(format!("unknown monorepo tool: {other}"))),
        }
    }
}

/// Order in which tools are probed during auto-detection.
pub const MONOREPO_TOOL_DETECTION_PRIORITY: [MonorepoTool; 5] = [
    MonorepoTool::Nx,
    MonorepoTool::Turbo,
    MonorepoTool::Yarn,
    MonorepoTool::Pnpm,
    MonorepoTool::Npm,
];

/// Worker count used when parallelism is enabled without an explicit number.
pub const DEFAULT_PARALLEL_WORKERS: usize = 3;

/// What handlers need to know about the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonorepoHandlerOptions {
    /// Monorepo root.
    pub cwd: PathBuf,
    /// Script name or Nx target.
    pub task: String,
    pub parallel: Parallelism,
    /// Extra `nx show projects` arguments.
    pub nx_projects_filter: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl MonorepoHandlerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cwd: settings.directory.clone(),
            task: settings.task.clone(),
            parallel: settings.parallel,
            nx_projects_filter: settings.resolved_nx_filter(),
            timeout_secs: settings.process_timeout_secs,
        }
    }
}

/// Members a run-many command targets.
#[derive(Debug, Clone, Copy)]
pub struct RunManyProjects<'a> {
    /// Every listed member.
    pub all: &'a [ProjectConfig],
    /// Restrict to these member names when set.
    pub only: Option<&'a [String]>,
}

/// One monorepo tool.
#[async_trait]
pub trait MonorepoHandler: Send + Sync {
    fn tool(&self) -> MonorepoTool;

    /// Whether the tool's configuration exists in `options.cwd`.
    async fn is_configured(&self, options: &MonorepoHandlerOptions) -> Result<bool>;

    /// Members that can run the task, each with its own invocation.
    async fn list_projects(&self, options: &MonorepoHandlerOptions)
        -> Result<Vec<ProjectConfig>>;

    /// A single shell prefix running the task for many members at once.
    fn create_run_many_command(
        &self,
        options: &MonorepoHandlerOptions,
        projects: RunManyProjects<'_>,
    ) -> String;

    /// Whether the run-many command executes members concurrently and can be
    /// restricted to a subset of members.
    fn supports_parallel(&self) -> bool {
        true
    }
}

/// All handlers in detection order. Yarn is split by major version.
pub fn handlers() -> Vec<Arc<dyn MonorepoHandler>> {
    vec![
        Arc::new(NxHandler),
        Arc::new(TurboHandler),
        Arc::new(YarnModernHandler),
        Arc::new(YarnClassicHandler),
        Arc::new(PnpmHandler),
        Arc::new(NpmHandler),
    ]
}

/// First configured handler in priority order.
pub async fn detect_monorepo_tool(
    options: &MonorepoHandlerOptions,
) -> Result<Option<Arc<dyn MonorepoHandler>>> {
    for handler in handlers() {
        if handler.is_configured(options).await? {
            debug!(tool = %handler.tool(), "detected monorepo tool");
            return Ok(Some(handler));
        }
    }
    Ok(None)
}

/// Handler for an explicitly requested tool.
pub async fn get_handler(
    tool: MonorepoTool,
    options: &MonorepoHandlerOptions,
) -> Result<Arc<dyn MonorepoHandler>> {
    let candidates: Vec<_> = handlers().into_iter().filter(|h| h.tool() == tool).collect();
    for handler in &candidates {
        if handler.is_configured(options).await? {
            return Ok(Arc::clone(handler));
        }
    }
    candidates
        .into_iter()
        .last()
        .ok_or_else(|| CiError::Monorepo(format!("no handler for {tool}")))
}

/// Builds run-many prefixes for a fixed member list.
#[derive(Clone)]
pub struct RunManyCommand {
    handler: Arc<dyn MonorepoHandler>,
    options: MonorepoHandlerOptions,
    projects: Vec<ProjectConfig>,
}

impl RunManyCommand {
    /// Prefix targeting every member, or only `only` when given.
    pub fn command(&self, only: Option<&[String]>) -> String {
        self.handler.create_run_many_command(
            &self.options,
            RunManyProjects {
                all: &self.projects,
                only,
            },
        )
    }

    pub fn concurrency(&self) -> usize {
        self.options.parallel.concurrency(DEFAULT_PARALLEL_WORKERS)
    }

    pub fn tool(&self) -> MonorepoTool {
        self.handler.tool()
    }
}

impl std::fmt::Debug for RunManyCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunManyCommand")
            .field("tool", &self.handler.tool())
            .field("projects", &self.projects.len())
            .finish()
    }
}

/// Result of member discovery.
#[derive(Debug, Clone)]
pub struct MonorepoProjects {
    pub tool: MonorepoTool,
    pub projects: Vec<ProjectConfig>,
    /// Present when members should run in bulk.
    pub run_many: Option<RunManyCommand>,
}

/// Resolve the handler for `settings.monorepo`, list members and apply the
/// `projects` allow-list.
pub async fn list_monorepo_projects(settings: &Settings) -> Result<MonorepoProjects> {
    let options = MonorepoHandlerOptions::from_settings(settings);
    let handler = match settings.monorepo {
        MonorepoMode::Off => {
            return Err(CiError::Monorepo("monorepo mode is disabled".to_string()))
        }
        MonorepoMode::Auto => detect_monorepo_tool(&options).await?.ok_or_else(|| {
            CiError::Monorepo(format!(
                "no supported monorepo tool detected in {}",
                options.cwd.display()
            ))
        })?,
        MonorepoMode::Tool(tool) => get_handler(tool, &options).await?,
    };

    let mut projects = handler.list_projects(&options).await?;
    if let Some(allowed) = &settings.projects {
        for name in allowed {
            if !projects.iter().any(|p| &p.name == name) {
                warn!(project = %name, "requested project not found in monorepo");
            }
        }
        projects.retain(|p| allowed.contains(&p.name));
    }
    info!(
        tool = %handler.tool(),
        count = projects.len(),
        "listed monorepo projects"
    );

    let run_many = if settings.parallel.is_enabled() {
        if handler.supports_parallel() {
            Some(RunManyCommand {
                handler: Arc::clone(&handler),
                options,
                projects: projects.clone(),
            })
        } else {
            info!(tool = %handler.tool(), "tool runs members sequentially; running projects one by one");
            None
        }
    } else {
        None
    };

    Ok(MonorepoProjects {
        tool: handler.tool(),
        projects,
        run_many,
    })
}

/// Names selected by `projects.only`, or every member.
pub(crate) fn selected_names(projects: RunManyProjects<'_>) -> Vec<String> {
    match projects.only {
        Some(only) => only.to_vec(),
        None => projects.all.iter().map(|p| p.name.clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn options(cwd: &Path) -> MonorepoHandlerOptions {
        MonorepoHandlerOptions::from_settings(&Settings::new(cwd))
    }

    #[test]
    fn test_tool_parse_and_display() {
        for tool in MONOREPO_TOOL_DETECTION_PRIORITY {
            assert_eq!(tool.to_string().parse::<MonorepoTool>().unwrap(), tool);
        }
        assert!("lerna".parse::<MonorepoTool>().is_err());
    }

    #[test]
    fn test_handler_order_follows_priority() {
        let tools: Vec<_> = handlers().iter().map(|h| h.tool()).collect();
        let mut deduped = tools.clone();
        deduped.dedup();
        assert_eq!(deduped, MONOREPO_TOOL_DETECTION_PRIORITY);
    }

    #[tokio::test]
    async fn test_detect_returns_none_without_markers() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("package.json"), r#"{"name": "solo"}"#);
        assert!(detect_monorepo_tool(&options(dir.path())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detect_prefers_nx_over_npm() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("package.json"),
            r#"{"workspaces": ["packages/*"]}"#,
        );
        write(&dir.path().join("package-lock.json"), "{}");
        write(&dir.path().join("nx.json"), "{}");
        let handler = detect_monorepo_tool(&options(dir.path()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handler.tool(), MonorepoTool::Nx);
    }

    #[tokio::test]
    async fn test_detect_marker_without_manifest_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("nx.json"), "{}");
        write(&dir.path().join("pnpm-workspace.yaml"), "packages: []\n");
        assert!(detect_monorepo_tool(&options(dir.path())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_monorepo_projects_applies_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        write(&cwd.join("package.json"), r#"{"workspaces": ["packages/*"]}"#);
        write(&cwd.join("package-lock.json"), "{}");
        for name in ["a", "b", "c"] {
            write(
                &cwd.join(format!("packages/{name}/package.json")),
                &format!(r#"{{"name": "{name}", "scripts": {{"code-pushup": "code-pushup"}}}}"#),
            );
        }

        let settings = Settings::new(cwd)
            .with_monorepo(MonorepoMode::Auto)
            .with_projects(vec!["c".to_string(), "a".to_string(), "zzz".to_string()]);
        let listed = list_monorepo_projects(&settings).await.unwrap();
        assert_eq!(listed.tool, MonorepoTool::Npm);
        let names: Vec<_> = listed.projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(listed.run_many.is_none());
    }

    #[tokio::test]
    async fn test_run_many_only_for_parallel_capable_tools() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path();
        write(&cwd.join("package.json"), r#"{"name": "root"}"#);
        write(&cwd.join("pnpm-workspace.yaml"), "packages:\n  - 'packages/*'\n");
        write(
            &cwd.join("packages/a/package.json"),
            r#"{"name": "a", "scripts": {"code-pushup": "code-pushup"}}"#,
        );

        let settings = Settings::new(cwd)
            .with_monorepo(MonorepoMode::Auto)
            .with_parallel(Parallelism::Workers(4));
        let listed = list_monorepo_projects(&settings).await.unwrap();
        let run_many = listed.run_many.expect("pnpm supports bulk runs");
        assert_eq!(run_many.concurrency(), 4);
        assert_eq!(
            run_many.command(None),
            "pnpm --recursive --workspace-concurrency=4 --filter=a run code-pushup"
        );
    }

    #[tokio::test]
    async fn test_auto_detection_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path()).with_monorepo(MonorepoMode::Auto);
        let err = list_monorepo_projects(&settings).await.unwrap_err();
        assert!(matches!(err, CiError::Monorepo(_)));
        assert!(!err.is_fatal());
    }
}
