//! Process-wide settings for one invocation.
//!
//! Settings deserialize from TOML with every field optional; the CLI layers
//! its flags on top with the `with_*` helpers. Nothing mutates them once a
//! run starts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{CiError, Result};
use crate::monorepo::MonorepoTool;

/// Default tool invocation name, also the script name looked up in workspaces.
pub const DEFAULT_TASK: &str = "code-pushup";
/// Default shell prefix used to invoke the report engine.
pub const DEFAULT_BIN: &str = "npx --no-install code-pushup";
/// Default engine output directory, relative to the run directory.
pub const DEFAULT_OUTPUT_DIR: &str = ".code-pushup";
/// Default Nx project filter; `{task}` is substituted.
pub const DEFAULT_NX_PROJECTS_FILTER: &str = "--with-target={task}";

/// Monorepo mode: off, auto-detected, or a specific tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "MonorepoRepr", into = "MonorepoRepr")]
pub enum MonorepoMode {
    #[default]
    Off,
    Auto,
    Tool(MonorepoTool),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MonorepoRepr {
    Flag(bool),
    Tool(MonorepoTool),
}

impl TryFrom<MonorepoRepr> for MonorepoMode {
    type Error = String;

    fn try_from(repr: MonorepoRepr) -> std::result::Result<Self, Self::Error> {
        Ok(match repr {
            MonorepoRepr::Flag(false) => MonorepoMode::Off,
            MonorepoRepr::Flag(true) => MonorepoMode::Auto,
            MonorepoRepr::Tool(tool) => MonorepoMode::Tool(tool),
        })
    }
}

impl From<MonorepoMode> for MonorepoRepr {
    fn from(mode: MonorepoMode) -> Self {
        match mode {
            MonorepoMode::Off => MonorepoRepr::Flag(false),
            MonorepoMode::Auto => MonorepoRepr::Flag(true),
            MonorepoMode::Tool(tool) => MonorepoRepr::Tool(tool),
        }
    }
}

impl MonorepoMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, MonorepoMode::Off)
    }
}

/// Parallel execution knob: `false`, `true` (handler default) or a worker count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "ParallelRepr", into = "ParallelRepr")]
pub enum Parallelism {
    #[default]
    Off,
    Default,
    Workers(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ParallelRepr {
    Flag(bool),
    Workers(usize),
}

impl TryFrom<ParallelRepr> for Parallelism {
    type Error = String;

    fn try_from(repr: ParallelRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ParallelRepr::Flag(false) => Ok(Parallelism::Off),
            ParallelRepr::Flag(true) => Ok(Parallelism::Default),
            ParallelRepr::Workers(0) => Err("parallel worker count must be positive".to_string()),
            ParallelRepr::Workers(n) => Ok(Parallelism::Workers(n)),
        }
    }
}

impl From<Parallelism> for ParallelRepr {
    fn from(parallel: Parallelism) -> Self {
        match parallel {
            Parallelism::Off => ParallelRepr::Flag(false),
            Parallelism::Default => ParallelRepr::Flag(true),
            Parallelism::Workers(n) => ParallelRepr::Workers(n),
        }
    }
}

impl Parallelism {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Parallelism::Off)
    }

    /// Concurrency level this setting resolves to.
    pub fn concurrency(&self, default_workers: usize) -> usize {
        match self {
            Parallelism::Off => 1,
            Parallelism::Default => default_workers,
            Parallelism::Workers(n) => *n,
        }
    }
}

/// Configuration for one invocation of the CI core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Repository (or monorepo root) directory the run operates in.
    pub directory: PathBuf,

    /// Attribute newly introduced issues to changed files.
    pub detect_new_issues: bool,

    /// Verbose logging.
    pub debug: bool,

    /// Do not echo subprocess output.
    pub silent: bool,

    /// Monorepo mode.
    pub monorepo: MonorepoMode,

    /// Parallel execution of monorepo members.
    pub parallel: Parallelism,

    /// Allow-list of monorepo member names; all members when absent.
    pub projects: Option<Vec<String>>,

    /// Tool invocation name (script name in workspaces).
    pub task: String,

    /// Shell prefix invoking the report engine for the whole repository.
    pub bin: String,

    /// Engine config file passed as `--config`.
    pub config: Option<PathBuf>,

    /// Engine output directory, relative to the run directory.
    pub output_dir: PathBuf,

    /// Do not create or update a pull-request comment.
    pub skip_comment: bool,

    /// Filter arguments for `nx show projects`.
    pub nx_projects_filter: Vec<String>,

    /// Per-subprocess timeout.
    pub process_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            detect_new_issues: true,
            debug: false,
            silent: false,
            monorepo: MonorepoMode::Off,
            parallel: Parallelism::Off,
            projects: None,
            task: DEFAULT_TASK.to_string(),
            bin: DEFAULT_BIN.to_string(),
            config: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            skip_comment: false,
            nx_projects_filter: vec![DEFAULT_NX_PROJECTS_FILTER.to_string()],
            process_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Defaults rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            return Err(CiError::Config("task must not be empty".to_string()));
        }
        if self.bin.trim().is_empty() {
            return Err(CiError::Config("bin must not be empty".to_string()));
        }
        if self.process_timeout_secs == Some(0) {
            return Err(CiError::Config(
                "process_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_monorepo(mut self, monorepo: MonorepoMode) -> Self {
        self.monorepo = monorepo;
        self
    }

    pub fn with_parallel(mut self, parallel: Parallelism) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_projects(mut self, projects: Vec<String>) -> Self {
        self.projects = Some(projects);
        self
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }

    pub fn with_detect_new_issues(mut self, enabled: bool) -> Self {
        self.detect_new_issues = enabled;
        self
    }

    pub fn with_skip_comment(mut self, skip: bool) -> Self {
        self.skip_comment = skip;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// `nx_projects_filter` with `{task}` substituted.
    pub fn resolved_nx_filter(&self) -> Vec<String> {
        self.nx_projects_filter
            .iter()
            .map(|arg| arg.replace("{task}", &self.task))
            .collect()
    }
}
