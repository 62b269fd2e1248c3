//! Code PushUp CI core.
//!
//! Collects code-quality reports at the head commit, compares them against
//! the base commit of a pull request, attributes newly introduced issues to
//! changed lines and posts the result as a pull-request comment. Monorepos
//! are handled per member, optionally in bulk through the workspace tool.

pub mod base_report;
pub mod changed_files;
pub mod comparator;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod env;
pub mod git;
pub mod issues;
pub mod monorepo;
pub mod obs;
pub mod output_files;
pub mod process;
pub mod provider;
pub mod report;
pub mod telemetry;

pub use base_report::{
    check_print_config, collect_previous_report, load_cached_base_report, run_in_base_branch,
};
pub use changed_files::{list_changed_files, ChangedFile, ChangedFiles};
pub use comparator::{compare_reports, CompareArgs};
pub use coordinator::{run_in_ci, run_on_project};
pub use domain::{
    project_to_name, CiError, GitBranch, GitRefs, MonorepoMode, OutputFiles, Parallelism,
    ProjectConfig, ProjectFailure, ProjectFiles, ProjectRunResult, Result, RunResult, Settings,
};
pub use engine::{CliReportEngine, CommandContext, CompareOptions, PersistConfig, ReportEngine};
pub use env::RunEnv;
pub use git::{GitCli, VersionControl};
pub use issues::{filter_relevant_issues, IssueFilterInput};
pub use monorepo::{
    detect_monorepo_tool, list_monorepo_projects, MonorepoHandler, MonorepoHandlerOptions,
    MonorepoTool,
};
pub use output_files::{OutputFileManager, OutputKind, ReportData};
pub use provider::{
    comment_on_pr, Comment, LocalProvider, ProviderApi, ReportArtifactSource, COMMENT_IDENTIFIER,
};
pub use report::{Report, ReportsDiff, SourceFileIssue};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
