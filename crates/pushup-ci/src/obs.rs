//! Lifecycle events of a CI run.
//!
//! Events are `info!` records with an `event` field so they can be picked out
//! of JSON logs. Project work runs inside [`project_span`].

use tracing::{info, warn, Span};

use crate::domain::refs::GitRefs;

/// Where a project's base report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSource {
    /// Downloaded from the provider's artifact cache.
    Cache,
    /// Collected by checking out the base commit.
    Collected,
    /// No usable base report.
    Absent,
}

impl BaseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseSource::Cache => "cache",
            BaseSource::Collected => "collected",
            BaseSource::Absent => "absent",
        }
    }
}

/// Span tagging all records of one project's run.
pub fn project_span(project: &str) -> Span {
    tracing::info_span!("pushup.project", project = %project)
}

pub fn emit_run_started(refs: &GitRefs, monorepo: bool) {
    info!(
        event = "run.started",
        head_ref = %refs.head.git_ref,
        head_sha = %refs.head.short_sha(),
        base_ref = refs.base.as_ref().map(|b| b.git_ref.as_str()).unwrap_or("-"),
        monorepo = monorepo,
    );
}

pub fn emit_project_started(project: &str) {
    info!(event = "project.started", project = %project);
}

pub fn emit_project_finished(project: &str, has_diff: bool, new_issues: Option<usize>) {
    info!(
        event = "project.finished",
        project = %project,
        has_diff = has_diff,
        new_issues = new_issues,
    );
}

pub fn emit_project_failed(project: &str, error: &dyn std::fmt::Display) {
    warn!(event = "project.failed", project = %project, error = %error);
}

pub fn emit_base_resolved(project: &str, source: BaseSource) {
    info!(event = "base.resolved", project = %project, source = source.as_str());
}

pub fn emit_run_finished(duration_ms: u64, projects: usize, failures: usize) {
    info!(
        event = "run.finished",
        duration_ms = duration_ms,
        projects = projects,
        failures = failures,
    );
}
