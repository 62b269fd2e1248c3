//! Comparing a current report against its base report.

use std::path::Path;

use tracing::{debug, info};

use crate::domain::error::Result;
use crate::domain::project::ProjectConfig;
use crate::domain::refs::GitBranch;
use crate::domain::result::{ProjectFiles, ProjectRunResult};
use crate::engine::{CommandContext, CompareOptions, PersistConfig};
use crate::env::RunEnv;
use crate::issues::{filter_relevant_issues, normalize_issue_paths, IssueFilterInput};
use crate::output_files::{OutputKind, ReportData};
use crate::report::{Report, ReportsDiff, SourceFileIssue};

const BEFORE_FILE: &str = "report-before.json";
const AFTER_FILE: &str = "report-after.json";

/// Everything one comparison needs.
#[derive(Debug, Clone, Copy)]
pub struct CompareArgs<'a> {
    pub project: Option<&'a ProjectConfig>,
    pub ctx: &'a CommandContext,
    pub persist: &'a PersistConfig,
    pub base: &'a GitBranch,
    pub curr: &'a ReportData,
    pub prev: &'a ReportData,
}

/// Run the engine's `compare`, archive the diff and, when enabled, attribute
/// new issues to changed files.
pub async fn compare_reports(env: &RunEnv, args: CompareArgs<'_>) -> Result<ProjectRunResult> {
    let CompareArgs {
        project,
        ctx,
        persist,
        base,
        curr,
        prev,
    } = args;
    let name = project.map(|p| p.name.as_str());
    let outputs = env.output_files();

    let before = outputs.write_scratch(name, BEFORE_FILE, &prev.body).await?;
    let after = outputs.write_scratch(name, AFTER_FILE, &curr.body).await?;

    env.engine
        .compare(
            ctx,
            &CompareOptions {
                before,
                after,
                label: name.map(str::to_string),
            },
        )
        .await?;
    let diff = outputs
        .save(
            name,
            OutputKind::Comparison,
            &persist.diff_files(&ctx.directory),
        )
        .await?;
    info!(project = name.unwrap_or("-"), "compared reports");

    let new_issues = if env.settings.detect_new_issues {
        let diff_body = tokio::fs::read_to_string(&diff.json).await?;
        Some(find_new_issues(env, base, &ctx.directory, curr, prev, &diff_body).await?)
    } else {
        None
    };

    Ok(ProjectRunResult {
        name: project
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "-".to_string()),
        files: ProjectFiles {
            report: curr.files.clone(),
            diff: Some(diff),
        },
        new_issues,
    })
}

async fn find_new_issues(
    env: &RunEnv,
    base: &GitBranch,
    directory: &Path,
    curr: &ReportData,
    prev: &ReportData,
    diff_body: &str,
) -> Result<Vec<SourceFileIssue>> {
    let changed_files = env.changed_files(base).await?;
    let git_root = env.git_root().await?;
    let cwd = tokio::fs::canonicalize(directory)
        .await
        .unwrap_or_else(|_| directory.to_path_buf());
    let git_root = tokio::fs::canonicalize(&git_root).await.unwrap_or(git_root);

    let mut curr_report = Report::from_json(&curr.body)?;
    let mut prev_report = Report::from_json(&prev.body)?;
    normalize_issue_paths(&mut curr_report, &cwd, &git_root);
    normalize_issue_paths(&mut prev_report, &cwd, &git_root);
    let reports_diff = ReportsDiff::from_json(diff_body)?;

    let issues = filter_relevant_issues(IssueFilterInput {
        curr_report: &curr_report,
        prev_report: &prev_report,
        reports_diff: &reports_diff,
        changed_files: changed_files.as_ref(),
    });
    debug!(
        changed_files = changed_files.len(),
        new_issues = issues.len(),
        "filtered relevant issues"
    );
    Ok(issues)
}
