//! Attribution of newly introduced issues to changed files.
//!
//! An issue is reported when its audit was added or changed in the diff, its
//! file changed between base and head, and no equivalent issue existed in the
//! previous report. Equivalence tolerates renamed files, shifted lines and
//! changed numbers in messages.

use std::cmp::Ordering;
use std::path::Path;

use crate::changed_files::{to_git_path, ChangedFiles};
use crate::report::{
    AuditReport, CategoryRefType, Identity, PluginReport, Report, ReportsDiff, SourceFileIssue,
};

/// Inputs of [`filter_relevant_issues`].
#[derive(Debug, Clone, Copy)]
pub struct IssueFilterInput<'a> {
    pub curr_report: &'a Report,
    pub prev_report: &'a Report,
    pub reports_diff: &'a ReportsDiff,
    pub changed_files: &'a ChangedFiles,
}

/// Issues that are new in the current report and located in changed files,
/// ordered by audit impact, severity, file and line.
pub fn filter_relevant_issues(input: IssueFilterInput<'_>) -> Vec<SourceFileIssue> {
    let IssueFilterInput {
        curr_report,
        prev_report,
        reports_diff,
        changed_files,
    } = input;

    let audits = reports_diff
        .audits
        .added
        .iter()
        .chain(&reports_diff.audits.changed)
        .filter_map(|link| curr_report.audit(&link.plugin.slug, &link.slug));

    let prev_issues: Vec<SourceFileIssue> = prev_report
        .plugins
        .iter()
        .flat_map(|plugin| plugin.audits.iter().flat_map(move |a| audit_issues(plugin, a)))
        .collect();

    let mut issues: Vec<SourceFileIssue> = audits
        .flat_map(|(plugin, audit)| audit_issues(plugin, audit))
        .filter(|issue| changed_files.is_file_changed(&issue.source.file))
        .filter(|issue| {
            !prev_issues
                .iter()
                .any(|prev| issues_match(prev, issue, changed_files))
        })
        .collect();

    issues.sort_by(|a, b| compare_issues(curr_report, a, b));
    issues
}

/// Issues of one audit that point at a source file.
fn audit_issues(plugin: &PluginReport, audit: &AuditReport) -> Vec<SourceFileIssue> {
    audit
        .details
        .iter()
        .flat_map(|details| &details.issues)
        .filter_map(|issue| {
            let source = issue.source.clone()?;
            Some(SourceFileIssue {
                message: issue.message.clone(),
                severity: issue.severity,
                source,
                plugin: Identity {
                    slug: plugin.slug.clone(),
                    title: plugin.title.clone(),
                },
                audit: Identity {
                    slug: audit.slug.clone(),
                    title: audit.title.clone(),
                },
            })
        })
        .collect()
}

/// Whether `prev` (base revision) is the same issue as `curr` (head revision).
pub fn issues_match(prev: &SourceFileIssue, curr: &SourceFileIssue, changed: &ChangedFiles) -> bool {
    prev.plugin.slug == curr.plugin.slug
        && prev.audit.slug == curr.audit.slug
        && prev.severity == curr.severity
        && remove_digits(&prev.message) == remove_digits(&curr.message)
        && changed.adjust_file_name(&prev.source.file) == curr.source.file
        && positions_match(prev, curr, changed)
}

fn positions_match(prev: &SourceFileIssue, curr: &SourceFileIssue, changed: &ChangedFiles) -> bool {
    match (prev.source.position, curr.source.position) {
        (None, None) => true,
        (Some(p), Some(c)) => changed.adjust_line(&prev.source.file, p.start_line) == c.start_line,
        _ => false,
    }
}

fn remove_digits(message: &str) -> String {
    message.chars().filter(|c| !c.is_ascii_digit()).collect()
}

fn compare_issues(report: &Report, a: &SourceFileIssue, b: &SourceFileIssue) -> Ordering {
    audit_impact(report, &b.plugin.slug, &b.audit.slug)
        .total_cmp(&audit_impact(report, &a.plugin.slug, &a.audit.slug))
        .then_with(|| a.severity.rank().cmp(&b.severity.rank()))
        .then_with(|| a.source.file.cmp(&b.source.file))
        .then_with(|| start_line(a).cmp(&start_line(b)))
        .then_with(|| a.plugin.slug.cmp(&b.plugin.slug))
        .then_with(|| a.audit.slug.cmp(&b.audit.slug))
        .then_with(|| a.message.cmp(&b.message))
}

fn start_line(issue: &SourceFileIssue) -> u32 {
    issue.source.position.map(|p| p.start_line).unwrap_or(0)
}

/// Share of category weight the audit holds, scaled by its score loss.
pub fn audit_impact(report: &Report, plugin_slug: &str, audit_slug: &str) -> f64 {
    let Some((plugin, audit)) = report.audit(plugin_slug, audit_slug) else {
        return 0.0;
    };
    let loss = 1.0 - audit.score;

    report
        .categories
        .iter()
        .map(|category| {
            let total: f64 = category.refs.iter().map(|r| r.weight).sum();
            if total <= 0.0 {
                return 0.0;
            }
            category
                .refs
                .iter()
                .filter(|r| r.plugin == plugin_slug)
                .map(|r| match r.ref_type {
                    CategoryRefType::Audit if r.slug == audit_slug => r.weight / total,
                    CategoryRefType::Audit => 0.0,
                    CategoryRefType::Group => {
                        r.weight / total * group_share(plugin, &r.slug, audit_slug)
                    }
                })
                .sum::<f64>()
        })
        .sum::<f64>()
        * loss
}

fn group_share(plugin: &PluginReport, group_slug: &str, audit_slug: &str) -> f64 {
    let Some(group) = plugin.groups.iter().find(|g| g.slug == group_slug) else {
        return 0.0;
    };
    let total: f64 = group.refs.iter().map(|r| r.weight).sum();
    if total <= 0.0 {
        return 0.0;
    }
    group
        .refs
        .iter()
        .filter(|r| r.slug == audit_slug)
        .map(|r| r.weight / total)
        .sum()
}

/// Rewrite every issue path of `report` to be relative to the repository root.
pub fn normalize_issue_paths(report: &mut Report, cwd: &Path, git_root: &Path) {
    for plugin in &mut report.plugins {
        for audit in &mut plugin.audits {
            let Some(details) = audit.details.as_mut() else {
                continue;
            };
            for issue in &mut details.issues {
                if let Some(source) = issue.source.as_mut() {
                    source.file = to_git_path(&source.file, cwd, git_root);
                }
            }
        }
    }
}
