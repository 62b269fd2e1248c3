//! Results handed back to the CI provider.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::report::SourceFileIssue;

/// Paths to persisted report artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFiles {
    pub json: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md: Option<PathBuf>,
}

impl OutputFiles {
    pub fn new(json: impl Into<PathBuf>) -> Self {
        Self {
            json: json.into(),
            md: None,
        }
    }

    pub fn with_md(mut self, md: impl Into<PathBuf>) -> Self {
        self.md = Some(md.into());
        self
    }
}

/// Report files of one project, plus the diff when a base was compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFiles {
    pub report: OutputFiles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<OutputFiles>,
}

/// Outcome of one project.
///
/// `files.diff` and `new_issues` are only set when a comparison base existed
/// and a previous report could be obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRunResult {
    pub name: String,
    pub files: ProjectFiles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_issues: Option<Vec<SourceFileIssue>>,
}

impl ProjectRunResult {
    /// Result without comparison output.
    pub fn report_only(name: impl Into<String>, report: OutputFiles) -> Self {
        Self {
            name: name.into(),
            files: ProjectFiles { report, diff: None },
            new_issues: None,
        }
    }

    pub fn has_diff(&self) -> bool {
        self.files.diff.is_some()
    }
}

/// A monorepo member whose run failed without endangering its siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFailure {
    pub name: String,
    pub error: String,
}

/// Top-level result of one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RunResult {
    #[serde(rename_all = "camelCase")]
    Standalone {
        files: ProjectFiles,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_issues: Option<Vec<SourceFileIssue>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment_id: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Monorepo {
        projects: Vec<ProjectRunResult>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failures: Vec<ProjectFailure>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diff_path: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment_id: Option<u64>,
    },
}

impl RunResult {
    pub fn comment_id(&self) -> Option<u64> {
        match self {
            RunResult::Standalone { comment_id, .. } | RunResult::Monorepo { comment_id, .. } => {
                *comment_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_result_standalone_json_shape() {
        let result = RunResult::Standalone {
            files: ProjectFiles {
                report: OutputFiles::new(".code-pushup/.ci/.current/report.json"),
                diff: None,
            },
            new_issues: None,
            comment_id: Some(42),
        };
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["mode"], "standalone");
        assert_eq!(value["commentId"], 42);
        assert!(value["files"].get("diff").is_none());
        assert!(value.get("newIssues").is_none());
    }

    #[test]
    fn test_run_result_monorepo_json_shape() {
        let result = RunResult::Monorepo {
            projects: vec![ProjectRunResult::report_only(
                "backend",
                OutputFiles::new("backend/report.json").with_md("backend/report.md"),
            )],
            failures: vec![],
            diff_path: Some(PathBuf::from(".code-pushup/merged-report-diff.md")),
            comment_id: None,
        };
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["mode"], "monorepo");
        assert_eq!(value["projects"][0]["name"], "backend");
        assert_eq!(value["diffPath"], ".code-pushup/merged-report-diff.md");
        assert!(value.get("failures").is_none());
        assert_eq!(result.comment_id(), None);
    }
}
