//! The slice of the report and report-diff documents the CI core reads.
//!
//! Both documents belong to the report engine; only the fields needed to
//! attribute issues are modelled and everything else is ignored.

use serde::{Deserialize, Serialize};

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

impl IssueSeverity {
    /// Sort rank, most severe first.
    pub fn rank(&self) -> u8 {
        match self {
            IssueSeverity::Error => 0,
            IssueSeverity::Warning => 1,
            IssueSeverity::Info => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePosition {
    pub start_line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<SourcePosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub message: String,
    pub severity: IssueSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDetails {
    #[serde(default)]
    pub issues: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<AuditDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRef {
    pub slug: String,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub slug: String,
    #[serde(default)]
    pub refs: Vec<WeightedRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginReport {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub audits: Vec<AuditReport>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryRefType {
    Audit,
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub slug: String,
    pub plugin: String,
    #[serde(rename = "type")]
    pub ref_type: CategoryRefType,
    #[serde(default)]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub slug: String,
    #[serde(default)]
    pub refs: Vec<CategoryRef>,
}

/// A collected report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub plugins: Vec<PluginReport>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Report {
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    pub fn plugin(&self, slug: &str) -> Option<&PluginReport> {
        self.plugins.iter().find(|p| p.slug == slug)
    }

    pub fn audit(&self, plugin: &str, audit: &str) -> Option<(&PluginReport, &AuditReport)> {
        let plugin = self.plugin(plugin)?;
        let audit = plugin.audits.iter().find(|a| a.slug == audit)?;
        Some((plugin, audit))
    }
}

/// Plugin identity inside a diff entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMeta {
    pub slug: String,
    #[serde(default)]
    pub title: String,
}

/// An audit referenced from a report diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditDiffLink {
    pub slug: String,
    pub plugin: PluginMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditsDiff {
    #[serde(default)]
    pub added: Vec<AuditDiffLink>,
    #[serde(default)]
    pub changed: Vec<AuditDiffLink>,
    #[serde(default)]
    pub removed: Vec<AuditDiffLink>,
    #[serde(default)]
    pub unchanged: Vec<AuditDiffLink>,
}

/// A computed report diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportsDiff {
    #[serde(default)]
    pub audits: AuditsDiff,
}

impl ReportsDiff {
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}

/// Plugin or audit identity attached to an attributed issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub slug: String,
    pub title: String,
}

/// An issue attributed to a concrete file, with its audit and plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileIssue {
    pub message: String,
    pub severity: IssueSeverity,
    pub source: SourceLocation,
    pub plugin: Identity,
    pub audit: Identity,
}
