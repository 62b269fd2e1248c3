//! Monorepo member configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One monorepo member.
///
/// Call sites take `Option<&ProjectConfig>`; `None` stands for the whole
/// repository in standalone mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Member name (package name or graph project name).
    pub name: String,

    /// Member directory; the run directory is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Shell prefix that runs the tool inside this member.
    pub bin: String,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, bin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directory: None,
            bin: bin.into(),
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

/// Display name of an optional project (`-` for the whole repository).
pub fn project_to_name(project: Option<&ProjectConfig>) -> String {
    project
        .map(|p| p.name.clone())
        .unwrap_or_else(|| "-".to_string())
}
