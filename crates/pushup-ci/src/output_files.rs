//! Stable archival layout for produced report files.
//!
//! ```text
//! <output_dir>/.ci/[<project>/]{.current,.previous,.comparison}/{report,report-diff}.{json,md}
//! <output_dir>/merged-report-diff.md
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::error::{CiError, Result};
use crate::domain::result::OutputFiles;
use crate::domain::settings::Settings;

const CI_DIR: &str = ".ci";
const MERGED_DIFF_FILE: &str = "merged-report-diff.md";

/// Which slot of the layout a file set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Current,
    Previous,
    Comparison,
}

impl OutputKind {
    fn dir_name(&self) -> &'static str {
        match self {
            OutputKind::Current => ".current",
            OutputKind::Previous => ".previous",
            OutputKind::Comparison => ".comparison",
        }
    }

    fn stem(&self) -> &'static str {
        match self {
            OutputKind::Current | OutputKind::Previous => "report",
            OutputKind::Comparison => "report-diff",
        }
    }
}

/// An archived report together with its JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportData {
    pub files: OutputFiles,
    pub body: String,
}

/// Copies engine output into the archival layout.
#[derive(Debug, Clone)]
pub struct OutputFileManager {
    output_root: PathBuf,
}

impl OutputFileManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            output_root: settings.directory.join(&settings.output_dir),
        }
    }

    /// Root of the archival layout (`<output_dir>/.ci`).
    pub fn ci_dir(&self) -> PathBuf {
        self.output_root.join(CI_DIR)
    }

    /// Directory of one slot.
    pub fn slot_dir(&self, project: Option<&str>, kind: OutputKind) -> PathBuf {
        let mut dir = self.ci_dir();
        if let Some(project) = project {
            dir.push(project_dir_name(project));
        }
        dir.join(kind.dir_name())
    }

    /// Copy `files` into the slot. The JSON file must exist; a missing
    /// markdown file is dropped from the result.
    pub async fn save(
        &self,
        project: Option<&str>,
        kind: OutputKind,
        files: &OutputFiles,
    ) -> Result<OutputFiles> {
        let dir = self.slot_dir(project, kind);
        tokio::fs::create_dir_all(&dir).await?;

        if !tokio::fs::try_exists(&files.json).await.unwrap_or(false) {
            return Err(CiError::MissingOutput(files.json.display().to_string()));
        }
        let json = dir.join(format!("{}.json", kind.stem()));
        tokio::fs::copy(&files.json, &json).await?;

        let mut saved = OutputFiles::new(json);
        if let Some(md) = &files.md {
            if tokio::fs::try_exists(md).await.unwrap_or(false) {
                let target = dir.join(format!("{}.md", kind.stem()));
                tokio::fs::copy(md, &target).await?;
                saved.md = Some(target);
            }
        }

        debug!(dir = %dir.display(), "saved output files");
        Ok(saved)
    }

    /// [`save`](Self::save) and read the archived JSON body.
    pub async fn save_report(
        &self,
        project: Option<&str>,
        kind: OutputKind,
        files: &OutputFiles,
    ) -> Result<ReportData> {
        let files = self.save(project, kind, files).await?;
        let body = tokio::fs::read_to_string(&files.json).await?;
        Ok(ReportData { files, body })
    }

    /// Write a report body straight into a slot.
    pub async fn write_scratch(
        &self,
        project: Option<&str>,
        name: &str,
        body: &str,
    ) -> Result<PathBuf> {
        let dir = self.slot_dir(project, OutputKind::Comparison);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    /// Copy the merged monorepo diff to its fixed location.
    pub async fn save_merged_diff(&self, md: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_root).await?;
        let target = self.output_root.join(MERGED_DIFF_FILE);
        tokio::fs::copy(md, &target).await?;
        Ok(target)
    }
}

/// Directory-safe form of a project name (`@org/ui` becomes `org-ui`).
pub fn project_dir_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    mapped.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_dir_name() {
        assert_eq!(project_dir_name("@org/ui"), "org-ui");
        assert_eq!(project_dir_name("backend"), "backend");
        assert_eq!(project_dir_name("libs:utils"), "libs-utils");
    }

    #[test]
    fn test_slot_dir_layout() {
        let manager = OutputFileManager::new(&Settings::new("/repo"));
        assert_eq!(
            manager.slot_dir(None, OutputKind::Current),
            PathBuf::from("/repo/.code-pushup/.ci/.current")
        );
        assert_eq!(
            manager.slot_dir(Some("@org/ui"), OutputKind::Comparison),
            PathBuf::from("/repo/.code-pushup/.ci/org-ui/.comparison")
        );
    }

    #[tokio::test]
    async fn test_save_copies_json_and_existing_md() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("out");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("report.json"), "{\"plugins\":[]}").unwrap();
        std::fs::write(src.join("report.md"), "# Report").unwrap();

        let manager = OutputFileManager::new(&Settings::new(dir.path()));
        let files = OutputFiles::new(src.join("report.json")).with_md(src.join("report.md"));
        let saved = manager
            .save_report(Some("api"), OutputKind::Previous, &files)
            .await
            .expect("save");

        let slot = dir.path().join(".code-pushup/.ci/api/.previous");
        assert_eq!(saved.files.json, slot.join("report.json"));
        assert_eq!(saved.files.md, Some(slot.join("report.md")));
        assert_eq!(saved.body, "{\"plugins\":[]}");
    }

    #[tokio::test]
    async fn test_save_tolerates_missing_md() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("diff.json"), "{}").unwrap();
        let manager = OutputFileManager::new(&Settings::new(dir.path()));
        let files = OutputFiles::new(dir.path().join("diff.json")).with_md(dir.path().join("diff.md"));
        let saved = manager
            .save(None, OutputKind::Comparison, &files)
            .await
            .expect("save");
        assert!(saved.json.ends_with(".comparison/report-diff.json"));
        assert!(saved.md.is_none());
    }

    #[tokio::test]
    async fn test_save_requires_json() {
        let dir = tempfile::tempdir().unwrap();
        let manager = OutputFileManager::new(&Settings::new(dir.path()));
        let err = manager
            .save(None, OutputKind::Current, &OutputFiles::new(dir.path().join("nope.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, CiError::MissingOutput(_)));
    }
}
