//! Report-collection engine seam.
//!
//! The engine is a black box with four commands: `print-config`, `collect`,
//! `compare` and `merge-diffs`. [`CliReportEngine`] shells out to it; tests
//! inject their own [`ReportEngine`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::error::{CiError, Result};
use crate::domain::project::ProjectConfig;
use crate::domain::result::OutputFiles;
use crate::domain::settings::{Settings, DEFAULT_OUTPUT_DIR};
use crate::process::{execute_process, ProcessConfig};

/// Default report file name (without extension).
pub const DEFAULT_FILENAME: &str = "report";
/// File name of the merged monorepo diff (without `-diff` suffix and extension).
pub const MERGED_REPORT_FILENAME: &str = "merged-report";

/// Where and how to invoke the engine for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Shell prefix (the project's own bin in monorepos).
    pub bin: String,
    /// Working directory of the engine.
    pub directory: PathBuf,
    /// Engine config file.
    pub config: Option<PathBuf>,
}

impl CommandContext {
    /// Context for `project`, or for the whole repository when `None`.
    pub fn new(settings: &Settings, project: Option<&ProjectConfig>) -> Self {
        Self {
            bin: project
                .map(|p| p.bin.clone())
                .unwrap_or_else(|| settings.bin.clone()),
            directory: project
                .and_then(|p| p.directory.clone())
                .unwrap_or_else(|| settings.directory.clone()),
            config: settings.config.clone(),
        }
    }

    /// Context running `bin` from the repository root.
    pub fn at_root(settings: &Settings, bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            directory: settings.directory.clone(),
            config: settings.config.clone(),
        }
    }
}

/// Persistence settings resolved by `print-config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_filename")]
    pub filename: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_filename() -> String {
    DEFAULT_FILENAME.to_string()
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            filename: default_filename(),
        }
    }
}

impl PersistConfig {
    fn resolve(&self, directory: &Path, stem: &str) -> OutputFiles {
        let dir = directory.join(&self.output_dir);
        OutputFiles::new(dir.join(format!("{stem}.json"))).with_md(dir.join(format!("{stem}.md")))
    }

    /// Report files `collect` writes when run in `directory`.
    pub fn report_files(&self, directory: &Path) -> OutputFiles {
        self.resolve(directory, &self.filename)
    }

    /// Diff files `compare` writes when run in `directory`.
    pub fn diff_files(&self, directory: &Path) -> OutputFiles {
        self.resolve(directory, &format!("{}-diff", self.filename))
    }
}

#[derive(Debug, Deserialize)]
struct PrintedConfig {
    #[serde(default)]
    persist: PersistConfig,
}

/// Parse `print-config` stdout, tolerating log lines around the JSON body.
pub fn parse_print_config(stdout: &str) -> Result<PersistConfig> {
    let trimmed = stdout.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(CiError::PrintConfig(
                "no JSON object in print-config output".to_string(),
            ))
        }
    };
    let printed: PrintedConfig = serde_json::from_str(body)?;
    Ok(printed.persist)
}

/// Arguments of `compare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareOptions {
    pub before: PathBuf,
    pub after: PathBuf,
    pub label: Option<String>,
}

/// The report-collection engine.
#[async_trait]
pub trait ReportEngine: Send + Sync {
    /// Resolve the persistence configuration. Failure means the tool is not
    /// usable in the current checkout.
    async fn print_config(&self, ctx: &CommandContext) -> Result<PersistConfig>;

    /// Run audits and persist a report.
    async fn collect(&self, ctx: &CommandContext) -> Result<()>;

    /// Compute a report diff and persist it.
    async fn compare(&self, ctx: &CommandContext, options: &CompareOptions) -> Result<()>;

    /// Merge per-project diffs into one markdown document, returning its path.
    async fn merge_diffs(
        &self,
        ctx: &CommandContext,
        files: &[PathBuf],
        output_dir: &Path,
    ) -> Result<PathBuf>;
}

/// [`ReportEngine`] that invokes `<bin> <command>` through the shell.
#[derive(Debug, Clone, Default)]
pub struct CliReportEngine {
    timeout_secs: Option<u64>,
    silent: bool,
}

impl CliReportEngine {
    pub fn new(settings: &Settings) -> Self {
        Self {
            timeout_secs: settings.process_timeout_secs,
            silent: settings.silent,
        }
    }

    fn command(&self, ctx: &CommandContext, command: &str) -> ProcessConfig {
        let mut config = ProcessConfig::shell(&ctx.bin, &ctx.directory)
            .arg(command)
            .timeout(self.timeout_secs);
        if let Some(path) = &ctx.config {
            config = config.arg(format!("--config={}", path.display()));
        }
        config
    }

    async fn run(&self, config: ProcessConfig) -> Result<String> {
        let output = execute_process(&config).await?;
        if !self.silent && !output.stdout.trim().is_empty() {
            info!(command = %output.command, "{}", output.stdout.trim_end());
        }
        Ok(output.stdout)
    }
}

const PERSIST_FORMATS: [&str; 2] = ["--persist.format=json", "--persist.format=md"];

#[async_trait]
impl ReportEngine for CliReportEngine {
    async fn print_config(&self, ctx: &CommandContext) -> Result<PersistConfig> {
        let config = self.command(ctx, "print-config");
        let output = execute_process(&config)
            .await
            .map_err(|e| CiError::PrintConfig(e.to_string()))?;
        let persist = parse_print_config(&output.stdout)?;
        debug!(output_dir = %persist.output_dir.display(), filename = %persist.filename, "loaded persist config");
        Ok(persist)
    }

    async fn collect(&self, ctx: &CommandContext) -> Result<()> {
        self.run(self.command(ctx, "collect").args(PERSIST_FORMATS))
            .await?;
        Ok(())
    }

    async fn compare(&self, ctx: &CommandContext, options: &CompareOptions) -> Result<()> {
        let mut config = self
            .command(ctx, "compare")
            .arg(format!("--before={}", options.before.display()))
            .arg(format!("--after={}", options.after.display()));
        if let Some(label) = &options.label {
            config = config.arg(format!("--label={label}"));
        }
        self.run(config.args(PERSIST_FORMATS)).await?;
        Ok(())
    }

    async fn merge_diffs(
        &self,
        ctx: &CommandContext,
        files: &[PathBuf],
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let config = self
            .command(ctx, "merge-diffs")
            .args(files.iter().map(|f| format!("--files={}", f.display())))
            .arg(format!("--persist.outputDir={}", output_dir.display()))
            .arg(format!("--persist.filename={MERGED_REPORT_FILENAME}"));
        self.run(config).await?;
        Ok(output_dir.join(format!("{MERGED_REPORT_FILENAME}-diff.md")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_context_prefers_project_values() {
        let settings = Settings::new("/repo");
        let project = ProjectConfig::new("web", "npx nx run web:code-pushup --")
            .with_directory("/repo/apps/web");

        let ctx = CommandContext::new(&settings, Some(&project));
        assert_eq!(ctx.bin, "npx nx run web:code-pushup --");
        assert_eq!(ctx.directory, PathBuf::from("/repo/apps/web"));

        let ctx = CommandContext::new(&settings, None);
        assert_eq!(ctx.bin, "npx --no-install code-pushup");
        assert_eq!(ctx.directory, PathBuf::from("/repo"));

        let bare = ProjectConfig::new("api", "npm --workspace=api run code-pushup --");
        assert_eq!(
            CommandContext::new(&settings, Some(&bare)).directory,
            PathBuf::from("/repo")
        );
    }

    #[test]
    fn test_persist_config_paths() {
        let persist = PersistConfig::default();
        let files = persist.report_files(Path::new("/repo"));
        assert_eq!(files.json, PathBuf::from("/repo/.code-pushup/report.json"));
        assert_eq!(files.md, Some(PathBuf::from("/repo/.code-pushup/report.md")));

        let diff = persist.diff_files(Path::new("/repo"));
        assert_eq!(diff.json, PathBuf::from("/repo/.code-pushup/report-diff.json"));
    }

    #[test]
    fn test_parse_print_config_with_noise() {
        let stdout = "npm warn exec something\n{\"plugins\": [], \"persist\": {\"outputDir\": \"tmp/out\", \"filename\": \"quality\"}}\n";
        let persist = parse_print_config(stdout).expect("parse");
        assert_eq!(persist.output_dir, PathBuf::from("tmp/out"));
        assert_eq!(persist.filename, "quality");
    }

    #[test]
    fn test_parse_print_config_defaults_missing_persist() {
        let persist = parse_print_config("{\"plugins\": []}").expect("parse");
        assert_eq!(persist, PersistConfig::default());
    }

    #[test]
    fn test_parse_print_config_rejects_non_json() {
        let err = parse_print_config("command not found: code-pushup").unwrap_err();
        assert!(matches!(err, CiError::PrintConfig(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_engine_print_config_failure_maps_to_print_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path()).with_bin("exit 1 #");
        let engine = CliReportEngine::new(&settings);
        let ctx = CommandContext::new(&settings, None);
        let err = engine.print_config(&ctx).await.unwrap_err();
        assert!(matches!(err, CiError::PrintConfig(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cli_engine_collect_passes_persist_formats() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path()).with_bin("echo");
        let engine = CliReportEngine::new(&settings);
        let ctx = CommandContext::new(&settings, None);
        engine.collect(&ctx).await.expect("collect");
        let stdout = engine
            .run(engine.command(&ctx, "collect").args(PERSIST_FORMATS))
            .await
            .expect("run");
        assert_eq!(
            stdout.trim(),
            "collect --persist.format=json --persist.format=md"
        );
    }
}
