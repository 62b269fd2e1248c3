//! Shared fixtures: a scripted report engine, a recording provider and
//! throwaway git repositories with an `origin` remote.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use pushup_ci::{
    CiError, CommandContext, Comment, CompareOptions, GitBranch, GitCli, GitRefs, PersistConfig,
    ProviderApi, ReportArtifactSource, ReportEngine, Result, RunEnv, Settings,
};

/// File that makes the engine usable in a directory.
pub const CONFIG_MARKER: &str = "code-pushup.config.json";
/// File that makes `collect` fail in a directory.
pub const FAIL_MARKER: &str = "fail-collect";
/// Tracked file that `collect` overwrites, leaving local changes behind.
pub const TOUCH_MARKER: &str = "touch-on-collect";
/// File that makes `collect` detach HEAD onto its parent commit.
pub const DETACH_MARKER: &str = "detach-on-collect";

pub const PLUGIN: &str = "file-ext";
pub const AUDIT: &str = "no-ts";

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Engine that lints for `.ts` files: one warning per file, score
/// `1 / (1 + issues)`.
///
/// Bulk commands (`--recursive`) collect every registered member, or only the
/// `--filter=<name>` ones.
#[derive(Default)]
pub struct FakeEngine {
    members: BTreeMap<String, PathBuf>,
    calls: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, name: &str, directory: impl Into<PathBuf>) -> Self {
        self.members.insert(name.to_string(), directory.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn collect_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("collect"))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn collect_in(&self, directory: &Path) -> Result<()> {
        if directory.join(FAIL_MARKER).exists() {
            return Err(CiError::Process {
                command: "collect".to_string(),
                exit_code: 1,
                stdout: String::new(),
                stderr: "audit runner crashed".to_string(),
            });
        }
        if directory.join(TOUCH_MARKER).exists() {
            std::fs::write(directory.join(TOUCH_MARKER), "touched\n")?;
        }
        if directory.join(DETACH_MARKER).exists() {
            run_git(directory, &["checkout", "--quiet", "--detach", "HEAD^"]);
        }
        let mut files = Vec::new();
        list_ts_files(directory, directory, &mut files);
        files.sort();

        let issues: Vec<Value> = files
            .iter()
            .map(|file| {
                json!({
                    "message": format!("{file} is a TypeScript file"),
                    "severity": "warning",
                    "source": { "file": file, "position": { "startLine": 1 } }
                })
            })
            .collect();
        let score = 1.0 / (1.0 + issues.len() as f64);
        let report = json!({
            "plugins": [{
                "slug": PLUGIN,
                "title": "File extensions",
                "audits": [{
                    "slug": AUDIT,
                    "title": "No TypeScript",
                    "score": score,
                    "details": { "issues": issues }
                }]
            }],
            "categories": [{
                "slug": "conventions",
                "refs": [{ "slug": AUDIT, "plugin": PLUGIN, "type": "audit", "weight": 1 }]
            }]
        });

        let out = directory.join(".code-pushup");
        std::fs::create_dir_all(&out)?;
        std::fs::write(out.join("report.json"), serde_json::to_string_pretty(&report)?)?;
        std::fs::write(
            out.join("report.md"),
            format!("# Report\n\n{} issues\n", files.len()),
        )?;
        Ok(())
    }
}

fn list_ts_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name == "node_modules" {
            continue;
        }
        if path.is_dir() {
            list_ts_files(root, &path, out);
        } else if name.ends_with(".ts") {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

fn audit_links(report: &Value) -> BTreeMap<(String, String), (String, f64)> {
    let mut links = BTreeMap::new();
    for plugin in report["plugins"].as_array().into_iter().flatten() {
        let plugin_slug = plugin["slug"].as_str().unwrap_or_default().to_string();
        let plugin_title = plugin["title"].as_str().unwrap_or_default().to_string();
        for audit in plugin["audits"].as_array().into_iter().flatten() {
            let slug = audit["slug"].as_str().unwrap_or_default().to_string();
            let score = audit["score"].as_f64().unwrap_or_default();
            links.insert((plugin_slug.clone(), slug), (plugin_title.clone(), score));
        }
    }
    links
}

#[async_trait]
impl ReportEngine for FakeEngine {
    async fn print_config(&self, ctx: &CommandContext) -> Result<PersistConfig> {
        self.record(format!("print-config:{}", ctx.directory.display()));
        if ctx.directory.join(CONFIG_MARKER).exists() {
            Ok(PersistConfig::default())
        } else {
            Err(CiError::PrintConfig(format!(
                "no {CONFIG_MARKER} in {}",
                ctx.directory.display()
            )))
        }
    }

    async fn collect(&self, ctx: &CommandContext) -> Result<()> {
        self.record(format!("collect:{}", ctx.bin));
        if !ctx.bin.contains("--recursive") {
            return self.collect_in(&ctx.directory);
        }
        let filters: Vec<&str> = ctx
            .bin
            .split_whitespace()
            .filter_map(|arg| arg.strip_prefix("--filter="))
            .collect();
        for (name, directory) in &self.members {
            let selected = filters.is_empty() || filters.contains(&name.as_str());
            if selected && directory.join(CONFIG_MARKER).exists() {
                self.collect_in(directory)?;
            }
        }
        Ok(())
    }

    async fn compare(&self, ctx: &CommandContext, options: &CompareOptions) -> Result<()> {
        self.record(format!(
            "compare:{}",
            options.label.as_deref().unwrap_or("-")
        ));
        let before: Value = serde_json::from_str(&std::fs::read_to_string(&options.before)?)?;
        let after: Value = serde_json::from_str(&std::fs::read_to_string(&options.after)?)?;
        let before = audit_links(&before);
        let after = audit_links(&after);

        let link = |(plugin, slug): &(String, String), title: &str| {
            json!({ "slug": slug, "plugin": { "slug": plugin, "title": title } })
        };
        let (mut added, mut changed, mut removed, mut unchanged) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for (key, (title, score)) in &after {
            match before.get(key) {
                None => added.push(link(key, title)),
                Some((_, prev)) if (prev - score).abs() > f64::EPSILON => {
                    changed.push(link(key, title))
                }
                Some(_) => unchanged.push(link(key, title)),
            }
        }
        for (key, (title, _)) in &before {
            if !after.contains_key(key) {
                removed.push(link(key, title));
            }
        }

        let diff = json!({
            "audits": {
                "added": added,
                "changed": changed,
                "removed": removed,
                "unchanged": unchanged
            }
        });
        let out = ctx.directory.join(".code-pushup");
        std::fs::create_dir_all(&out)?;
        std::fs::write(out.join("report-diff.json"), serde_json::to_string_pretty(&diff)?)?;
        std::fs::write(
            out.join("report-diff.md"),
            format!(
                "# Code PushUp\n\n{} changed audits\n",
                changed.len() + added.len()
            ),
        )?;
        Ok(())
    }

    async fn merge_diffs(
        &self,
        _ctx: &CommandContext,
        files: &[PathBuf],
        output_dir: &Path,
    ) -> Result<PathBuf> {
        self.record(format!("merge-diffs:{}", files.len()));
        std::fs::create_dir_all(output_dir)?;
        let body: String = files
            .iter()
            .map(|f| format!("- {}\n", f.display()))
            .collect();
        let path = output_dir.join("merged-report-diff.md");
        std::fs::write(&path, format!("# Merged\n\n{body}"))?;
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Provider keeping comments in memory, with an optional artifact cache.
#[derive(Default)]
pub struct RecordingApi {
    pub comments: Mutex<Vec<Comment>>,
    cached: Option<CachedReports>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `reports` (keyed by project name, `-` for the whole repository)
    /// as base report artifacts.
    pub fn with_cached_reports(mut self, reports: BTreeMap<String, PathBuf>) -> Self {
        self.cached = Some(CachedReports { reports });
        self
    }

    pub fn comment_bodies(&self) -> Vec<String> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.body.clone())
            .collect()
    }
}

struct CachedReports {
    reports: BTreeMap<String, PathBuf>,
}

#[async_trait]
impl ReportArtifactSource for CachedReports {
    async fn download_report_artifact(&self, project: Option<&str>) -> Result<Option<PathBuf>> {
        Ok(self.reports.get(project.unwrap_or("-")).cloned())
    }
}

#[async_trait]
impl ProviderApi for RecordingApi {
    async fn list_comments(&self) -> Result<Vec<Comment>> {
        Ok(self.comments.lock().unwrap().clone())
    }

    async fn create_comment(&self, body: &str) -> Result<Comment> {
        let mut comments = self.comments.lock().unwrap();
        let comment = Comment {
            id: comments.len() as u64 + 1,
            body: body.to_string(),
            url: None,
        };
        comments.push(comment.clone());
        Ok(comment)
    }

    async fn update_comment(&self, id: u64, body: &str) -> Result<Comment> {
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| CiError::Provider(format!("no comment {id}")))?;
        comment.body = body.to_string();
        Ok(comment.clone())
    }

    fn artifacts(&self) -> Option<&dyn ReportArtifactSource> {
        self.cached
            .as_ref()
            .map(|cached| cached as &dyn ReportArtifactSource)
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A clone of a bare `origin`, on an unborn `main` branch.
pub struct TestRepo {
    _root: tempfile::TempDir,
    pub work: PathBuf,
}

impl TestRepo {
    pub fn init() -> Self {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().canonicalize().unwrap();
        run_git(&base, &["init", "--bare", "origin.git"]);
        run_git(&base, &["clone", "origin.git", "work"]);
        let work = base.join("work");
        run_git(&work, &["config", "user.name", "test-user"]);
        run_git(&work, &["config", "user.email", "test@example.com"]);
        run_git(&work, &["checkout", "-b", "main"]);
        Self { _root: root, work }
    }

    pub fn write(&self, path: &str, content: &str) -> &Self {
        let path = self.work.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
        self
    }

    pub fn git(&self, args: &[&str]) -> String {
        run_git(&self.work, args)
    }

    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "--all"]);
        self.git(&["commit", "-m", message]);
        self.head()
    }

    pub fn push(&self, branch: &str) {
        self.git(&["push", "origin", branch]);
    }

    pub fn branch(&self, name: &str) {
        self.git(&["checkout", "-b", name]);
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn current_branch(&self) -> String {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn refs(&self, head: &str, base: Option<&str>) -> GitRefs {
        let head = GitBranch::new(head, self.git(&["rev-parse", head]));
        match base {
            Some(base) => {
                GitRefs::with_base(head, GitBranch::new(base, self.git(&["rev-parse", base])))
            }
            None => GitRefs::head_only(head),
        }
    }

    pub fn env(
        &self,
        refs: GitRefs,
        settings: Settings,
        api: Arc<dyn ProviderApi>,
        engine: Arc<FakeEngine>,
    ) -> RunEnv {
        RunEnv::with_components(
            refs,
            settings,
            api,
            Arc::new(GitCli::new(&self.work)),
            engine,
        )
    }
}
