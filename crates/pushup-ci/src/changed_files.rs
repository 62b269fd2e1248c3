//! Files changed between base and head, with line-level hunks.
//!
//! Paths are relative to the repository root with forward slashes, exactly as
//! `git diff` reports them.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::Result;
use crate::git::VersionControl;

/// A run of lines in one side of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub line: u32,
    pub count: u32,
}

/// One `--unified=0` hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    pub prev: LineRange,
    pub curr: LineRange,
}

/// A changed file in the head revision.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Path in the base revision when the file was renamed or copied.
    pub original_file: Option<String>,
    pub line_changes: Vec<LineChange>,
}

/// Changed files keyed by their head path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangedFiles {
    files: BTreeMap<String, ChangedFile>,
}

impl ChangedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, file: ChangedFile) {
        self.files.insert(path.into(), file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&ChangedFile> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_file_changed(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Head path of a base path, following renames.
    pub fn adjust_file_name<'a>(&'a self, path: &'a str) -> &'a str {
        self.files
            .iter()
            .find(|(_, file)| file.original_file.as_deref() == Some(path))
            .map(|(curr, _)| curr.as_str())
            .unwrap_or(path)
    }

    /// Head line number of a base line, shifted by the hunks above it.
    pub fn adjust_line(&self, path: &str, line: u32) -> u32 {
        let Some(file) = self.files.get(self.adjust_file_name(path)) else {
            return line;
        };
        let offset: i64 = file
            .line_changes
            .iter()
            .filter(|change| change.prev.line < line)
            .map(|change| i64::from(change.curr.count) - i64::from(change.prev.count))
            .sum();
        (i64::from(line) + offset).max(0) as u32
    }
}

impl FromIterator<(String, ChangedFile)> for ChangedFiles {
    fn from_iter<T: IntoIterator<Item = (String, ChangedFile)>>(iter: T) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// List files added, copied, modified or renamed between `base` and `head`.
///
/// `head = None` compares against the working tree. Binary files are skipped.
pub async fn list_changed_files(
    git: &dyn VersionControl,
    base: &str,
    head: Option<&str>,
) -> Result<ChangedFiles> {
    let mut range = vec![base.to_string()];
    if let Some(head) = head {
        range.push(head.to_string());
    }

    let mut args = vec![
        "--numstat".to_string(),
        "-z".to_string(),
        "--diff-filter=ACMR".to_string(),
        "--find-renames".to_string(),
        "--find-copies".to_string(),
    ];
    args.extend(range.iter().cloned());
    let numstat = git.diff(&args).await?;

    let mut files = ChangedFiles::new();
    for entry in parse_numstat(&numstat) {
        if entry.binary {
            continue;
        }
        let mut args = vec![
            "--unified=0".to_string(),
            "--find-renames".to_string(),
            "--find-copies".to_string(),
        ];
        args.extend(range.iter().cloned());
        args.push("--".to_string());
        args.push(entry.path.clone());
        if let Some(prev) = &entry.original {
            args.push(prev.clone());
        }
        let patch = git.diff(&args).await?;
        files.insert(
            entry.path,
            ChangedFile {
                original_file: entry.original,
                line_changes: parse_hunks(&patch),
            },
        );
    }

    debug!(base = %base, changed = files.len(), "listed changed files");
    Ok(files)
}

#[derive(Debug, PartialEq, Eq)]
struct NumstatEntry {
    path: String,
    original: Option<String>,
    binary: bool,
}

/// Parse `git diff --numstat -z` output.
fn parse_numstat(output: &str) -> Vec<NumstatEntry> {
    let mut entries = Vec::new();
    let mut tokens = output.split('\0').filter(|t| !t.is_empty());
    while let Some(token) = tokens.next() {
        let mut fields = token.splitn(3, '\t');
        let (Some(added), Some(_deleted), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let binary = added == "-";
        if path.is_empty() {
            let (Some(prev), Some(curr)) = (tokens.next(), tokens.next()) else {
                break;
            };
            entries.push(NumstatEntry {
                path: curr.to_string(),
                original: Some(prev.to_string()),
                binary,
            });
        } else {
            entries.push(NumstatEntry {
                path: path.to_string(),
                original: None,
                binary,
            });
        }
    }
    entries
}

fn hunk_header() -> &'static Regex {
    static HUNK: OnceLock<Regex> = OnceLock::new();
    HUNK.get_or_init(|| {
        Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("valid hunk regex")
    })
}

/// Parse hunk headers of a unified diff into line changes.
pub fn parse_hunks(patch: &str) -> Vec<LineChange> {
    let range = |line: Option<regex::Match>, count: Option<regex::Match>| LineRange {
        line: line.and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
        count: count.and_then(|m| m.as_str().parse().ok()).unwrap_or(1),
    };
    patch
        .lines()
        .filter_map(|line| hunk_header().captures(line))
        .map(|caps| LineChange {
            prev: range(caps.get(1), caps.get(2)),
            curr: range(caps.get(3), caps.get(4)),
        })
        .collect()
}

/// Convert a path reported by the engine into a repository-root-relative path.
///
/// Relative paths are resolved against `cwd`, which is where the engine ran.
pub fn to_git_path(file: &str, cwd: &Path, git_root: &Path) -> String {
    let path = Path::new(file);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    let absolute = normalize(&absolute);
    let relative = pathdiff::diff_paths(&absolute, normalize(git_root)).unwrap_or(absolute);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize(path: &Path) -> std::path::PathBuf {
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn change(prev: (u32, u32), curr: (u32, u32)) -> LineChange {
        LineChange {
            prev: LineRange {
                line: prev.0,
                count: prev.1,
            },
            curr: LineRange {
                line: curr.0,
                count: curr.1,
            },
        }
    }

    #[test]
    fn test_parse_numstat_plain_and_renamed() {
        let output = "3\t1\tsrc/app.ts\0-\t-\tlogo.png\00\t0\t\0index.js\0index.ts\0";
        let entries = parse_numstat(output);
        assert_eq!(
            entries,
            vec![
                NumstatEntry {
                    path: "src/app.ts".to_string(),
                    original: None,
                    binary: false
                },
                NumstatEntry {
                    path: "logo.png".to_string(),
                    original: None,
                    binary: true
                },
                NumstatEntry {
                    path: "index.ts".to_string(),
                    original: Some("index.js".to_string()),
                    binary: false
                },
            ]
        );
    }

    #[test]
    fn test_parse_hunks_defaults_count_to_one() {
        let patch = "\
diff --git a/a.ts b/a.ts
--- a/a.ts
+++ b/a.ts
@@ -3 +3,2 @@ fn main
-old
+new
+newer
@@ -10,0 +12,4 @@
+x
";
        assert_eq!(
            parse_hunks(patch),
            vec![change((3, 1), (3, 2)), change((10, 0), (12, 4))]
        );
    }

    #[test]
    fn test_adjust_file_name_follows_rename() {
        let files: ChangedFiles = [(
            "index.ts".to_string(),
            ChangedFile {
                original_file: Some("index.js".to_string()),
                line_changes: vec![],
            },
        )]
        .into_iter()
        .collect();
        assert_eq!(files.adjust_file_name("index.js"), "index.ts");
        assert_eq!(files.adjust_file_name("other.js"), "other.js");
        assert!(files.is_file_changed("index.ts"));
        assert!(!files.is_file_changed("index.js"));
    }

    #[test]
    fn test_adjust_line_applies_preceding_hunks_only() {
        let files: ChangedFiles = [(
            "a.ts".to_string(),
            ChangedFile {
                original_file: None,
                line_changes: vec![change((3, 1), (3, 3)), change((20, 4), (22, 0))],
            },
        )]
        .into_iter()
        .collect();
        assert_eq!(files.adjust_line("a.ts", 2), 2);
        assert_eq!(files.adjust_line("a.ts", 10), 12);
        assert_eq!(files.adjust_line("a.ts", 30), 28);
        assert_eq!(files.adjust_line("untouched.ts", 30), 30);
    }

    #[test]
    fn test_to_git_path() {
        let root = PathBuf::from("/repo");
        assert_eq!(
            to_git_path("src/index.ts", &root.join("packages/app"), &root),
            "packages/app/src/index.ts"
        );
        assert_eq!(
            to_git_path("./index.ts", &root, &root),
            "index.ts"
        );
        assert_eq!(
            to_git_path("/repo/libs/x/../y/z.ts", &root, &root),
            "libs/y/z.ts"
        );
    }
}
