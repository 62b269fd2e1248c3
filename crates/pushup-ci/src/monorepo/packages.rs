//! `package.json` workspaces: reading manifests and expanding member globs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::domain::error::{CiError, Result};
use crate::domain::project::ProjectConfig;

/// Package that provides the tool when installed as a dependency.
pub const TOOL_PACKAGE: &str = "@code-pushup/cli";

/// The parts of `package.json` workspace handling reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub workspaces: Option<Workspaces>,
    #[serde(default)]
    pub package_manager: Option<String>,
}

/// `workspaces` is either a pattern list or `{ "packages": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Workspaces {
    Patterns(Vec<String>),
    Config {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl Workspaces {
    pub fn patterns(&self) -> &[String] {
        match self {
            Workspaces::Patterns(patterns) => patterns,
            Workspaces::Config { packages } => packages,
        }
    }
}

impl PackageJson {
    pub fn has_script(&self, script: &str) -> bool {
        self.scripts.contains_key(script)
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.contains_key(name)
            || self.dev_dependencies.contains_key(name)
            || self.optional_dependencies.contains_key(name)
    }

    pub fn has_workspaces_enabled(&self) -> bool {
        self.workspaces
            .as_ref()
            .is_some_and(|w| !w.patterns().is_empty())
    }
}

/// A workspace member.
#[derive(Debug, Clone)]
pub struct WorkspacePackage {
    pub name: String,
    pub directory: PathBuf,
    pub package_json: PackageJson,
}

pub async fn read_package_json(path: &Path) -> Result<PackageJson> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| CiError::Monorepo(format!("invalid {}: {e}", path.display())))
}

/// Root `package.json`, or `None` when it is missing or unreadable.
pub async fn read_root_package_json(cwd: &Path) -> Option<PackageJson> {
    read_package_json(&cwd.join("package.json")).await.ok()
}

pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Members matching `patterns` relative to `cwd`; `!`-prefixed patterns exclude.
pub async fn list_packages(cwd: &Path, patterns: &[String]) -> Result<Vec<WorkspacePackage>> {
    let root = PathBuf::from(glob::Pattern::escape(&cwd.to_string_lossy()));
    let mut included: Vec<PathBuf> = Vec::new();
    let mut excluded: Vec<glob::Pattern> = Vec::new();

    for pattern in patterns {
        let pattern = pattern.trim_end_matches('/');
        if let Some(negated) = pattern.strip_prefix('!') {
            let full = root.join(negated.trim_start_matches("./"));
            let compiled = glob::Pattern::new(&full.to_string_lossy())
                .map_err(|e| CiError::Monorepo(format!("invalid workspace pattern {pattern}: {e}")))?;
            excluded.push(compiled);
            continue;
        }
        let full = root
            .join(pattern.trim_start_matches("./"))
            .join("package.json");
        let entries = glob::glob(&full.to_string_lossy())
            .map_err(|e| CiError::Monorepo(format!("invalid workspace pattern {pattern}: {e}")))?;
        for entry in entries.flatten() {
            if entry.components().any(|c| c.as_os_str() == "node_modules") {
                continue;
            }
            if let Some(dir) = entry.parent() {
                included.push(dir.to_path_buf());
            }
        }
    }

    included.sort();
    included.dedup();

    let mut packages = Vec::new();
    for dir in included {
        if excluded.iter().any(|p| p.matches_path(&dir)) {
            continue;
        }
        let package_json = read_package_json(&dir.join("package.json")).await?;
        let name = package_json.name.clone().unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        packages.push(WorkspacePackage {
            name,
            directory: dir,
            package_json,
        });
    }

    debug!(cwd = %cwd.display(), count = packages.len(), "listed workspace packages");
    Ok(packages)
}

/// Members declared in the root `package.json` `workspaces` field.
pub async fn list_workspaces(cwd: &Path) -> Result<(Vec<WorkspacePackage>, PackageJson)> {
    let root = read_package_json(&cwd.join("package.json")).await?;
    let patterns = root
        .workspaces
        .as_ref()
        .map(|w| w.patterns().to_vec())
        .unwrap_or_default();
    let packages = list_packages(cwd, &patterns).await?;
    Ok((packages, root))
}

/// How a member invokes the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// The member defines a script named after the task.
    Script,
    /// The tool is installed as a dependency of the member or the root.
    Dependency,
}

/// Keep members that can run the tool and build their configs with `bin`.
///
/// A member-local script wins over an installed dependency.
pub fn qualifying_projects<F>(
    packages: &[WorkspacePackage],
    root: &PackageJson,
    task: &str,
    bin: F,
) -> Vec<ProjectConfig>
where
    F: Fn(&str, Invocation) -> String,
{
    let root_installed = root.has_dependency(TOOL_PACKAGE);
    packages
        .iter()
        .filter_map(|pkg| {
            let invocation = if pkg.package_json.has_script(task) {
                Invocation::Script
            } else if root_installed || pkg.package_json.has_dependency(TOOL_PACKAGE) {
                Invocation::Dependency
            } else {
                return None;
            };
            Some(
                ProjectConfig::new(&pkg.name, bin(&pkg.name, invocation))
                    .with_directory(&pkg.directory),
            )
        })
        .collect()
}
