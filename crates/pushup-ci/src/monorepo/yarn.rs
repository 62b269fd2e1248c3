//! Yarn workspaces. Classic (v1) and modern (v2+) differ in how they run
//! commands across members, so each has its own handler.

use std::path::Path;

use async_trait::async_trait;

use super::packages::{self, file_exists, Invocation, PackageJson};
use super::{
    MonorepoHandler, MonorepoHandlerOptions, MonorepoTool, RunManyProjects,
    DEFAULT_PARALLEL_WORKERS,
};
use crate::domain::error::Result;
use crate::domain::project::ProjectConfig;

/// Yarn major version line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YarnFlavor {
    Classic,
    Modern,
}

fn package_manager_major(root: &PackageJson) -> Option<u32> {
    let spec = root.package_manager.as_deref()?.strip_prefix("yarn@")?;
    spec.split('.').next()?.parse().ok()
}

/// Yarn flavor of a workspace root, if it is a Yarn workspace at all.
pub async fn detect_flavor(cwd: &Path) -> Option<YarnFlavor> {
    if !file_exists(&cwd.join("yarn.lock")).await {
        return None;
    }
    let root = packages::read_root_package_json(cwd).await?;
    if !root.has_workspaces_enabled() {
        return None;
    }
    let modern = match package_manager_major(&root) {
        Some(major) => major >= 2,
        None => file_exists(&cwd.join(".yarnrc.yml")).await,
    };
    Some(if modern {
        YarnFlavor::Modern
    } else {
        YarnFlavor::Classic
    })
}

async fn list_yarn_projects<F>(options: &MonorepoHandlerOptions, bin: F) -> Result<Vec<ProjectConfig>>
where
    F: Fn(&str, Invocation) -> String,
{
    let (members, root) = packages::list_workspaces(&options.cwd).await?;
    Ok(packages::qualifying_projects(
        &members,
        &root,
        &options.task,
        bin,
    ))
}

/// Yarn 2 and later (`yarn workspaces foreach`).
#[derive(Debug, Clone, Copy, Default)]
pub struct YarnModernHandler;

#[async_trait]
impl MonorepoHandler for YarnModernHandler {
    fn tool(&self) -> MonorepoTool {
        MonorepoTool::Yarn
    }

    async fn is_configured(&self, options: &MonorepoHandlerOptions) -> Result<bool> {
        Ok(detect_flavor(&options.cwd).await == Some(YarnFlavor::Modern))
    }

    async fn list_projects(
        &self,
        options: &MonorepoHandlerOptions,
    ) -> Result<Vec<ProjectConfig>> {
        list_yarn_projects(options, |name, invocation| match invocation {
            Invocation::Script => format!("yarn workspace {name} run {}", options.task),
            Invocation::Dependency => format!("yarn workspace {name} exec {}", options.task),
        })
        .await
    }

    fn create_run_many_command(
        &self,
        options: &MonorepoHandlerOptions,
        projects: RunManyProjects<'_>,
    ) -> String {
        let mut args = vec!["yarn workspaces foreach".to_string(), "--all".to_string()];
        if let Some(only) = projects.only {
            args.extend(only.iter().map(|name| format!("--include={name}")));
        }
        let concurrency = options.parallel.concurrency(DEFAULT_PARALLEL_WORKERS);
        if concurrency > 1 {
            args.push("--parallel".to_string());
            args.push(format!("--jobs={concurrency}"));
        }
        args.push(format!("run {}", options.task));
        args.join(" ")
    }
}

/// Yarn 1 (`yarn workspaces run`).
#[derive(Debug, Clone, Copy, Default)]
pub struct YarnClassicHandler;

#[async_trait]
impl MonorepoHandler for YarnClassicHandler {
    fn tool(&self) -> MonorepoTool {
        MonorepoTool::Yarn
    }

    async fn is_configured(&self, options: &MonorepoHandlerOptions) -> Result<bool> {
        Ok(detect_flavor(&options.cwd).await == Some(YarnFlavor::Classic))
    }

    async fn list_projects(
        &self,
        options: &MonorepoHandlerOptions,
    ) -> Result<Vec<ProjectConfig>> {
        // Yarn 1 resolves installed binaries without an `exec` subcommand.
        list_yarn_projects(options, |name, invocation| match invocation {
            Invocation::Script => format!("yarn workspace {name} run {}", options.task),
            Invocation::Dependency => format!("yarn workspace {name} {}", options.task),
        })
        .await
    }

    fn create_run_many_command(
        &self,
        options: &MonorepoHandlerOptions,
        _projects: RunManyProjects<'_>,
    ) -> String {
        format!("yarn workspaces run {}", options.task)
    }

    // Yarn 1 neither filters nor parallelizes `workspaces run`.
    fn supports_parallel(&self) -> bool {
        false
    }
}
