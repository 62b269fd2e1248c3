use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use super::packages::{self, file_exists, Invocation, WorkspacePackage};
use super::{
    selected_names, MonorepoHandler, MonorepoHandlerOptions, MonorepoTool, RunManyProjects,
    DEFAULT_PARALLEL_WORKERS,
};
use crate::domain::error::Result;
use crate::domain::project::ProjectConfig;

const WORKSPACE_FILE: &str = "pnpm-workspace.yaml";

#[derive(Debug, Default, Deserialize)]
struct PnpmWorkspace {
    #[serde(default)]
    packages: Vec<String>,
}

/// Members declared in `pnpm-workspace.yaml`.
pub async fn list_pnpm_packages(cwd: &Path) -> Result<Vec<WorkspacePackage>> {
    let content = tokio::fs::read_to_string(cwd.join(WORKSPACE_FILE)).await?;
    let workspace: PnpmWorkspace = if content.trim().is_empty() {
        PnpmWorkspace::default()
    } else {
        serde_yaml::from_str(&content)?
    };
    packages::list_packages(cwd, &workspace.packages).await
}

/// pnpm workspaces (`pnpm-workspace.yaml`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PnpmHandler;

#[async_trait]
impl MonorepoHandler for PnpmHandler {
    fn tool(&self) -> MonorepoTool {
        MonorepoTool::Pnpm
    }

    async fn is_configured(&self, options: &MonorepoHandlerOptions) -> Result<bool> {
        Ok(file_exists(&options.cwd.join(WORKSPACE_FILE)).await
            && file_exists(&options.cwd.join("package.json")).await)
    }

    async fn list_projects(
        &self,
        options: &MonorepoHandlerOptions,
    ) -> Result<Vec<ProjectConfig>> {
        let members = list_pnpm_packages(&options.cwd).await?;
        let root = packages::read_root_package_json(&options.cwd)
            .await
            .unwrap_or_default();

        Ok(packages::qualifying_projects(
            &members,
            &root,
            &options.task,
            |name, invocation| match invocation {
                Invocation::Script => format!("pnpm --filter={name} run {}", options.task),
                Invocation::Dependency => format!("pnpm --filter={name} exec {}", options.task),
            },
        ))
    }

    fn create_run_many_command(
        &self,
        options: &MonorepoHandlerOptions,
        projects: RunManyProjects<'_>,
    ) -> String {
        let concurrency = options.parallel.concurrency(DEFAULT_PARALLEL_WORKERS);
        let mut args = vec![
            "pnpm --recursive".to_string(),
            format!("--workspace-concurrency={concurrency}"),
        ];
        args.extend(
            selected_names(projects)
                .iter()
                .map(|name| format!("--filter={name}")),
        );
        args.push(format!("run {}", options.task));
        args.join(" ")
    }
}
