use async_trait::async_trait;

use super::packages::{self, file_exists, Invocation};
use super::{MonorepoHandler, MonorepoHandlerOptions, MonorepoTool, RunManyProjects};
use crate::domain::error::Result;
use crate::domain::project::ProjectConfig;

/// npm workspaces (`package-lock.json` plus a `workspaces` field).
#[derive(Debug, Clone, Copy, Default)]
pub struct NpmHandler;

#[async_trait]
impl MonorepoHandler for NpmHandler {
    fn tool(&self) -> MonorepoTool {
        MonorepoTool::Npm
    }

    async fn is_configured(&self, options: &MonorepoHandlerOptions) -> Result<bool> {
        if !file_exists(&options.cwd.join("package-lock.json")).await {
            return Ok(false);
        }
        Ok(packages::read_root_package_json(&options.cwd)
            .await
            .is_some_and(|root| root.has_workspaces_enabled()))
    }

    async fn list_projects(
        &self,
        options: &MonorepoHandlerOptions,
    ) -> Result<Vec<ProjectConfig>> {
        let (members, root) = packages::list_workspaces(&options.cwd).await?;
        Ok(packages::qualifying_projects(
            &members,
            &root,
            &options.task,
            |name, invocation| match invocation {
                Invocation::Script => format!("npm --workspace={name} run {} --", options.task),
                Invocation::Dependency => {
                    format!("npm --workspace={name} exec {} --", options.task)
                }
            },
        ))
    }

    fn create_run_many_command(
        &self,
        options: &MonorepoHandlerOptions,
        projects: RunManyProjects<'_>,
    ) -> String {
        let target = match projects.only {
            Some(only) => only
                .iter()
                .map(|name| format!("--workspace={name}"))
                .collect::<Vec<_>>()
                .join(" "),
            None => "--workspaces".to_string(),
        };
        format!("npm run {} {target} --if-present --", options.task)
    }

    // npm runs workspace scripts one after another.
    fn supports_parallel(&self) -> bool {
        false
    }
}
