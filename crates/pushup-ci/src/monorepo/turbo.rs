use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::packages::{self, file_exists, PackageJson};
use super::pnpm::{list_pnpm_packages, PnpmHandler};
use super::{
    selected_names, MonorepoHandler, MonorepoHandlerOptions, MonorepoTool, RunManyProjects,
    DEFAULT_PARALLEL_WORKERS,
};
use crate::domain::error::Result;
use crate::domain::project::ProjectConfig;

const TURBO_CONFIG: &str = "turbo.json";

/// `turbo.json`; v1 names the task map `pipeline`, v2 `tasks`.
#[derive(Debug, Default, Deserialize)]
struct TurboConfig {
    #[serde(default)]
    tasks: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pipeline: BTreeMap<String, serde_json::Value>,
}

impl TurboConfig {
    fn defines_task(&self, task: &str) -> bool {
        let suffix = format!("#{task}");
        self.tasks
            .keys()
            .chain(self.pipeline.keys())
            .any(|key| key == task || key.ends_with(&suffix))
    }
}

/// Turborepo on top of pnpm, yarn or npm workspaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurboHandler;

#[async_trait]
impl MonorepoHandler for TurboHandler {
    fn tool(&self) -> MonorepoTool {
        MonorepoTool::Turbo
    }

    async fn is_configured(&self, options: &MonorepoHandlerOptions) -> Result<bool> {
        let path = options.cwd.join(TURBO_CONFIG);
        if !file_exists(&path).await || !file_exists(&options.cwd.join("package.json")).await {
            return Ok(false);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        match serde_json::from_str::<TurboConfig>(&content) {
            Ok(config) => Ok(config.defines_task(&options.task)),
            Err(e) => {
                debug!(error = %e, "unreadable turbo.json");
                Ok(false)
            }
        }
    }

    async fn list_projects(
        &self,
        options: &MonorepoHandlerOptions,
    ) -> Result<Vec<ProjectConfig>> {
        let members = if PnpmHandler.is_configured(options).await? {
            list_pnpm_packages(&options.cwd).await?
        } else {
            packages::list_workspaces(&options.cwd).await?.0
        };

        // Turbo only runs package scripts.
        let scripted: Vec<_> = members
            .into_iter()
            .filter(|m| m.package_json.has_script(&options.task))
            .collect();
        Ok(packages::qualifying_projects(
            &scripted,
            &PackageJson::default(),
            &options.task,
            |name, _| format!("npx turbo run {} --filter={name} --", options.task),
        ))
    }

    fn create_run_many_command(
        &self,
        options: &MonorepoHandlerOptions,
        projects: RunManyProjects<'_>,
    ) -> String {
        let concurrency = options.parallel.concurrency(DEFAULT_PARALLEL_WORKERS);
        let mut args = vec![format!("npx turbo run {}", options.task)];
        args.extend(
            selected_names(projects)
                .iter()
                .map(|name| format!("--filter={name}")),
        );
        args.push(format!("--concurrency={concurrency}"));
        args.push("--".to_string());
        args.join(" ")
    }
}
