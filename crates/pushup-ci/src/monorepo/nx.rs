use async_trait::async_trait;
use tracing::debug;

use super::packages::file_exists;
use super::{
    selected_names, MonorepoHandler, MonorepoHandlerOptions, MonorepoTool, RunManyProjects,
    DEFAULT_PARALLEL_WORKERS,
};
use crate::domain::error::{CiError, Result};
use crate::domain::project::ProjectConfig;
use crate::process::{execute_process, ProcessConfig};

/// Nx workspaces (`nx.json`). Projects come from the Nx project graph and run
/// from the workspace root.
#[derive(Debug, Clone, Copy, Default)]
pub struct NxHandler;

/// Parse `nx show projects --json` output into sorted project names.
pub fn parse_projects(stdout: &str) -> Result<Vec<String>> {
    let trimmed = stdout.trim();
    let body = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            return Err(CiError::Monorepo(format!(
                "invalid output from nx show projects: {trimmed}"
            )))
        }
    };
    let mut names: Vec<String> = serde_json::from_str(body)
        .map_err(|e| CiError::Monorepo(format!("invalid output from nx show projects: {e}")))?;
    names.sort();
    names.dedup();
    Ok(names)
}

#[async_trait]
impl MonorepoHandler for NxHandler {
    fn tool(&self) -> MonorepoTool {
        MonorepoTool::Nx
    }

    async fn is_configured(&self, options: &MonorepoHandlerOptions) -> Result<bool> {
        Ok(file_exists(&options.cwd.join("nx.json")).await
            && file_exists(&options.cwd.join("package.json")).await)
    }

    async fn list_projects(
        &self,
        options: &MonorepoHandlerOptions,
    ) -> Result<Vec<ProjectConfig>> {
        let config = ProcessConfig::new("npx", &options.cwd)
            .args(["nx", "show", "projects"])
            .args(options.nx_projects_filter.iter().cloned())
            .arg("--json")
            .timeout(options.timeout_secs);
        let output = execute_process(&config).await?;
        let names = parse_projects(&output.stdout)?;
        debug!(count = names.len(), "nx projects with target");

        Ok(names
            .into_iter()
            .map(|name| {
                let bin = format!("npx nx run {name}:{} --", options.task);
                ProjectConfig::new(name, bin)
            })
            .collect())
    }

    fn create_run_many_command(
        &self,
        options: &MonorepoHandlerOptions,
        projects: RunManyProjects<'_>,
    ) -> String {
        let concurrency = options.parallel.concurrency(DEFAULT_PARALLEL_WORKERS);
        let names = selected_names(projects);
        let mut args = vec![
            "npx nx run-many".to_string(),
            format!("--targets={}", options.task),
            format!("--parallel={concurrency}"),
        ];
        if !names.is_empty() {
            args.push(format!("--projects={}", names.join(",")));
        }
        args.push("--".to_string());
        args.join(" ")
    }
}
