//! Monorepo mode: members one by one, or in bulk through the tool's
//! run-many command.

use std::collections::HashMap;
use std::path::PathBuf;

use futures::{stream, StreamExt};
use tracing::{info, warn, Instrument};

use super::pool::map_bounded;
use super::{run_on_project, verify_head};
use crate::base_report::{check_print_config, load_cached_base_report, run_in_base_branch};
use crate::comparator::{compare_reports, CompareArgs};
use crate::domain::error::{CiError, Result};
use crate::domain::project::ProjectConfig;
use crate::domain::refs::GitBranch;
use crate::domain::result::{ProjectFailure, ProjectRunResult, RunResult};
use crate::engine::{CommandContext, PersistConfig};
use crate::env::RunEnv;
use crate::monorepo::{list_monorepo_projects, MonorepoProjects, RunManyCommand};
use crate::obs::{self, BaseSource};
use crate::output_files::{OutputKind, ReportData};
use crate::provider::comment_on_pr;

/// Successful and failed members, in member order.
#[derive(Debug, Default)]
struct ProjectOutcomes {
    results: Vec<ProjectRunResult>,
    failures: Vec<ProjectFailure>,
}

impl ProjectOutcomes {
    fn record(&mut self, name: &str, result: Result<ProjectRunResult>) {
        match result {
            Ok(result) => self.results.push(result),
            Err(e) => self.fail(name, &e),
        }
    }

    fn fail(&mut self, name: &str, error: &CiError) {
        if error.is_fatal() {
            warn!(project = %name, error = %error, "checkout invariant violated");
        }
        obs::emit_project_failed(name, error);
        self.failures.push(ProjectFailure {
            name: name.to_string(),
            error: error.to_string(),
        });
    }
}

pub(super) async fn run_monorepo(env: &RunEnv) -> Result<RunResult> {
    let MonorepoProjects {
        tool,
        projects,
        run_many,
    } = list_monorepo_projects(&env.settings).await?;
    info!(tool = %tool, projects = projects.len(), bulk = run_many.is_some(), "running monorepo projects");

    let outcomes = match &run_many {
        Some(run_many) => run_projects_in_bulk(env, &projects, run_many).await?,
        None => run_projects_individually(env, &projects).await?,
    };

    let diff_path = merge_diffs(env, &projects, &outcomes.results).await?;
    let comment_id = match &diff_path {
        Some(path) if !env.settings.skip_comment => {
            Some(comment_on_pr(path, env.api.as_ref()).await?)
        }
        _ => None,
    };

    Ok(RunResult::Monorepo {
        projects: outcomes.results,
        failures: outcomes.failures,
        diff_path,
        comment_id,
    })
}

async fn run_projects_individually(
    env: &RunEnv,
    projects: &[ProjectConfig],
) -> Result<ProjectOutcomes> {
    let mut outcomes = ProjectOutcomes::default();
    for project in projects {
        // An earlier member may have moved HEAD.
        let result = match verify_head(env).await {
            Ok(()) => run_on_project(env, Some(project)).await,
            Err(e) => Err(e),
        };
        outcomes.record(&project.name, result);
    }
    Ok(outcomes)
}

/// Merge every member diff into one markdown document at its fixed location.
async fn merge_diffs(
    env: &RunEnv,
    projects: &[ProjectConfig],
    results: &[ProjectRunResult],
) -> Result<Option<PathBuf>> {
    let diffs: Vec<PathBuf> = results
        .iter()
        .filter_map(|r| r.files.diff.as_ref().map(|d| d.json.clone()))
        .collect();
    if diffs.is_empty() {
        return Ok(None);
    }

    let outputs = env.output_files();
    let ctx = CommandContext::new(&env.settings, projects.first());
    let merged = env
        .engine
        .merge_diffs(&ctx, &diffs, &outputs.ci_dir())
        .await?;
    let path = outputs.save_merged_diff(&merged).await?;
    info!(path = %path.display(), diffs = diffs.len(), "merged project diffs");
    Ok(Some(path))
}

// ---------------------------------------------------------------------------
// Bulk mode
// ---------------------------------------------------------------------------

/// A member's head-side report.
#[derive(Debug, Clone)]
struct CurrentReport {
    project: ProjectConfig,
    ctx: CommandContext,
    persist: PersistConfig,
    report: ReportData,
}

async fn save_current(env: &RunEnv, project: ProjectConfig) -> Result<CurrentReport> {
    obs::emit_project_started(&project.name);
    let ctx = CommandContext::new(&env.settings, Some(&project));
    let persist = env.engine.print_config(&ctx).await?;
    let report = env
        .output_files()
        .save_report(
            Some(&project.name),
            OutputKind::Current,
            &persist.report_files(&ctx.directory),
        )
        .await?;
    Ok(CurrentReport {
        project,
        ctx,
        persist,
        report,
    })
}

async fn run_projects_in_bulk(
    env: &RunEnv,
    projects: &[ProjectConfig],
    run_many: &RunManyCommand,
) -> Result<ProjectOutcomes> {
    let concurrency = run_many.concurrency();
    let mut outcomes = ProjectOutcomes::default();

    let root_ctx = CommandContext::at_root(&env.settings, run_many.command(None));
    info!(tool = %run_many.tool(), concurrency, "collecting all projects with one command");
    env.engine.collect(&root_ctx).await?;

    let saved = {
        let env = env.clone();
        map_bounded(projects.to_vec(), concurrency, move |project| {
            let env = env.clone();
            async move {
                let name = project.name.clone();
                (name, save_current(&env, project).await)
            }
        })
        .await?
    };
    let mut currents = Vec::new();
    for (name, result) in saved {
        match result {
            Ok(current) => currents.push(current),
            Err(e) => outcomes.fail(&name, &e),
        }
    }

    let Some(base) = env.refs.base.clone() else {
        for current in currents {
            let name = current.project.name.clone();
            finish(&mut outcomes, &name, Ok(report_only(current)));
        }
        return Ok(outcomes);
    };

    let mut previous = {
        let env = env.clone();
        let cached_projects = currents.iter().map(|c| c.project.clone()).collect();
        map_bounded(cached_projects, concurrency, move |project: ProjectConfig| {
            let env = env.clone();
            async move { load_cached_base_report(&env, Some(&project)).await }
        })
        .await?
    };
    for (current, prev) in currents.iter().zip(&previous) {
        if prev.is_some() {
            obs::emit_base_resolved(&current.project.name, BaseSource::Cache);
        }
    }

    let uncached: Vec<usize> = (0..currents.len())
        .filter(|&idx| previous[idx].is_none())
        .collect();
    let mut excluded = Vec::new();
    if !uncached.is_empty() {
        let targets: Vec<ProjectConfig> = uncached
            .iter()
            .map(|&idx| currents[idx].project.clone())
            .collect();
        match collect_previous_in_bulk(env, &base, run_many, &targets, concurrency).await {
            Ok(mut reports) => {
                for &idx in &uncached {
                    let name = &currents[idx].project.name;
                    previous[idx] = reports.remove(name);
                    let source = if previous[idx].is_some() {
                        BaseSource::Collected
                    } else {
                        BaseSource::Absent
                    };
                    obs::emit_base_resolved(name, source);
                }
            }
            Err(e) => {
                warn!(error = %e, "collecting base reports failed");
                for &idx in &uncached {
                    outcomes.fail(&currents[idx].project.name, &e);
                }
                excluded = uncached;
            }
        }
    }

    if let Err(e) = verify_head(env).await {
        for (idx, current) in currents.iter().enumerate() {
            if !excluded.contains(&idx) {
                outcomes.fail(&current.project.name, &e);
            }
        }
        return Ok(outcomes);
    }

    let jobs: Vec<(usize, CurrentReport, ReportData)> = currents
        .iter()
        .zip(&previous)
        .enumerate()
        .filter(|(idx, _)| !excluded.contains(idx))
        .filter_map(|(idx, (current, prev))| {
            prev.as_ref().map(|prev| (idx, current.clone(), prev.clone()))
        })
        .collect();
    let compared = {
        let env = env.clone();
        let base = base.clone();
        map_bounded(jobs, concurrency, move |(idx, current, prev)| {
            let env = env.clone();
            let base = base.clone();
            async move {
                let span = obs::project_span(&current.project.name);
                let result = compare_current(&env, &base, &current, &prev)
                    .instrument(span)
                    .await;
                (idx, result)
            }
        })
        .await?
    };
    let mut compared: HashMap<usize, Result<ProjectRunResult>> = compared.into_iter().collect();

    for (idx, current) in currents.into_iter().enumerate() {
        if excluded.contains(&idx) {
            continue;
        }
        let name = current.project.name.clone();
        let result = match compared.remove(&idx) {
            Some(result) => result,
            None => Ok(report_only(current)),
        };
        finish(&mut outcomes, &name, result);
    }
    Ok(outcomes)
}

fn report_only(current: CurrentReport) -> ProjectRunResult {
    ProjectRunResult::report_only(current.project.name, current.report.files)
}

fn finish(outcomes: &mut ProjectOutcomes, name: &str, result: Result<ProjectRunResult>) {
    if let Ok(result) = &result {
        obs::emit_project_finished(
            name,
            result.has_diff(),
            result.new_issues.as_ref().map(Vec::len),
        );
    }
    outcomes.record(name, result)
}

async fn compare_current(
    env: &RunEnv,
    base: &GitBranch,
    current: &CurrentReport,
    prev: &ReportData,
) -> Result<ProjectRunResult> {
    compare_reports(
        env,
        CompareArgs {
            project: Some(&current.project),
            ctx: &current.ctx,
            persist: &current.persist,
            base,
            curr: &current.report,
            prev,
        },
    )
    .await
}

async fn probe_project(
    env: &RunEnv,
    project: &ProjectConfig,
) -> (ProjectConfig, CommandContext, Option<PersistConfig>) {
    let ctx = CommandContext::new(&env.settings, Some(project));
    let persist = check_print_config(env, &ctx).await;
    (project.clone(), ctx, persist)
}

/// One base-branch checkout for all `projects`: probe each member, collect
/// the usable ones with a single run-many command and archive their reports.
async fn collect_previous_in_bulk(
    env: &RunEnv,
    base: &GitBranch,
    run_many: &RunManyCommand,
    projects: &[ProjectConfig],
    concurrency: usize,
) -> Result<HashMap<String, ReportData>> {
    run_in_base_branch(env, base, || async {
        let probes: Vec<_> = projects
            .iter()
            .map(|project| probe_project(env, project))
            .collect();
        let probed: Vec<_> = stream::iter(probes)
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let configured: Vec<_> = probed
            .into_iter()
            .filter_map(|(project, ctx, persist)| match persist {
                Some(persist) => Some((project, ctx, persist)),
                None => {
                    info!(project = %project.name, base_ref = %base.git_ref, "tool not configured in base branch, skipping comparison");
                    None
                }
            })
            .collect();
        if configured.is_empty() {
            return Ok(HashMap::new());
        }

        let only: Vec<String> = configured.iter().map(|(p, _, _)| p.name.clone()).collect();
        let ctx = CommandContext::at_root(&env.settings, run_many.command(Some(&only)));
        env.engine.collect(&ctx).await?;

        let outputs = env.output_files();
        let mut reports = HashMap::new();
        for (project, ctx, persist) in configured {
            let report = outputs
                .save_report(
                    Some(&project.name),
                    OutputKind::Previous,
                    &persist.report_files(&ctx.directory),
                )
                .await?;
            reports.insert(project.name, report);
        }
        Ok(reports)
    })
    .await
}
