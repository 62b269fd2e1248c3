//! Top-level orchestration of a CI run.
//!
//! [`run_in_ci`] verifies the checkout, then runs either the whole
//! repository as one project or every monorepo member, compares against the
//! base when one is given, and posts the diff as a pull-request comment.

mod monorepo;
mod pool;

use std::time::Instant;

use tracing::{info, Instrument};

use crate::base_report::collect_previous_report;
use crate::comparator::{compare_reports, CompareArgs};
use crate::domain::error::{CiError, Result};
use crate::domain::project::{project_to_name, ProjectConfig};
use crate::domain::result::{ProjectRunResult, RunResult};
use crate::engine::{CommandContext, PersistConfig};
use crate::env::RunEnv;
use crate::git::capture_head_sha;
use crate::obs;
use crate::output_files::{OutputKind, ReportData};
use crate::provider::comment_on_pr;

/// Run the CI flow described by `env`.
pub async fn run_in_ci(env: &RunEnv) -> Result<RunResult> {
    let started = Instant::now();
    obs::emit_run_started(&env.refs, env.settings.monorepo.is_enabled());

    verify_head(env).await?;

    let result = if env.settings.monorepo.is_enabled() {
        monorepo::run_monorepo(env).await?
    } else {
        run_standalone(env).await?
    };

    let (projects, failures) = match &result {
        RunResult::Standalone { .. } => (1, 0),
        RunResult::Monorepo {
            projects, failures, ..
        } => (projects.len(), failures.len()),
    };
    obs::emit_run_finished(started.elapsed().as_millis() as u64, projects, failures);
    Ok(result)
}

/// HEAD must be the commit the run was requested for.
async fn verify_head(env: &RunEnv) -> Result<()> {
    let actual = capture_head_sha(env.git.as_ref()).await?;
    let expected = &env.refs.head.sha;
    if actual != *expected && !(expected.len() >= 7 && actual.starts_with(expected.as_str())) {
        return Err(CiError::HeadMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(())
}

async fn run_standalone(env: &RunEnv) -> Result<RunResult> {
    let result = run_on_project(env, None).await?;

    let diff_md = result.files.diff.as_ref().and_then(|d| d.md.as_ref());
    let comment_id = match diff_md {
        Some(md) if !env.settings.skip_comment => Some(comment_on_pr(md, env.api.as_ref()).await?),
        Some(_) => {
            info!("skipping pull-request comment");
            None
        }
        None => None,
    };

    Ok(RunResult::Standalone {
        files: result.files,
        new_issues: result.new_issues,
        comment_id,
    })
}

/// Collect one project at head and compare it against the base when the
/// run has one. `None` is the whole repository.
pub async fn run_on_project(
    env: &RunEnv,
    project: Option<&ProjectConfig>,
) -> Result<ProjectRunResult> {
    let name = project_to_name(project);
    async {
        obs::emit_project_started(&name);
        let ctx = CommandContext::new(&env.settings, project);

        let persist = env.engine.print_config(&ctx).await?;
        env.engine.collect(&ctx).await?;
        let curr = env
            .output_files()
            .save_report(
                project.map(|p| p.name.as_str()),
                OutputKind::Current,
                &persist.report_files(&ctx.directory),
            )
            .await?;

        let result = compare_with_base(env, project, &ctx, &persist, curr).await?;
        obs::emit_project_finished(
            &name,
            result.has_diff(),
            result.new_issues.as_ref().map(Vec::len),
        );
        Ok(result)
    }
    .instrument(obs::project_span(&name))
    .await
}

async fn compare_with_base(
    env: &RunEnv,
    project: Option<&ProjectConfig>,
    ctx: &CommandContext,
    persist: &PersistConfig,
    curr: ReportData,
) -> Result<ProjectRunResult> {
    let name = project_to_name(project);
    let Some(base) = &env.refs.base else {
        return Ok(ProjectRunResult::report_only(name, curr.files));
    };
    info!(base_ref = %base.git_ref, head_ref = %env.refs.head.git_ref, "comparing against base");

    let Some(prev) = collect_previous_report(env, project, base, ctx).await? else {
        return Ok(ProjectRunResult::report_only(name, curr.files));
    };

    compare_reports(
        env,
        CompareArgs {
            project,
            ctx,
            persist,
            base,
            curr: &curr,
            prev: &prev,
        },
    )
    .await
}
