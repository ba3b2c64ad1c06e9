//! Top-level orchestration for one recipe run.

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::core::plan::Plan;
use crate::core::types::{RunOutcome, RunStatus};
use crate::exit_codes;
use crate::io::config::RecipeConfig;
use crate::io::executor::CommandExecutor;
use crate::recipes::{RecipeKind, RunContext, build_plan};
use crate::sequencer::StepSequencer;

/// Drives one recipe against an executor.
pub struct RecipeDriver<'a, E: CommandExecutor + ?Sized> {
    kind: RecipeKind,
    executor: &'a E,
    config: &'a RecipeConfig,
}

impl<'a, E: CommandExecutor + ?Sized> RecipeDriver<'a, E> {
    pub fn new(kind: RecipeKind, executor: &'a E, config: &'a RecipeConfig) -> Self {
        Self {
            kind,
            executor,
            config,
        }
    }

    /// Resolve the plan for `ctx` without executing anything.
    pub fn plan(&self, ctx: &RunContext) -> Result<Plan> {
        let plan = build_plan(self.kind, ctx, self.config)
            .with_context(|| format!("build {:?} plan", self.kind))?;
        plan.validate().context("validate plan")?;
        Ok(plan)
    }

    /// Run the recipe to a terminal outcome.
    ///
    /// `Err` means nothing was executed (bad properties or an invalid plan).
    #[instrument(skip_all, fields(builder = ctx.builder_name(), branch = %ctx.branch()))]
    pub fn run(&self, ctx: &RunContext) -> Result<RunOutcome> {
        let plan = self.plan(ctx)?;
        info!(steps = plan.step_names().len(), "executing plan");
        let outcome = StepSequencer::new(self.executor)
            .run(&plan)
            .context("run plan")?;
        info!(status = outcome.status.as_str(), "recipe finished");
        Ok(outcome)
    }
}

/// Process exit code for a terminal status.
pub fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Success => exit_codes::OK,
        RunStatus::Failed => exit_codes::FAILED,
        RunStatus::CleanupFailed => exit_codes::CLEANUP_FAILED,
    }
}
