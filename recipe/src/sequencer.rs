//! Step sequencing with guaranteed release of acquired resources.
//!
//! The sequencer walks a [`Plan`] one entry at a time. A failing step moves the
//! main sequence to `Failed` and no further main steps run. Release steps are
//! owed from the moment their acquire step is launched and are held by a
//! [`CleanupScope`], which runs them LIFO at the end of the sequence, or from
//! its `Drop` impl if the sequence unwinds.

use tracing::{error, info, instrument, warn};

use crate::core::plan::{Plan, PlanEntry, PlanError};
use crate::core::state::SequenceState;
use crate::core::types::{FailureCause, RunOutcome, Step, StepResult, StepRole};
use crate::error::{LaunchError, StepError, describe_exit};
use crate::io::executor::CommandExecutor;
use crate::retry::RetryPolicy;

/// Release obligations for launched acquire steps.
pub struct CleanupScope<'e, E: CommandExecutor + ?Sized> {
    executor: &'e E,
    pending: Vec<Step>,
}

/// Result of running one release step.
#[derive(Debug)]
pub struct Released {
    pub result: StepResult,
    pub error: Option<StepError>,
}

impl<'e, E: CommandExecutor + ?Sized> CleanupScope<'e, E> {
    pub fn new(executor: &'e E) -> Self {
        Self {
            executor,
            pending: Vec::new(),
        }
    }

    /// Owe `release` until the scope is drained.
    pub fn defer(&mut self, release: Step) {
        self.pending.push(release);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Run every owed release, most recent first. Each runs exactly once.
    pub fn release_all(&mut self) -> Vec<Released> {
        let mut released = Vec::with_capacity(self.pending.len());
        while let Some(step) = self.pending.pop() {
            released.push(self.release(&step));
        }
        released
    }

    fn release(&self, step: &Step) -> Released {
        info!(step = %step.name, "running release step");
        match self.executor.execute(step) {
            Ok(result) => {
                let result = result.with_role(StepRole::Release);
                let error = (!result.succeeded).then(|| StepError::Cleanup {
                    step: step.name.clone(),
                    detail: describe_exit(&result.exit_code),
                });
                Released { result, error }
            }
            Err(err) => Released {
                result: StepResult::not_launched(step.name.clone()).with_role(StepRole::Release),
                error: Some(StepError::Cleanup {
                    step: step.name.clone(),
                    detail: format!("{err}"),
                }),
            },
        }
    }
}

impl<E: CommandExecutor + ?Sized> Drop for CleanupScope<'_, E> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(
            pending = self.pending.len(),
            "sequence interrupted, running release steps"
        );
        for released in self.release_all() {
            if let Some(err) = released.error {
                error!(err = %err, "release step failed during unwind");
            }
        }
    }
}

/// Executes plans against a [`CommandExecutor`].
pub struct StepSequencer<'e, E: CommandExecutor + ?Sized> {
    executor: &'e E,
}

/// Accumulates results and the first failure in execution order.
#[derive(Default)]
struct Ledger {
    results: Vec<StepResult>,
    failure: Option<FailureCause>,
}

impl Ledger {
    fn record(&mut self, result: StepResult, error: Option<StepError>) -> bool {
        let succeeded = result.succeeded;
        self.results.push(result);
        if let Some(err) = error {
            warn!(err = %err, "step failed");
            if self.failure.is_none() {
                self.failure = Some(err.to_cause());
            }
        }
        succeeded
    }
}

/// How one main-sequence step ended.
enum Attempt {
    Finished(StepResult),
    NotLaunched(LaunchError),
}

impl<'e, E: CommandExecutor + ?Sized> StepSequencer<'e, E> {
    pub fn new(executor: &'e E) -> Self {
        Self { executor }
    }

    /// Run `plan` to a terminal outcome.
    ///
    /// Returns `Err` only for an invalid plan, before anything executes. Step
    /// failures, launch errors, and cleanup failures are all recorded on the
    /// returned [`RunOutcome`].
    #[instrument(skip_all, fields(entries = plan.len()))]
    pub fn run(&self, plan: &Plan) -> Result<RunOutcome, PlanError> {
        plan.validate()?;

        let mut ledger = Ledger::default();
        let mut cleanup = CleanupScope::new(self.executor);
        let total = plan.len();
        let mut state = SequenceState::Pending.start(total);

        while let SequenceState::Running(index) = state {
            let succeeded = match &plan.entries()[index] {
                PlanEntry::Run(planned) => {
                    let attempt = self.attempt(&planned.step, planned.retry.as_ref());
                    self.settle(&mut ledger, attempt, StepRole::Main, planned.retry.as_ref())
                }
                PlanEntry::Scoped { acquire, release } => {
                    let attempt = self.attempt(acquire, None);
                    if matches!(attempt, Attempt::Finished(_)) {
                        cleanup.defer(release.clone());
                    }
                    self.settle(&mut ledger, attempt, StepRole::Acquire, None)
                }
            };
            state = state.step_finished(succeeded, total);
        }

        let mut cleanup_failures = Vec::new();
        for released in cleanup.release_all() {
            if let Some(err) = released.error {
                warn!(err = %err, "cleanup failed");
                cleanup_failures.push(err.to_cause());
            }
            ledger.results.push(released.result);
        }

        let status = state.finalize(!cleanup_failures.is_empty());
        info!(status = status.as_str(), steps = ledger.results.len(), "sequence finished");
        Ok(RunOutcome {
            status,
            results: ledger.results,
            failure: ledger.failure,
            cleanup_failures,
        })
    }

    fn attempt(&self, step: &Step, retry: Option<&RetryPolicy>) -> Attempt {
        let executed = match retry {
            Some(policy) => policy.run_with_retry(self.executor, step),
            None => self.executor.execute(step),
        };
        match executed {
            Ok(result) => Attempt::Finished(result),
            Err(err) => {
                error!(err = %err, attempt = err.attempt, "step could not be launched");
                Attempt::NotLaunched(err)
            }
        }
    }

    fn settle(
        &self,
        ledger: &mut Ledger,
        attempt: Attempt,
        role: StepRole,
        retry: Option<&RetryPolicy>,
    ) -> bool {
        match attempt {
            Attempt::Finished(result) => {
                let result = result.with_role(role);
                let error = if result.succeeded {
                    None
                } else if retry.is_some_and(|policy| policy.max_attempts() > 1) {
                    Some(StepError::RetryExhausted {
                        step: result.step_name.clone(),
                        attempts: result.attempts,
                        exit_code: result.exit_code,
                    })
                } else {
                    Some(StepError::Failure {
                        step: result.step_name.clone(),
                        exit_code: result.exit_code,
                    })
                };
                ledger.record(result, error)
            }
            Attempt::NotLaunched(err) => {
                let result = StepResult {
                    attempts: err.attempt,
                    ..StepResult::not_launched(err.step.as_str())
                }
                .with_role(role);
                ledger.record(result, Some(err.into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::core::types::{FailureKind, RunStatus};
    use crate::test_support::{Scripted, ScriptedExecutor, step};

    fn plan_with_scope() -> Plan {
        let mut plan = Plan::new();
        plan.push(step("checkout"))
            .push_scoped(step("start emulators"), step("stop emulators"))
            .push_retryable(step("fetch"), RetryPolicy::new(3).expect("policy"))
            .push(step("test"))
            .push(step("post check"));
        plan
    }

    #[test]
    fn all_success_runs_in_declaration_order() {
        let executor = ScriptedExecutor::new();
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(
            outcome.step_names(),
            vec![
                "checkout",
                "start emulators",
                "fetch",
                "test",
                "post check",
                "stop emulators"
            ]
        );
        assert_eq!(outcome.failure, None);
        assert_eq!(
            outcome.result("stop emulators").map(|r| r.role),
            Some(StepRole::Release)
        );
    }

    #[test]
    fn first_failure_halts_main_steps_but_cleanup_runs_once() {
        let executor = ScriptedExecutor::new().fail("fetch", 1);
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(executor.count("fetch"), 3);
        assert!(!outcome.ran("test"));
        assert!(!outcome.ran("post check"));
        assert_eq!(executor.count("stop emulators"), 1);

        let failure = outcome.failure.clone().expect("failure");
        assert_eq!(failure.step_name, "fetch");
        assert_eq!(failure.kind, FailureKind::RetryExhausted);
        assert_eq!(outcome.result("fetch").map(|r| r.attempts), Some(3));
    }

    #[test]
    fn non_retryable_failure_is_a_step_failure() {
        let executor = ScriptedExecutor::new().fail("test", 2);
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Failed);
        let failure = outcome.failure.clone().expect("failure");
        assert_eq!(failure.kind, FailureKind::StepFailure);
        assert_eq!(executor.count("test"), 1);
        assert_eq!(executor.count("stop emulators"), 1);
    }

    #[test]
    fn cleanup_failure_after_success_is_cleanup_failed() {
        let executor = ScriptedExecutor::new().fail("stop emulators", 1);
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::CleanupFailed);
        assert_eq!(outcome.failure, None);
        assert_eq!(outcome.cleanup_failures.len(), 1);
        assert_eq!(outcome.cleanup_failures[0].kind, FailureKind::Cleanup);
    }

    #[test]
    fn cleanup_failure_never_masks_primary_failure() {
        let executor = ScriptedExecutor::new()
            .fail("test", 1)
            .fail("stop emulators", 1);
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.failure.map(|f| f.step_name), Some("test".to_string()));
        assert_eq!(outcome.cleanup_failures[0].step_name, "stop emulators");
    }

    #[test]
    fn launch_error_aborts_but_still_releases() {
        let executor = ScriptedExecutor::new().script("fetch", vec![Scripted::Launch]);
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(executor.count("fetch"), 1);
        assert!(!outcome.ran("test"));
        assert_eq!(executor.count("stop emulators"), 1);
        let failure = outcome.failure.clone().expect("failure");
        assert_eq!(failure.kind, FailureKind::Launch);
        assert_eq!(outcome.result("fetch").map(|r| r.exit_code), Some(None));
    }

    #[test]
    fn launch_error_after_retries_reports_every_attempt() {
        let executor = ScriptedExecutor::new().script(
            "fetch",
            vec![Scripted::Exit(1), Scripted::Exit(1), Scripted::Launch],
        );
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(executor.count("fetch"), 3);
        let fetch = outcome.result("fetch").expect("fetch result");
        assert_eq!(fetch.attempts, 3);
        assert_eq!(fetch.exit_code, None);
        assert_eq!(
            outcome.failure.map(|f| f.kind),
            Some(FailureKind::Launch)
        );
        assert_eq!(executor.count("stop emulators"), 1);
    }

    #[test]
    fn failed_acquire_still_owes_release() {
        let executor = ScriptedExecutor::new().fail("start emulators", 1);
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Failed);
        assert!(!outcome.ran("fetch"));
        assert_eq!(executor.count("stop emulators"), 1);
    }

    #[test]
    fn unlaunched_acquire_owes_nothing() {
        let executor = ScriptedExecutor::new().script("start emulators", vec![Scripted::Launch]);
        let outcome = StepSequencer::new(&executor)
            .run(&plan_with_scope())
            .expect("run");
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(executor.count("stop emulators"), 0);
    }

    #[test]
    fn releases_run_lifo() {
        let executor = ScriptedExecutor::new();
        let mut plan = Plan::new();
        plan.push_scoped(step("start a"), step("stop a"))
            .push_scoped(step("start b"), step("stop b"));
        let outcome = StepSequencer::new(&executor).run(&plan).expect("run");
        assert_eq!(
            outcome.step_names(),
            vec!["start a", "start b", "stop b", "stop a"]
        );
    }

    #[test]
    fn panic_mid_sequence_still_releases_once() {
        let executor = ScriptedExecutor::new().script("test", vec![Scripted::Panic]);
        let plan = plan_with_scope();
        let result = catch_unwind(AssertUnwindSafe(|| StepSequencer::new(&executor).run(&plan)));
        assert!(result.is_err());
        assert_eq!(executor.count("stop emulators"), 1);
    }

    #[test]
    fn invalid_plan_executes_nothing() {
        let executor = ScriptedExecutor::new();
        let mut plan = Plan::new();
        plan.push(step("same")).push(step("same"));
        let err = StepSequencer::new(&executor).run(&plan).unwrap_err();
        assert_eq!(err, PlanError::DuplicateStep("same".to_string()));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn empty_plan_succeeds() {
        let executor = ScriptedExecutor::new();
        let outcome = StepSequencer::new(&executor).run(&Plan::new()).expect("run");
        assert_eq!(outcome.status, RunStatus::Success);
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn scope_drains_on_release_all() {
        let executor = ScriptedExecutor::new();
        let mut scope = CleanupScope::new(&executor);
        scope.defer(step("stop"));
        assert_eq!(scope.pending(), 1);
        let released = scope.release_all();
        assert_eq!(released.len(), 1);
        assert!(released[0].error.is_none());
        assert_eq!(scope.pending(), 0);
        drop(scope);
        assert_eq!(executor.count("stop"), 1);
    }
}
