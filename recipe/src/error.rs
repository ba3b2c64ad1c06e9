//! Error taxonomy for step execution.
//!
//! Only [`LaunchError`] ever crosses the executor boundary as an `Err`. The
//! sequencer turns every other problem into a [`StepError`] that is recorded on
//! the run outcome instead of propagated, so a run always reaches a terminal
//! status.

use thiserror::Error;

use crate::core::types::{FailureCause, FailureKind, Step};

/// The executable for a step could not be started or supervised.
#[derive(Debug, Error)]
#[error("failed to launch `{program}` for step '{step}': {cause:#}")]
pub struct LaunchError {
    pub step: String,
    pub program: String,
    /// 1-based attempt that failed to launch; earlier attempts ran.
    pub attempt: u32,
    pub cause: anyhow::Error,
}

impl LaunchError {
    pub fn new(step: &Step, cause: anyhow::Error) -> Self {
        Self {
            step: step.name.clone(),
            program: step.program().to_string(),
            attempt: 1,
            cause,
        }
    }

    pub fn on_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

/// A recorded step-level failure.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("step '{step}' failed with {}", describe_exit(.exit_code))]
    Failure { step: String, exit_code: Option<i32> },

    #[error("step '{step}' failed after {attempts} attempts, last with {}", describe_exit(.exit_code))]
    RetryExhausted {
        step: String,
        attempts: u32,
        exit_code: Option<i32>,
    },

    #[error("cleanup step '{step}' failed: {detail}")]
    Cleanup { step: String, detail: String },
}

impl StepError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Launch(_) => FailureKind::Launch,
            StepError::Failure { .. } => FailureKind::StepFailure,
            StepError::RetryExhausted { .. } => FailureKind::RetryExhausted,
            StepError::Cleanup { .. } => FailureKind::Cleanup,
        }
    }

    pub fn step_name(&self) -> &str {
        match self {
            StepError::Launch(err) => &err.step,
            StepError::Failure { step, .. }
            | StepError::RetryExhausted { step, .. }
            | StepError::Cleanup { step, .. } => step,
        }
    }

    /// Flatten into the serializable record kept on a run outcome.
    pub fn to_cause(&self) -> FailureCause {
        FailureCause {
            step_name: self.step_name().to_string(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Invalid runner configuration, detected before anything executes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_attempts must be > 0 (got {0})")]
    ZeroAttempts(u32),
}

pub(crate) fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal or timeout)".to_string(),
    }
}
