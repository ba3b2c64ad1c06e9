//! Shared deterministic types for recipe execution.
//!
//! These types define stable contracts between the sequencer, the executors,
//! and the run report. They hold no process or file handles and serialize
//! deterministically (environments are ordered maps).

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fully resolved process environment.
pub type Environment = BTreeMap<String, String>;

/// One named unit of work executed as an external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within a plan.
    pub name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    /// Complete environment for the child; nothing is inherited.
    pub environment: Environment,
}

impl Step {
    pub fn new<I, S>(
        name: impl Into<String>,
        command: I,
        working_dir: impl Into<PathBuf>,
        environment: &Environment,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
            environment: environment.clone(),
        }
    }

    /// Program name, or an empty string for an (invalid) empty command.
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}

/// Where a step sits relative to the cleanup scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRole {
    /// Ordinary main-sequence step.
    Main,
    /// Main-sequence step that starts a resource needing release.
    Acquire,
    /// Release obligation run during cleanup.
    Release,
}

/// Result of executing one step (after any retries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub role: StepRole,
    /// `None` when the process was killed by a signal, timed out, or never launched.
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    /// Always >= 1.
    pub attempts: u32,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl StepResult {
    /// Single-attempt main-sequence result with no captured output.
    pub fn from_exit(step_name: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            step_name: step_name.into(),
            role: StepRole::Main,
            exit_code,
            succeeded: exit_code == Some(0),
            attempts: 1,
            timed_out: false,
            duration_ms: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Result recorded for a step whose program never started.
    pub fn not_launched(step_name: impl Into<String>) -> Self {
        Self::from_exit(step_name, None)
    }

    pub fn with_role(mut self, role: StepRole) -> Self {
        self.role = role;
        self
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    CleanupFailed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::CleanupFailed => "cleanup_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Launch,
    StepFailure,
    RetryExhausted,
    Cleanup,
}

/// Serializable description of one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub step_name: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregate of every step result in execution order plus the terminal status.
///
/// `failure` is the first main-sequence failure and is never replaced by a
/// cleanup failure; those accumulate in `cleanup_failures`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub results: Vec<StepResult>,
    pub failure: Option<FailureCause>,
    pub cleanup_failures: Vec<FailureCause>,
}

impl RunOutcome {
    pub fn result(&self, step_name: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_name == step_name)
    }

    pub fn ran(&self, step_name: &str) -> bool {
        self.result(step_name).is_some()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.step_name.as_str()).collect()
    }
}
