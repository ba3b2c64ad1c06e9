//! Test-only helpers: a scripted executor and deterministic fixtures.
//!
//! [`ScriptedExecutor`] replays canned outcomes per step name and records the
//! order in which steps were executed, so branch and cleanup behavior can be
//! checked without spawning processes.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use anyhow::anyhow;

use crate::core::types::{Environment, Step, StepResult};
use crate::error::LaunchError;
use crate::io::executor::CommandExecutor;
use crate::recipes::{Properties, RunContext};

/// Start dir used by fixture contexts.
pub const START_DIR: &str = "/b/s/w/ir";

/// Canned outcome for one execution of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// The command ran and exited with this code.
    Exit(i32),
    /// The program could not be started.
    Launch,
    /// The executor panics mid-step.
    Panic,
}

/// Executor that replays scripted outcomes.
///
/// Each step name has a queue of outcomes; the last entry repeats once the
/// queue is drained. Unscripted steps exit 0.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: RefCell<HashMap<String, VecDeque<Scripted>>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for `step_name`.
    pub fn script(self, step_name: &str, outcomes: Vec<Scripted>) -> Self {
        self.scripts
            .borrow_mut()
            .insert(step_name.to_string(), outcomes.into());
        self
    }

    /// Make every execution of `step_name` exit with `code`.
    pub fn fail(self, step_name: &str, code: i32) -> Self {
        self.script(step_name, vec![Scripted::Exit(code)])
    }

    /// Step names in execution order, one entry per attempt.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, step_name: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|name| name.as_str() == step_name)
            .count()
    }

    fn next_outcome(&self, step_name: &str) -> Scripted {
        let mut scripts = self.scripts.borrow_mut();
        match scripts.get_mut(step_name) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Scripted::Exit(0)),
            Some(queue) => queue.front().copied().unwrap_or(Scripted::Exit(0)),
            None => Scripted::Exit(0),
        }
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, step: &Step) -> Result<StepResult, LaunchError> {
        self.calls.borrow_mut().push(step.name.clone());
        match self.next_outcome(&step.name) {
            Scripted::Exit(code) => Ok(StepResult::from_exit(step.name.clone(), Some(code))),
            Scripted::Launch => Err(LaunchError::new(
                step,
                anyhow!("No such file or directory (os error 2)"),
            )),
            Scripted::Panic => panic!("scripted panic in step '{}'", step.name),
        }
    }
}

/// A step running `true` in `/tmp` with an empty environment.
pub fn step(name: &str) -> Step {
    Step::new(name, ["true"], "/tmp", &Environment::new())
}

/// Deterministic base environment.
pub fn base_environment() -> Environment {
    Environment::from([
        ("HOME".to_string(), "/home/chrome-bot".to_string()),
        ("PATH".to_string(), "/usr/bin:/bin".to_string()),
    ])
}

/// Run context for `builder_name` rooted at [`START_DIR`] with no properties.
pub fn context(builder_name: &str) -> RunContext {
    context_with(builder_name, Properties::default())
}

pub fn context_with(builder_name: &str, properties: Properties) -> RunContext {
    RunContext::new(
        builder_name,
        PathBuf::from(START_DIR),
        base_environment(),
        properties,
    )
}
