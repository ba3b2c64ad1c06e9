//! Command executor abstraction.
//!
//! The [`CommandExecutor`] trait decouples sequencing from process spawning.
//! [`ProcessExecutor`] runs real commands; tests use scripted executors that
//! return predetermined results without spawning processes.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{Step, StepResult};
use crate::error::LaunchError;
use crate::io::process::{CommandOutput, run_captured};

/// Runs a single step exactly once.
pub trait CommandExecutor {
    /// Run `step` and wait for it. A non-zero exit is an `Ok` result with
    /// `succeeded = false`; `Err` means the program could not be started.
    fn execute(&self, step: &Step) -> Result<StepResult, LaunchError>;
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for &E {
    fn execute(&self, step: &Step) -> Result<StepResult, LaunchError> {
        (**self).execute(step)
    }
}

/// Settings for [`ProcessExecutor`].
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Kill a step that runs longer than this. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Keep at most this many bytes of stdout and of stderr per step.
    pub output_limit_bytes: usize,
    /// Write one `<NN>-<step>.log` file per executed attempt when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            output_limit_bytes: 1_000_000,
            log_dir: None,
        }
    }
}

/// Executor that spawns the step's command as a child process.
///
/// The child sees only the step's environment (`env_clear` first), so
/// recipes must pass a fully resolved environment.
#[derive(Debug, Default)]
pub struct ProcessExecutor {
    options: ExecOptions,
    executed: Cell<u32>,
}

impl ProcessExecutor {
    pub fn new(options: ExecOptions) -> Self {
        Self {
            options,
            executed: Cell::new(0),
        }
    }
}

impl CommandExecutor for ProcessExecutor {
    #[instrument(skip_all, fields(step = %step.name))]
    fn execute(&self, step: &Step) -> Result<StepResult, LaunchError> {
        let (program, args) = step
            .command
            .split_first()
            .ok_or_else(|| LaunchError::new(step, anyhow!("empty command")))?;
        info!(
            command = %step.display_command(),
            cwd = %step.working_dir.display(),
            "running step"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&step.working_dir)
            .env_clear()
            .envs(&step.environment);

        let started = Instant::now();
        let output = run_captured(cmd, self.options.timeout, self.options.output_limit_bytes)
            .map_err(|err| LaunchError::new(step, err))?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let seq = self.executed.get() + 1;
        self.executed.set(seq);
        if let Some(dir) = &self.options.log_dir {
            let path = dir.join(log_file_name(seq, &step.name));
            if let Err(err) = write_step_log(&path, step, &output, self.options.output_limit_bytes)
            {
                warn!(err = %format!("{err:#}"), path = %path.display(), "failed to write step log");
            }
        }

        let succeeded = output.status.success() && !output.timed_out;
        if succeeded {
            debug!(duration_ms, "step succeeded");
        } else {
            warn!(
                exit_code = ?output.status.code(),
                timed_out = output.timed_out,
                "step failed"
            );
        }

        Ok(StepResult {
            succeeded,
            timed_out: output.timed_out,
            duration_ms,
            stdout: lossy_with_notice(&output.stdout, &output.stdout_truncated_notice(&step.name)),
            stderr: lossy_with_notice(&output.stderr, &output.stderr_truncated_notice(&step.name)),
            ..StepResult::from_exit(step.name.clone(), output.status.code())
        })
    }
}

fn lossy_with_notice(bytes: &[u8], notice: &str) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    text.push_str(notice);
    text
}

/// `03-go-mod-download.log` style names: sequence number plus a filesystem-safe slug.
fn log_file_name(seq: u32, step_name: &str) -> String {
    let mut slug = String::with_capacity(step_name.len());
    for ch in step_name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    format!("{seq:02}-{}.log", slug.trim_matches('-'))
}

fn write_step_log(
    path: &Path,
    step: &Step,
    output: &CommandOutput,
    output_limit: usize,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create step log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str(&format!("$ {}\n", step.display_command()));
    buf.push_str(&format!("cwd: {}\n", step.working_dir.display()));
    buf.push_str(&format!("exit: {:?}\n", output.status.code()));
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str(&output.stdout_truncated_notice("step"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.stderr_truncated_notice("step"));
    if output.timed_out {
        buf.push_str("\n[step timed out]\n");
    }
    if output.output_detached {
        buf.push_str("\n[output pipes held open after exit; capture stopped]\n");
    }

    // Both streams are already bounded; this caps the combined file.
    let limit = output_limit.saturating_mul(2);
    if buf.len() > limit {
        let mut cut = limit;
        while !buf.is_char_boundary(cut) {
            cut -= 1;
        }
        let truncated = format!("{}\n[truncated {} bytes]\n", &buf[..cut], buf.len() - cut);
        return fs::write(path, truncated)
            .with_context(|| format!("write step log {}", path.display()));
    }

    fs::write(path, buf).with_context(|| format!("write step log {}", path.display()))
}
