//! Run report output: JSON result files and the human-readable summary.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{RunOutcome, StepResult, StepRole};
use crate::error::describe_exit;

/// Atomically write the outcome as pretty JSON (temp file + rename).
pub fn write_outcome(path: &Path, outcome: &RunOutcome) -> Result<()> {
    debug!(path = %path.display(), status = outcome.status.as_str(), "writing run result");
    write_json(path, outcome)
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn to_json_string<T: Serialize>(value: &T) -> Result<String> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    Ok(payload)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = to_json_string(value)?;
    write_atomic(path, &payload)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Lines of captured output shown under each failure in the summary.
pub const FAILURE_OUTPUT_LINES: usize = 20;

/// One line per step in execution order, then the status and failures.
///
/// The primary failure is printed before any cleanup failure so the two are
/// never confused. Each failure is followed by the tail of the failed step's
/// output (stderr, or stdout when stderr is empty).
pub fn render_summary(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    for result in &outcome.results {
        let _ = writeln!(out, "{}", summary_line(result));
    }
    let _ = writeln!(out, "status: {}", outcome.status.as_str());
    if let Some(failure) = &outcome.failure {
        let _ = writeln!(out, "failure: {}", failure.message);
        write_output_tail(&mut out, outcome.result(&failure.step_name));
    }
    for cleanup in &outcome.cleanup_failures {
        let _ = writeln!(out, "cleanup failure: {}", cleanup.message);
        write_output_tail(&mut out, outcome.result(&cleanup.step_name));
    }
    out
}

fn write_output_tail(out: &mut String, result: Option<&StepResult>) {
    let Some(result) = result else {
        return;
    };
    let text = if result.stderr.trim().is_empty() {
        &result.stdout
    } else {
        &result.stderr
    };
    let lines: Vec<&str> = text.lines().collect();
    let skipped = lines.len().saturating_sub(FAILURE_OUTPUT_LINES);
    if skipped > 0 {
        let _ = writeln!(out, "    | ... {skipped} earlier lines omitted");
    }
    for line in &lines[skipped..] {
        let _ = writeln!(out, "    | {line}");
    }
}

fn summary_line(result: &StepResult) -> String {
    let mark = if result.succeeded { "ok" } else { "FAIL" };
    let mut details = vec![describe_exit(&result.exit_code)];
    if result.attempts > 1 {
        details.push(format!("{} attempts", result.attempts));
    }
    if result.timed_out {
        details.push("timed out".to_string());
    }
    if result.role == StepRole::Release {
        details.push("cleanup".to_string());
    }
    format!("[{mark:>4}] {} ({})", result.step_name, details.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FailureCause, FailureKind, RunStatus};

    fn outcome() -> RunOutcome {
        RunOutcome {
            status: RunStatus::Failed,
            results: vec![
                StepResult::from_exit("git init", Some(0)),
                StepResult {
                    attempts: 3,
                    ..StepResult::from_exit("go mod download", Some(1))
                },
                StepResult::from_exit("stop the cloud emulators", Some(2))
                    .with_role(StepRole::Release),
            ],
            failure: Some(FailureCause {
                step_name: "go mod download".to_string(),
                kind: FailureKind::RetryExhausted,
                message: "step 'go mod download' failed after 3 attempts".to_string(),
            }),
            cleanup_failures: vec![FailureCause {
                step_name: "stop the cloud emulators".to_string(),
                kind: FailureKind::Cleanup,
                message: "cleanup step 'stop the cloud emulators' failed".to_string(),
            }],
        }
    }

    #[test]
    fn summary_lists_steps_then_primary_failure_then_cleanup() {
        let text = render_summary(&outcome());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[  ok] git init (exit code 0)");
        assert_eq!(lines[1], "[FAIL] go mod download (exit code 1, 3 attempts)");
        assert_eq!(
            lines[2],
            "[FAIL] stop the cloud emulators (exit code 2, cleanup)"
        );
        assert_eq!(lines[3], "status: failed");
        assert!(lines[4].starts_with("failure: step 'go mod download'"));
        assert!(lines[5].starts_with("cleanup failure:"));
    }

    #[test]
    fn failures_show_the_tail_of_captured_output() {
        let mut outcome = outcome();
        outcome.results[1].stderr =
            "go: downloading example.com/a\nfatal: connection reset\n".to_string();
        outcome.results[2].stdout = "emulators still running\n".to_string();
        let text = render_summary(&outcome);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[4].starts_with("failure: step 'go mod download'"));
        assert_eq!(lines[5], "    | go: downloading example.com/a");
        assert_eq!(lines[6], "    | fatal: connection reset");
        assert!(lines[7].starts_with("cleanup failure:"));
        assert_eq!(lines[8], "    | emulators still running");
    }

    #[test]
    fn long_failure_output_is_cut_to_the_last_lines() {
        let mut outcome = outcome();
        outcome.results[1].stderr = (1..=50).map(|n| format!("line {n}\n")).collect();
        let text = render_summary(&outcome);
        assert!(text.contains("    | ... 30 earlier lines omitted\n"));
        assert!(!text.contains("| line 30\n"));
        assert!(text.contains("    | line 31\n"));
        assert!(text.contains("    | line 50\n"));
    }

    #[test]
    fn written_outcome_parses_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out").join("result.json");
        write_outcome(&path, &outcome()).expect("write");
        let raw = fs::read_to_string(&path).expect("read");
        let parsed: RunOutcome = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, outcome());
        assert!(!path.with_extension("json.tmp").exists());
        assert!(raw.contains("\"status\": \"failed\""));
    }
}
