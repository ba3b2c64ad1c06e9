//! Helpers for running child processes with bounded output and an optional deadline.

use std::io::Read;
use std::mem;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long to keep reading output after the child exits.
///
/// A step may leave a background process (an emulator, a daemon) holding the
/// inherited pipes open. Readers still running after this grace period are
/// detached and the output captured so far is returned.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    /// Output pipes were still open after the child exited.
    pub output_detached: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        truncated_notice(label, "stdout", self.stdout_truncated)
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        truncated_notice(label, "stderr", self.stderr_truncated)
    }
}

fn truncated_notice(label: &str, stream: &str, truncated: usize) -> String {
    if truncated > 0 {
        format!("\n[{label} {stream} truncated {truncated} bytes]\n")
    } else {
        String::new()
    }
}

/// Run a command to completion and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// With `timeout = None` the child runs until it exits on its own; otherwise it is killed at the
/// deadline and `timed_out` is set.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_captured(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_reader = StreamReader::spawn(stdout, output_limit_bytes);
    let stderr_reader = StreamReader::spawn(stderr, output_limit_bytes);

    let (status, timed_out) = wait_for(&mut child, timeout)?;

    let drain_deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
    let stdout = stdout_reader.finish(drain_deadline).context("collect stdout")?;
    let stderr = stderr_reader.finish(drain_deadline).context("collect stderr")?;
    let output_detached = stdout.detached || stderr.detached;
    if output_detached {
        warn!(
            grace_ms = OUTPUT_DRAIN_GRACE.as_millis(),
            "output pipes still open after exit (background process?), detaching readers"
        );
    }

    let (stdout_truncated, stderr_truncated) = (stdout.truncated, stderr.truncated);
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        output_detached,
    })
}

fn wait_for(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait().context("wait for command")?, false));
    };
    match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            Ok((status, true))
        }
    }
}

/// Bytes kept from one stream plus the count discarded beyond the limit.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
    detached: bool,
}

/// Background reader for one output pipe.
///
/// The buffer is shared so a reader that never sees EOF can be abandoned
/// without losing what it already read.
struct StreamReader {
    captured: Arc<Mutex<Captured>>,
    done: Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&captured);
        thread::spawn(move || {
            // The receiver is gone once the reader has been detached.
            let _ = tx.send(read_stream_limited(reader, limit, &sink));
        });
        Self { captured, done }
    }

    /// Wait until EOF or `deadline`, then take the captured bytes.
    fn finish(self, deadline: Instant) -> Result<Captured> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let detached = match self.done.recv_timeout(timeout) {
            Ok(result) => {
                result?;
                false
            }
            Err(RecvTimeoutError::Timeout) => true,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        };
        let mut captured = self
            .captured
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        Ok(Captured {
            bytes: mem::take(&mut captured.bytes),
            truncated: captured.truncated,
            detached,
        })
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    sink: &Mutex<Captured>,
) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let remaining = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(remaining);
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }
}
