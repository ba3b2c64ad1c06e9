//! Diagnostic tracing for the recipe runner.
//!
//! Step results are printed as a summary on stdout and optionally written to
//! `--output-result-json`. Tracing is separate: it goes to stderr, is filtered
//! by `RUST_LOG`, and is never part of the run report.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=recipe=info recipe run --buildername Infra-PerCommit-Small
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
