//! Recipe configuration loaded from an optional TOML file (default `recipe.toml`).

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::env::emulator_hosts;
use crate::io::executor::ExecOptions;
use crate::retry::RetryPolicy;

/// Recipe configuration (TOML).
///
/// Missing fields default to the values the CI builders use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecipeConfig {
    /// Attempts for dependency fetch steps (`go mod download`).
    pub fetch_attempts: u32,

    /// Pause between attempts of a retryable step, in milliseconds.
    pub retry_delay_ms: u64,

    /// Truncate captured stdout/stderr of each step beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Kill any single step that runs longer than this. Unset waits indefinitely.
    pub step_timeout_secs: Option<u64>,

    /// Go tools installed before tests run.
    pub install_targets: Vec<String>,

    /// Emulator control script, relative to the checkout.
    pub emulator_script: String,

    /// Endpoint variables exported to tests on large and race builders.
    /// A table in the file replaces the defaults as a whole.
    pub emulator_hosts: BTreeMap<String, String>,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            fetch_attempts: 3,
            retry_delay_ms: 0,
            output_limit_bytes: 1_000_000,
            step_timeout_secs: None,
            install_targets: [
                "github.com/golang/protobuf/protoc-gen-go",
                "github.com/kisielk/errcheck",
                "golang.org/x/tools/cmd/goimports",
                "golang.org/x/tools/cmd/stringer",
                "github.com/GeertJohan/go.rice/rice",
                "github.com/twitchtv/twirp/protoc-gen-twirp",
                "go.larrymyers.com/protoc-gen-twirp_typescript",
            ]
            .map(String::from)
            .to_vec(),
            emulator_script: "scripts/run_emulators/run_emulators".to_string(),
            emulator_hosts: emulator_hosts().into_iter().collect(),
        }
    }
}

impl RecipeConfig {
    pub fn validate(&self) -> Result<()> {
        RetryPolicy::new(self.fetch_attempts).context("fetch_attempts")?;
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.step_timeout_secs == Some(0) {
            return Err(anyhow!("step_timeout_secs must be > 0 when set"));
        }
        let mut seen = HashSet::new();
        for target in &self.install_targets {
            if target.trim().is_empty() {
                return Err(anyhow!("install_targets must not contain empty entries"));
            }
            if !seen.insert(target.as_str()) {
                return Err(anyhow!("install_targets contains duplicate '{target}'"));
            }
        }
        if self.emulator_script.trim().is_empty() {
            return Err(anyhow!("emulator_script must be non-empty"));
        }
        if let Some(key) = self
            .emulator_hosts
            .keys()
            .find(|key| key.is_empty() || key.contains('='))
        {
            return Err(anyhow!("emulator_hosts has invalid variable name '{key}'"));
        }
        Ok(())
    }

    /// Retry policy for dependency fetch steps.
    pub fn fetch_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy::new(self.fetch_attempts)?
            .with_delay(Duration::from_millis(self.retry_delay_ms)))
    }

    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            timeout: self.step_timeout_secs.map(Duration::from_secs),
            output_limit_bytes: self.output_limit_bytes,
            log_dir: None,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RecipeConfig::default()`.
pub fn load_config(path: &Path) -> Result<RecipeConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = RecipeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RecipeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
