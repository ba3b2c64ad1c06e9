//! Bounded retry for steps that are safe to repeat.
//!
//! Only steps explicitly marked retryable go through here (dependency fetches,
//! for example); most steps are not idempotent. A deterministic failure fails
//! identically on every attempt, so the reported result stays accurate.

use std::thread;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::core::types::{Step, StepResult};
use crate::error::{ConfigError, LaunchError};
use crate::io::executor::CommandExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` must be at least 1.
    pub fn new(max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts(max_attempts));
        }
        Ok(Self {
            max_attempts,
            delay: Duration::ZERO,
        })
    }

    /// Fixed pause between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Execute `step` until it succeeds or `max_attempts` runs have failed.
    ///
    /// Returns the first successful result (`attempts = k`) or the last failed
    /// one (`attempts = max_attempts`). A [`LaunchError`] is returned at once,
    /// tagged with the attempt it happened on; a program that cannot be
    /// started will not start on a second try either.
    #[instrument(skip_all, fields(step = %step.name, max_attempts = self.max_attempts))]
    pub fn run_with_retry<E: CommandExecutor + ?Sized>(
        &self,
        executor: &E,
        step: &Step,
    ) -> Result<StepResult, LaunchError> {
        let mut attempt = 1;
        loop {
            let mut result = executor
                .execute(step)
                .map_err(|err| err.on_attempt(attempt))?;
            result.attempts = attempt;
            if result.succeeded {
                if attempt > 1 {
                    info!(attempt, "step succeeded after retry");
                }
                return Ok(result);
            }
            if attempt >= self.max_attempts {
                warn!(attempt, exit_code = ?result.exit_code, "retries exhausted");
                return Ok(result);
            }
            warn!(attempt, exit_code = ?result.exit_code, "step failed, retrying");
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            attempt += 1;
        }
    }
}
