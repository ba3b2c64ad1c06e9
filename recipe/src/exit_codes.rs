//! Stable exit codes for recipe CLI commands.

/// Every step succeeded, or a non-executing command completed.
pub const OK: i32 = 0;
/// A main-sequence step failed or could not be launched.
pub const FAILED: i32 = 1;
/// The main sequence succeeded but a release step failed.
pub const CLEANUP_FAILED: i32 = 2;
/// Invalid invocation, config, or plan; nothing was executed.
pub const INVALID: i32 = 3;
