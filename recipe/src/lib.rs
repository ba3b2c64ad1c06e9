//! Single-machine CI build recipe runner.
//!
//! A recipe is a named, branching sequence of external commands that drives one
//! CI build. This crate executes such a sequence with bounded retries,
//! composed process environments, builder-name driven branching, and release
//! steps that run on every exit path. The layout mirrors that split:
//!
//! - **[`core`]**: Pure, deterministic logic (classification, environment
//!   composition, plans, the sequencing state machine). No I/O.
//! - **[`io`]**: Side-effecting operations (process execution, config, reports).
//!   Isolated behind traits so tests can script outcomes.
//!
//! Orchestration modules ([`retry`], [`sequencer`], [`recipes`], [`driver`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod core;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod recipes;
pub mod retry;
pub mod sequencer;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
