//! I/O helpers for recipe commands.

pub mod config;
pub mod executor;
pub mod process;
pub mod report;
