//! Deterministic, pure logic shared by the recipe runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod env;
pub mod plan;
pub mod state;
pub mod types;
