//! Main-sequence state machine.
//!
//! `Pending -> Running(0) -> ... -> Running(n-1) -> Succeeded`, or `Failed` as
//! soon as any step fails. `Succeeded` and `Failed` are terminal: further
//! events leave them unchanged. The cleanup phase does not transition the
//! machine; [`SequenceState::finalize`] folds its result into a [`RunStatus`].

use crate::core::types::RunStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Pending,
    Running(usize),
    Succeeded,
    Failed,
}

impl SequenceState {
    /// Begin a sequence of `total` steps. An empty sequence succeeds at once.
    pub fn start(self, total: usize) -> Self {
        match self {
            SequenceState::Pending if total == 0 => SequenceState::Succeeded,
            SequenceState::Pending => SequenceState::Running(0),
            other => other,
        }
    }

    /// Record the outcome of the step at the current index.
    pub fn step_finished(self, succeeded: bool, total: usize) -> Self {
        match self {
            SequenceState::Running(_) if !succeeded => SequenceState::Failed,
            SequenceState::Running(index) if index + 1 < total => {
                SequenceState::Running(index + 1)
            }
            SequenceState::Running(_) => SequenceState::Succeeded,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SequenceState::Succeeded | SequenceState::Failed)
    }

    /// Combine the main-sequence state with the cleanup result.
    ///
    /// A cleanup failure only surfaces when the main sequence succeeded; it
    /// never masks `Failed`. A sequence that never reached a terminal state
    /// (interrupted) counts as failed.
    pub fn finalize(self, cleanup_failed: bool) -> RunStatus {
        match self {
            SequenceState::Succeeded if cleanup_failed => RunStatus::CleanupFailed,
            SequenceState::Succeeded => RunStatus::Success,
            SequenceState::Failed | SequenceState::Pending | SequenceState::Running(_) => {
                RunStatus::Failed
            }
        }
    }
}
