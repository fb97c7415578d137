//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Created -> Queued -> Dispatched -> Succeeded
/// - Created -> Queued -> Dispatched -> Failed
/// - Created -> Queued -> Failed (no worker could be acquired)
///
/// No task ever moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Built by the manager, not yet seen by the dispatcher.
    Created,

    /// Waiting in the dispatcher's priority queue.
    Queued,

    /// Handed to a worker, reply outstanding.
    Dispatched,

    /// Settled with a result.
    Succeeded,

    /// Settled with an error.
    Failed,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Created, TaskState::Queued)
                | (TaskState::Queued, TaskState::Dispatched)
                | (TaskState::Queued, TaskState::Failed)
                | (TaskState::Dispatched, TaskState::Succeeded)
                | (TaskState::Dispatched, TaskState::Failed)
        )
    }

    /// Move to `next`, or return the current state untouched if the
    /// transition is not allowed.
    pub fn advance(&mut self, next: TaskState) -> Result<(), TaskState> {
        if self.can_transition_to(next) {
            *self = next;
            Ok(())
        } else {
            Err(*self)
        }
    }
}
