//! Errors - エラー型と分類
//!
//! Every error a caller can observe arrives through the failure channel of
//! its `TaskHandle`. None of them is fatal to the manager.

use std::time::Duration;

use thiserror::Error;

use super::{TaskCategory, TaskId};

/// Operational classification of a [`SchedulerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No worker could take the task.
    Routing,
    /// The worker ran the task and it failed.
    Execution,
    /// The worker's one-time setup failed.
    Initialization,
    /// The task was not settled within the configured timeout.
    Timeout,
    /// The scheduler was disposed or could not start.
    Lifecycle,
    /// Payload or result could not be (de)serialized.
    Codec,
}

#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("no worker available for category {0}")]
    NoWorkerAvailable(TaskCategory),

    #[error("worker for category {0} is no longer running")]
    WorkerLost(TaskCategory),

    #[error("{category} execution failed: {message}")]
    Execution {
        category: TaskCategory,
        message: String,
    },

    #[error("{category} worker initialization failed: {message}")]
    Initialization {
        category: TaskCategory,
        message: String,
    },

    #[error("task {task_id} timed out after {elapsed:?}")]
    Timeout { task_id: TaskId, elapsed: Duration },

    #[error("task {0} is already registered")]
    DuplicateTask(TaskId),

    #[error("scheduler was disposed before the task settled")]
    Disposed,

    #[error("no tokio runtime available to start the scheduler")]
    RuntimeUnavailable,

    #[error("codec: {0}")]
    Codec(String),
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::NoWorkerAvailable(_) | SchedulerError::WorkerLost(_) => {
                ErrorKind::Routing
            }
            SchedulerError::Execution { .. } => ErrorKind::Execution,
            SchedulerError::Initialization { .. } => ErrorKind::Initialization,
            SchedulerError::Timeout { .. } => ErrorKind::Timeout,
            SchedulerError::DuplicateTask(_)
            | SchedulerError::Disposed
            | SchedulerError::RuntimeUnavailable => ErrorKind::Lifecycle,
            SchedulerError::Codec(_) => ErrorKind::Codec,
        }
    }

    pub fn is_routing(&self) -> bool {
        self.kind() == ErrorKind::Routing
    }
}
