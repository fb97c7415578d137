//! Envelopes exchanged between the dispatcher and workers.
//!
//! Workers share no memory with the dispatcher. A request carries everything
//! the worker needs, and exactly one tagged reply comes back per request.

use serde::{Deserialize, Serialize};

use super::{TaskCategory, TaskId};

/// `{taskId, category, payload}` sent to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    pub task_id: TaskId,
    pub category: TaskCategory,
    pub payload: serde_json::Value,
}

/// Why a worker could not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The one-time setup of the executor failed.
    Initialization,
    /// The computation itself failed (bad input, panic, ...).
    Execution,
}

/// `{taskId, success, result | error}` sent back by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkReply {
    pub task_id: TaskId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: FailureKind,
    pub message: String,
}

impl WorkReply {
    pub fn success(task_id: TaskId, result: serde_json::Value) -> Self {
        Self {
            task_id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(task_id: TaskId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            task_id,
            success: false,
            result: None,
            error: Some(ReplyError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Collapse the wire shape into a `Result`.
    ///
    /// A malformed reply (success without result, failure without error) is
    /// read as `Null` / an execution failure so it still settles the task.
    pub fn into_result(self) -> Result<serde_json::Value, ReplyError> {
        if self.success {
            Ok(self.result.unwrap_or(serde_json::Value::Null))
        } else {
            Err(self.error.unwrap_or(ReplyError {
                kind: FailureKind::Execution,
                message: "worker reported failure without an error".to_string(),
            }))
        }
    }
}
