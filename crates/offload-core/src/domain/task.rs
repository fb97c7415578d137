use serde::{Deserialize, Serialize};

use super::envelope::WorkRequest;
use super::{Priority, TaskCategory, TaskId};

/// One unit of work: category + opaque payload + priority.
///
/// Created by the manager on submission and never mutated afterwards.
/// The dispatcher consumes it when it hands the payload to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    category: TaskCategory,
    priority: Priority,
    payload: serde_json::Value,
}

impl Task {
    pub fn new(
        id: TaskId,
        category: TaskCategory,
        priority: Priority,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            category,
            priority,
            payload,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn category(&self) -> TaskCategory {
        self.category
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// 運搬用のメッセージに変換（payload は move）
    pub fn into_request(self) -> WorkRequest {
        WorkRequest {
            task_id: self.id,
            category: self.category,
            payload: self.payload,
        }
    }
}
