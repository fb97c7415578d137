//! CompletionRegistry - task id と完了チャネルの対応表
//!
//! Each submitted task owns one oneshot sender. Settling removes the sender
//! from the table and fires it, so a task can be settled at most once: a
//! second settle (or a reply for an unknown id) finds nothing and is counted
//! as an orphan.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::{SchedulerError, TaskId};

/// Raw outcome delivered to a caller: JSON result or scheduler error.
pub type TaskOutcome = Result<serde_json::Value, SchedulerError>;

/// Sending half of a task's completion.
#[derive(Debug)]
pub struct CompletionHandle {
    task_id: TaskId,
    sender: oneshot::Sender<TaskOutcome>,
}

impl CompletionHandle {
    /// Create the handle together with the receiver the caller will await.
    pub fn channel(task_id: TaskId) -> (Self, oneshot::Receiver<TaskOutcome>) {
        let (sender, receiver) = oneshot::channel();
        (Self { task_id, sender }, receiver)
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Consume the handle. Returns `false` if the caller dropped its future.
    pub fn settle(self, outcome: TaskOutcome) -> bool {
        self.sender.send(outcome).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct CompletionRegistry {
    pending: HashMap<TaskId, CompletionHandle>,
    settled_total: u64,
    orphaned: u64,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle` until its task settles.
    ///
    /// A second registration of the same id is refused: the new handle is
    /// failed with `DuplicateTask` right away and the original stays pending.
    pub fn register(&mut self, handle: CompletionHandle) -> Result<(), SchedulerError> {
        let task_id = handle.task_id;
        if self.pending.contains_key(&task_id) {
            let err = SchedulerError::DuplicateTask(task_id);
            handle.settle(Err(err.clone()));
            return Err(err);
        }
        self.pending.insert(task_id, handle);
        Ok(())
    }

    /// Fire the continuation for `task_id` exactly once.
    ///
    /// Returns `false` for an unknown id (already settled, disposed, or never
    /// registered); the outcome is dropped.
    pub fn settle(&mut self, task_id: TaskId, outcome: TaskOutcome) -> bool {
        let Some(handle) = self.pending.remove(&task_id) else {
            self.record_orphan(task_id);
            return false;
        };
        self.settled_total += 1;
        let ok = outcome.is_ok();
        if !handle.settle(outcome) {
            debug!(%task_id, "caller no longer waiting for completion");
        }
        debug!(%task_id, ok, "task settled");
        true
    }

    /// Count and log a reply that matches no pending task.
    pub fn record_orphan(&mut self, task_id: TaskId) {
        self.orphaned += 1;
        warn!(%task_id, "orphaned completion dropped");
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn settled_total(&self) -> u64 {
        self.settled_total
    }

    pub fn orphaned(&self) -> u64 {
        self.orphaned
    }

    /// Drop every pending handle. Their receivers observe a closed channel.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
