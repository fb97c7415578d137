//! WorkerLoop - 1 ワーカーの実行ループ
//!
//! A worker is a tokio task that owns its executors outright and talks to
//! the dispatcher only through channels:
//! inbox (`WorkRequest`) -> lazy setup -> execute -> exactly one `WorkReply`.
//!
//! Requests are handled strictly one at a time in receipt order.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::domain::{FailureKind, TaskCategory, WorkReply, WorkRequest, WorkerId};
use crate::typed::DynExecutor;

/// Reply tagged with the worker that produced it.
#[derive(Debug)]
pub(crate) struct WorkerEvent {
    pub worker_id: WorkerId,
    pub reply: WorkReply,
}

struct ExecutorSlot {
    executor: Box<dyn DynExecutor>,
    initialized: bool,
}

pub(crate) struct WorkerLoop {
    id: WorkerId,
    slots: HashMap<TaskCategory, ExecutorSlot>,
    inbox: mpsc::UnboundedReceiver<WorkRequest>,
    replies: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerLoop {
    pub(crate) fn new(
        id: WorkerId,
        executors: Vec<Box<dyn DynExecutor>>,
        inbox: mpsc::UnboundedReceiver<WorkRequest>,
        replies: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        let slots = executors
            .into_iter()
            .map(|executor| {
                (
                    executor.category(),
                    ExecutorSlot {
                        executor,
                        initialized: false,
                    },
                )
            })
            .collect();
        Self {
            id,
            slots,
            inbox,
            replies,
        }
    }

    /// Spawn onto the current runtime. `kind` only labels the span.
    pub(crate) fn spawn(self, kind: &'static str) -> JoinHandle<()> {
        let span = info_span!("worker", worker_id = %self.id, kind);
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(mut self) {
        debug!("worker started");
        while let Some(request) = self.inbox.recv().await {
            let reply = self.process(request).await;
            let event = WorkerEvent {
                worker_id: self.id,
                reply,
            };
            if self.replies.send(event).is_err() {
                // dispatcher が先に終了した
                break;
            }
        }
        debug!("worker stopped");
    }

    async fn process(&mut self, request: WorkRequest) -> WorkReply {
        let WorkRequest {
            task_id,
            category,
            payload,
        } = request;

        let Some(slot) = self.slots.get_mut(&category) else {
            return WorkReply::failure(
                task_id,
                FailureKind::Execution,
                format!("worker does not handle category {category}"),
            );
        };

        if !slot.initialized {
            match AssertUnwindSafe(slot.executor.setup()).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!(%category, "executor ready");
                    slot.initialized = true;
                }
                Ok(Err(e)) => {
                    warn!(%task_id, %category, error = %e, "executor setup failed");
                    return WorkReply::failure(task_id, FailureKind::Initialization, e.to_string());
                }
                Err(panic) => {
                    let message = format!("setup panicked: {}", panic_message(panic.as_ref()));
                    warn!(%task_id, %category, %message, "executor setup failed");
                    return WorkReply::failure(task_id, FailureKind::Initialization, message);
                }
            }
        }

        match AssertUnwindSafe(slot.executor.execute(payload)).catch_unwind().await {
            Ok(Ok(result)) => WorkReply::success(task_id, result),
            Ok(Err(e)) => {
                debug!(%task_id, %category, error = %e, "task failed");
                WorkReply::failure(task_id, FailureKind::Execution, e.to_string())
            }
            Err(panic) => {
                let message = format!("handler panicked: {}", panic_message(panic.as_ref()));
                warn!(%task_id, %category, %message);
                WorkReply::failure(task_id, FailureKind::Execution, message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
