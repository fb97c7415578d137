//! DispatchLoop - dispatcher を駆動するイベントループ
//!
//! Three inputs, one task:
//! - commands from the `Manager` (submit / status / shutdown)
//! - replies from workers
//! - timeout expirations
//!
//! Commands already waiting in the channel are taken as one batch before
//! `drain` runs, so tasks submitted back to back are ordered by priority
//! rather than by arrival.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span};

use super::dispatcher::Dispatcher;
use super::registry::CompletionHandle;
use super::status::SchedulerStatus;
use super::worker_loop::WorkerEvent;
use crate::domain::{Task, TaskId};

pub(crate) enum DispatchCommand {
    Submit {
        task: Task,
        completion: CompletionHandle,
    },
    Status {
        resp: oneshot::Sender<SchedulerStatus>,
    },
    /// Dispose everything, then ack (if someone waits for it).
    Shutdown { resp: Option<oneshot::Sender<()>> },
}

pub(crate) struct DispatchLoop {
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedReceiver<DispatchCommand>,
    replies: mpsc::UnboundedReceiver<WorkerEvent>,
    expirations: mpsc::UnboundedReceiver<TaskId>,
}

/// What the loop should do after a batch of commands.
enum Flow {
    Continue,
    Stop(Option<oneshot::Sender<()>>),
}

impl DispatchLoop {
    pub(crate) fn new(
        dispatcher: Dispatcher,
        commands: mpsc::UnboundedReceiver<DispatchCommand>,
        replies: mpsc::UnboundedReceiver<WorkerEvent>,
        expirations: mpsc::UnboundedReceiver<TaskId>,
    ) -> Self {
        Self {
            dispatcher,
            commands,
            replies,
            expirations,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run().instrument(info_span!("dispatcher")))
    }

    async fn run(mut self) {
        info!("dispatch loop started");
        let ack = loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("command channel closed");
                        break None;
                    };
                    if let Flow::Stop(ack) = self.handle_batch(command) {
                        break ack;
                    }
                }
                Some(event) = self.replies.recv() => {
                    self.dispatcher.complete(event);
                    self.dispatcher.drain();
                }
                Some(task_id) = self.expirations.recv() => {
                    self.dispatcher.expire(task_id);
                }
            }
        };

        self.dispatcher.dispose();
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        info!("dispatch loop stopped");
    }

    /// Apply `first` and every command already queued behind it, then drain.
    /// Status requests are answered after the drain.
    fn handle_batch(&mut self, first: DispatchCommand) -> Flow {
        let mut status_waiters = Vec::new();
        let mut next = Some(first);

        while let Some(command) = next.take() {
            match command {
                DispatchCommand::Submit { task, completion } => {
                    self.dispatcher.enqueue(task, completion);
                }
                DispatchCommand::Status { resp } => status_waiters.push(resp),
                DispatchCommand::Shutdown { resp } => return Flow::Stop(resp),
            }
            next = self.commands.try_recv().ok();
        }

        self.dispatcher.drain();
        if !status_waiters.is_empty() {
            let status = self.dispatcher.status();
            for resp in status_waiters {
                let _ = resp.send(status.clone());
            }
        }
        Flow::Continue
    }
}
