//! Dispatcher - 優先度キュー・プール・完了表をまとめるスケジューラ本体
//!
//! Only ever driven by the dispatch loop, one call at a time, so `drain`
//! never overlaps itself and none of the state needs a lock.
//!
//! # フロー
//! 1. `enqueue`: register the completion, push into the priority queue
//!    (the dispatch loop enqueues a whole batch of submissions, then drains)
//! 2. `drain`: pop highest priority -> `acquire` -> send to the worker
//!    (no worker: settle failed right away, no re-queue)
//! 3. `complete`: reply from a worker -> release it -> settle the task
//! 4. `expire`: timeout fired before the reply -> settle failed
//!
//! Every task's `TaskState` is tracked from `enqueue` on and each step goes
//! through `TaskState::advance`. Settled tasks stay in the table for a while,
//! so a late or duplicate reply is refused by the state machine rather than
//! settling twice.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::pool::WorkerPool;
use super::queue::PriorityQueue;
use super::registry::{CompletionHandle, CompletionRegistry};
use super::status::SchedulerStatus;
use super::worker_loop::WorkerEvent;
use crate::domain::{
    FailureKind, ReplyError, SchedulerError, Task, TaskCategory, TaskId, TaskState, WorkerId,
};

/// Settled task ids remembered after their final transition.
const SETTLED_HISTORY: usize = 1024;

/// Bookkeeping for a task handed to a worker.
struct InFlight {
    worker_id: WorkerId,
    category: TaskCategory,
    dispatched_at: Instant,
    timer: Option<JoinHandle<()>>,
}

/// Why a transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refused {
    /// The task was never seen or has aged out of the history.
    Unknown,
    /// The move is not allowed from the current state.
    Illegal(TaskState),
}

pub(crate) struct Dispatcher {
    queue: PriorityQueue,
    pool: WorkerPool,
    registry: CompletionRegistry,
    in_flight: HashMap<TaskId, InFlight>,
    states: HashMap<TaskId, TaskState>,
    settled: VecDeque<TaskId>,
    task_timeout: Option<Duration>,
    expirations: mpsc::UnboundedSender<TaskId>,
}

impl Dispatcher {
    pub(crate) fn new(
        pool: WorkerPool,
        task_timeout: Option<Duration>,
        expirations: mpsc::UnboundedSender<TaskId>,
    ) -> Self {
        Self {
            queue: PriorityQueue::new(),
            pool,
            registry: CompletionRegistry::new(),
            in_flight: HashMap::new(),
            states: HashMap::new(),
            settled: VecDeque::new(),
            task_timeout,
            expirations,
        }
    }

    /// Created -> Queued. Does not dispatch.
    pub(crate) fn enqueue(&mut self, task: Task, completion: CompletionHandle) {
        let task_id = task.id();
        if self.states.contains_key(&task_id) {
            warn!(%task_id, "duplicate task id rejected");
            completion.settle(Err(SchedulerError::DuplicateTask(task_id)));
            return;
        }
        let mut state = TaskState::Created;
        if let Err(current) = state.advance(TaskState::Queued) {
            warn!(%task_id, ?current, "task could not be queued");
            return;
        }
        if self.registry.register(completion).is_err() {
            warn!(%task_id, "duplicate task id rejected");
            return;
        }
        self.states.insert(task_id, state);
        debug!(
            task_id = %task.id(),
            category = %task.category(),
            priority = %task.priority(),
            "task queued"
        );
        self.queue.push(task);
    }

    /// Dispatch everything queued, highest priority first.
    pub(crate) fn drain(&mut self) {
        while let Some(task) = self.queue.pop() {
            self.dispatch(task);
        }
    }

    /// Move `task_id` to `next`. Terminal states are kept in the bounded
    /// history.
    fn advance(&mut self, task_id: TaskId, next: TaskState) -> Result<(), Refused> {
        let state = self.states.get_mut(&task_id).ok_or(Refused::Unknown)?;
        state.advance(next).map_err(Refused::Illegal)?;
        if next.is_terminal() {
            self.settled.push_back(task_id);
            while self.settled.len() > SETTLED_HISTORY {
                if let Some(old) = self.settled.pop_front() {
                    self.states.remove(&old);
                }
            }
        }
        Ok(())
    }

    /// Queued -> Failed, then settle with `err`.
    fn fail_queued(&mut self, task_id: TaskId, err: SchedulerError) {
        if let Err(refused) = self.advance(task_id, TaskState::Failed) {
            warn!(%task_id, ?refused, "task state transition refused");
        }
        self.registry.settle(task_id, Err(err));
    }

    fn dispatch(&mut self, task: Task) {
        let task_id = task.id();
        let category = task.category();
        let priority = task.priority();

        let lease = match self.pool.acquire(category) {
            Ok(lease) => lease,
            Err(err) => {
                warn!(%task_id, %category, error = %err, "no worker for task");
                self.fail_queued(task_id, err);
                return;
            }
        };

        if lease.inbox.send(task.into_request()).is_err() {
            self.pool.release(lease.worker_id);
            warn!(%task_id, %category, worker_id = %lease.worker_id, "worker inbox closed");
            self.fail_queued(task_id, SchedulerError::WorkerLost(category));
            return;
        }

        if let Err(refused) = self.advance(task_id, TaskState::Dispatched) {
            warn!(%task_id, ?refused, "task state transition refused");
        }
        let timer = self.task_timeout.map(|timeout| {
            let expirations = self.expirations.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = expirations.send(task_id);
            })
        });
        self.in_flight.insert(
            task_id,
            InFlight {
                worker_id: lease.worker_id,
                category,
                dispatched_at: Instant::now(),
                timer,
            },
        );
        debug!(%task_id, %category, %priority, worker_id = %lease.worker_id, "task dispatched");
    }

    /// Dispatched -> Succeeded | Failed.
    ///
    /// The worker is always released. A reply the state machine refuses
    /// (already timed out, duplicate, or unknown) is counted as an orphan.
    pub(crate) fn complete(&mut self, event: WorkerEvent) {
        let WorkerEvent { worker_id, reply } = event;
        self.pool.release(worker_id);
        let task_id = reply.task_id;

        let outcome = reply.into_result();
        let next = if outcome.is_ok() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };
        if let Err(refused) = self.advance(task_id, next) {
            if let Refused::Illegal(current) = refused {
                warn!(%task_id, ?current, ?next, "reply for settled task refused");
            }
            self.registry.record_orphan(task_id);
            return;
        }

        let Some(mut entry) = self.in_flight.remove(&task_id) else {
            self.registry.record_orphan(task_id);
            return;
        };
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        let outcome = outcome.map_err(|e| reply_error(entry.category, e));
        debug!(
            %task_id,
            category = %entry.category,
            elapsed_ms = u64::try_from(entry.dispatched_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "reply received"
        );
        self.registry.settle(task_id, outcome);
    }

    /// Fail a dispatched task whose timeout fired. Its worker stays busy
    /// until the late reply arrives.
    pub(crate) fn expire(&mut self, task_id: TaskId) {
        let Some(mut entry) = self.in_flight.remove(&task_id) else {
            return;
        };
        if let Some(timer) = entry.timer.take() {
            timer.abort();
        }
        if let Err(refused) = self.advance(task_id, TaskState::Failed) {
            warn!(%task_id, ?refused, "task state transition refused");
        }
        let elapsed = entry.dispatched_at.elapsed();
        warn!(
            %task_id,
            category = %entry.category,
            worker_id = %entry.worker_id,
            ?elapsed,
            "task timed out"
        );
        self.registry
            .settle(task_id, Err(SchedulerError::Timeout { task_id, elapsed }));
    }

    pub(crate) fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            initialized: self.pool.is_initialized(),
            active_workers: self.pool.active_workers(),
            busy_workers: self.pool.busy_workers(),
            queue_length: self.queue.len(),
            pending_futures: self.registry.len(),
            settled_total: self.registry.settled_total(),
            orphaned_replies: self.registry.orphaned(),
        }
    }

    /// Stop all workers and reject everything still pending with `Disposed`.
    pub(crate) fn dispose(&mut self) {
        self.pool.dispose();
        let queued = self.queue.drain_all().len();
        for (_, entry) in self.in_flight.drain() {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
        }
        self.states.clear();
        self.settled.clear();
        // sender を drop すると TaskHandle 側は Disposed になる
        let rejected = self.registry.clear();
        info!(queued, rejected, "dispatcher disposed");
    }
}

#[cfg(test)]
impl Dispatcher {
    fn state_of(&self, task_id: TaskId) -> Option<TaskState> {
        self.states.get(&task_id).copied()
    }
}

fn reply_error(category: TaskCategory, error: ReplyError) -> SchedulerError {
    match error.kind {
        FailureKind::Initialization => SchedulerError::Initialization {
            category,
            message: error.message,
        },
        FailureKind::Execution => SchedulerError::Execution {
            category,
            message: error.message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, WorkReply};
    use crate::impls::register_defaults;
    use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
    use crate::app::ManagerConfig;
    use crate::typed::ExecutorRegistry;
    use serde_json::json;
    use ulid::Ulid;

    struct Harness {
        dispatcher: Dispatcher,
        replies: mpsc::UnboundedReceiver<WorkerEvent>,
        ids: UlidGenerator<SystemClock>,
    }

    fn harness(general: usize, timeout: Option<Duration>) -> Harness {
        let mut executors = ExecutorRegistry::new();
        register_defaults(&mut executors, &ManagerConfig::default());
        let ids = UlidGenerator::new(SystemClock);
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let (expiry_tx, _expiry_rx) = mpsc::unbounded_channel();

        let mut pool = WorkerPool::new();
        pool.initialize(&executors, &ids, general, &reply_tx);
        Harness {
            dispatcher: Dispatcher::new(pool, timeout, expiry_tx),
            replies,
            ids,
        }
    }

    fn submit(h: &mut Harness, task: Task, completion: CompletionHandle) {
        h.dispatcher.enqueue(task, completion);
        h.dispatcher.drain();
    }

    fn math_task(ids: &dyn IdGenerator) -> Task {
        Task::new(
            ids.generate_task_id(),
            TaskCategory::MathOps,
            Priority::Medium,
            json!({ "operation": "variance", "values": [1.0, 2.0, 3.0, 4.0, 5.0] }),
        )
    }

    #[tokio::test]
    async fn reply_settles_and_frees_worker() {
        let mut h = harness(0, None);
        let task = math_task(&h.ids);
        let (completion, rx) = CompletionHandle::channel(task.id());

        submit(&mut h, task, completion);
        assert_eq!(h.dispatcher.status().busy_workers, 1);

        let event = h.replies.recv().await.unwrap();
        h.dispatcher.complete(event);

        assert_eq!(rx.await.unwrap().unwrap()["value"], json!(2.0));
        let status = h.dispatcher.status();
        assert_eq!(status.busy_workers, 0);
        assert_eq!(status.pending_futures, 0);
        assert_eq!(status.settled_total, 1);
    }

    fn spectrum_task(ids: &dyn IdGenerator) -> Task {
        Task::new(
            ids.generate_task_id(),
            TaskCategory::SpectrumAnalysis,
            Priority::High,
            json!({ "data": [1.0], "operation": "normalize" }),
        )
    }

    #[tokio::test]
    async fn routing_failure_moves_queued_task_to_failed() {
        let mut h = harness(0, None);
        let task = spectrum_task(&h.ids);
        let task_id = task.id();
        let (completion, rx) = CompletionHandle::channel(task_id);

        h.dispatcher.enqueue(task, completion);
        assert_eq!(h.dispatcher.state_of(task_id), Some(TaskState::Queued));

        h.dispatcher.drain();
        assert_eq!(h.dispatcher.state_of(task_id), Some(TaskState::Failed));

        let err = rx.await.unwrap().unwrap_err();
        assert!(err.is_routing());
        assert_eq!(h.dispatcher.status().queue_length, 0);
    }

    #[tokio::test]
    async fn second_reply_for_settled_task_is_refused() {
        let mut h = harness(0, None);
        let task = math_task(&h.ids);
        let task_id = task.id();
        let (completion, rx) = CompletionHandle::channel(task_id);

        submit(&mut h, task, completion);
        assert_eq!(h.dispatcher.state_of(task_id), Some(TaskState::Dispatched));

        let event = h.replies.recv().await.unwrap();
        let duplicate = WorkerEvent {
            worker_id: event.worker_id,
            reply: event.reply.clone(),
        };
        h.dispatcher.complete(event);
        assert_eq!(h.dispatcher.state_of(task_id), Some(TaskState::Succeeded));

        h.dispatcher.complete(duplicate);
        assert_eq!(h.dispatcher.state_of(task_id), Some(TaskState::Succeeded));

        assert_eq!(rx.await.unwrap().unwrap()["value"], json!(2.0));
        let status = h.dispatcher.status();
        assert_eq!(status.settled_total, 1);
        assert_eq!(status.orphaned_replies, 1);
        assert_eq!(status.busy_workers, 0);
    }

    #[tokio::test]
    async fn settled_history_is_bounded() {
        let mut h = harness(0, None);
        let first = spectrum_task(&h.ids);
        let first_id = first.id();
        let (completion, _rx) = CompletionHandle::channel(first_id);
        submit(&mut h, first, completion);
        assert_eq!(h.dispatcher.state_of(first_id), Some(TaskState::Failed));

        for _ in 0..SETTLED_HISTORY {
            let task = spectrum_task(&h.ids);
            let (completion, _rx) = CompletionHandle::channel(task.id());
            submit(&mut h, task, completion);
        }
        assert_eq!(h.dispatcher.state_of(first_id), None);
    }

    #[tokio::test]
    async fn reused_id_of_settled_task_is_rejected() {
        let mut h = harness(0, None);
        let task = spectrum_task(&h.ids);
        let (completion, _rx) = CompletionHandle::channel(task.id());
        submit(&mut h, task.clone(), completion);

        let (again, again_rx) = CompletionHandle::channel(task.id());
        h.dispatcher.enqueue(task, again);
        assert!(matches!(
            again_rx.await.unwrap(),
            Err(SchedulerError::DuplicateTask(_))
        ));
        assert_eq!(h.dispatcher.status().queue_length, 0);
    }

    #[tokio::test]
    async fn late_reply_after_expiry_is_orphaned_but_frees_worker() {
        let mut h = harness(0, Some(Duration::from_secs(60)));
        let task = math_task(&h.ids);
        let task_id = task.id();
        let (completion, rx) = CompletionHandle::channel(task_id);

        submit(&mut h, task, completion);
        h.dispatcher.expire(task_id);
        assert_eq!(h.dispatcher.state_of(task_id), Some(TaskState::Failed));
        assert!(matches!(
            rx.await.unwrap(),
            Err(SchedulerError::Timeout { task_id: id, .. }) if id == task_id
        ));

        let event = h.replies.recv().await.unwrap();
        h.dispatcher.complete(event);
        assert_eq!(h.dispatcher.state_of(task_id), Some(TaskState::Failed));
        let status = h.dispatcher.status();
        assert_eq!(status.orphaned_replies, 1);
        assert_eq!(status.busy_workers, 0);
    }

    #[tokio::test]
    async fn failure_reply_keeps_its_category() {
        let mut h = harness(0, None);
        let task = Task::new(
            h.ids.generate_task_id(),
            TaskCategory::MathOps,
            Priority::Low,
            json!({ "operation": "variance", "values": [] }),
        );
        let (completion, rx) = CompletionHandle::channel(task.id());
        submit(&mut h, task, completion);
        let event = h.replies.recv().await.unwrap();
        h.dispatcher.complete(event);

        assert!(matches!(
            rx.await.unwrap(),
            Err(SchedulerError::Execution { category: TaskCategory::MathOps, .. })
        ));
    }

    #[tokio::test]
    async fn unknown_reply_counts_as_orphan() {
        let mut h = harness(0, None);
        let worker_id = WorkerId::from_ulid(Ulid::new());
        let stray = WorkReply::success(TaskId::from_ulid(Ulid::new()), json!(null));

        h.dispatcher.complete(WorkerEvent {
            worker_id,
            reply: stray,
        });
        assert_eq!(h.dispatcher.status().orphaned_replies, 1);
    }

    #[tokio::test]
    async fn dispose_rejects_pending() {
        let mut h = harness(0, None);
        let task = math_task(&h.ids);
        let task_id = task.id();
        let (completion, rx) = CompletionHandle::channel(task_id);
        h.dispatcher.enqueue(task, completion);

        h.dispatcher.dispose();
        assert!(rx.await.is_err());
        assert_eq!(h.dispatcher.state_of(task_id), None);
        let status = h.dispatcher.status();
        assert!(!status.initialized);
        assert_eq!(status.active_workers, 0);
        assert_eq!(status.pending_futures, 0);
    }
}
