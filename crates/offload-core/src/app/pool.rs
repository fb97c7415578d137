//! WorkerPool - 専用ワーカーと汎用プール
//!
//! # 構成
//! - one dedicated worker per dedicated category, acquirable even while busy
//!   (its inbox serializes the work)
//! - `general_size` interchangeable general workers, each running at most one
//!   task at a time
//!
//! The pool is owned by the dispatcher; it never blocks.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::worker_loop::{WorkerEvent, WorkerLoop};
use crate::domain::{Route, SchedulerError, TaskCategory, WorkRequest, WorkerId};
use crate::ports::IdGenerator;
use crate::typed::{DynExecutor, ExecutorRegistry};

struct WorkerHandle {
    id: WorkerId,
    inbox: mpsc::UnboundedSender<WorkRequest>,
    join: JoinHandle<()>,
    in_flight: usize,
}

impl WorkerHandle {
    fn spawn(
        id: WorkerId,
        kind: &'static str,
        executors: Vec<Box<dyn DynExecutor>>,
        replies: &mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let join = WorkerLoop::new(id, executors, inbox_rx, replies.clone()).spawn(kind);
        Self {
            id,
            inbox,
            join,
            in_flight: 0,
        }
    }

    fn lease(&mut self) -> WorkerLease {
        self.in_flight += 1;
        WorkerLease {
            worker_id: self.id,
            inbox: self.inbox.clone(),
        }
    }
}

/// Right to send one request to one worker.
#[derive(Debug)]
pub(crate) struct WorkerLease {
    pub worker_id: WorkerId,
    pub inbox: mpsc::UnboundedSender<WorkRequest>,
}

#[derive(Default)]
pub(crate) struct WorkerPool {
    dedicated: HashMap<TaskCategory, WorkerHandle>,
    general: Vec<WorkerHandle>,
    /// General-routed categories the general workers can execute.
    general_categories: Vec<TaskCategory>,
    initialized: bool,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawn the workers. A second call is a no-op.
    ///
    /// A dedicated category without a registered executor gets no worker.
    /// General workers each get their own executor for every registered
    /// general-routed category.
    pub(crate) fn initialize(
        &mut self,
        executors: &ExecutorRegistry,
        ids: &dyn IdGenerator,
        general_size: usize,
        replies: &mpsc::UnboundedSender<WorkerEvent>,
    ) {
        if self.initialized {
            return;
        }

        for category in TaskCategory::DEDICATED {
            let Some(executor) = executors.instantiate(category) else {
                debug!(%category, "no executor registered, skipping dedicated worker");
                continue;
            };
            let worker = WorkerHandle::spawn(
                ids.generate_worker_id(),
                category.as_str(),
                vec![executor],
                replies,
            );
            self.dedicated.insert(category, worker);
        }

        self.general_categories = executors
            .registered_categories()
            .into_iter()
            .filter(|c| c.route() == Route::General)
            .collect();
        for _ in 0..general_size {
            let slots = self
                .general_categories
                .iter()
                .filter_map(|c| executors.instantiate(*c))
                .collect();
            let worker = WorkerHandle::spawn(ids.generate_worker_id(), "general", slots, replies);
            self.general.push(worker);
        }

        self.initialized = true;
        info!(
            dedicated = self.dedicated.len(),
            general = self.general.len(),
            "worker pool initialized"
        );
    }

    /// Pick a worker for `category`.
    ///
    /// - dedicated: the category's worker, busy or not
    /// - general: the first idle general worker
    ///
    /// Never waits. A dedicated worker whose task has ended is `WorkerLost`;
    /// everything else that finds no worker is `NoWorkerAvailable`.
    pub(crate) fn acquire(&mut self, category: TaskCategory) -> Result<WorkerLease, SchedulerError> {
        match category.route() {
            Route::Dedicated => {
                let worker = self
                    .dedicated
                    .get_mut(&category)
                    .ok_or(SchedulerError::NoWorkerAvailable(category))?;
                if worker.inbox.is_closed() {
                    return Err(SchedulerError::WorkerLost(category));
                }
                Ok(worker.lease())
            }
            Route::General => {
                if !self.general_categories.contains(&category) {
                    return Err(SchedulerError::NoWorkerAvailable(category));
                }
                self.general
                    .iter_mut()
                    .find(|w| w.in_flight == 0 && !w.inbox.is_closed())
                    .map(WorkerHandle::lease)
                    .ok_or(SchedulerError::NoWorkerAvailable(category))
            }
        }
    }

    /// Mark one task of `worker_id` as finished.
    pub(crate) fn release(&mut self, worker_id: WorkerId) {
        if let Some(worker) = self
            .dedicated
            .values_mut()
            .chain(self.general.iter_mut())
            .find(|w| w.id == worker_id)
        {
            worker.in_flight = worker.in_flight.saturating_sub(1);
        }
    }

    /// Abort every worker, mid-task or not, and forget them.
    pub(crate) fn dispose(&mut self) {
        let count = self.active_workers();
        for worker in self.dedicated.drain().map(|(_, w)| w).chain(self.general.drain(..)) {
            worker.join.abort();
        }
        self.general_categories.clear();
        self.initialized = false;
        if count > 0 {
            info!(workers = count, "worker pool disposed");
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn active_workers(&self) -> usize {
        self.dedicated.len() + self.general.len()
    }

    pub(crate) fn busy_workers(&self) -> usize {
        self.dedicated
            .values()
            .chain(self.general.iter())
            .filter(|w| w.in_flight > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ManagerConfig;
    use crate::impls::register_defaults;
    use crate::ports::{SystemClock, UlidGenerator};
    use crate::typed::task::fixtures::{LabelTask, SpectrumLabelTask};
    use crate::typed::{Handler, HandlerError};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Handler<LabelTask> for Echo {
        async fn handle(&mut self, task: LabelTask) -> Result<String, HandlerError> {
            Ok(task.label)
        }
    }

    #[async_trait]
    impl Handler<SpectrumLabelTask> for Echo {
        async fn handle(&mut self, task: SpectrumLabelTask) -> Result<String, HandlerError> {
            Ok(task.label)
        }
    }

    fn pool_with(executors: &ExecutorRegistry, general: usize) -> WorkerPool {
        let (reply_tx, _reply_rx) = mpsc::unbounded_channel();
        let mut pool = WorkerPool::new();
        pool.initialize(executors, &UlidGenerator::new(SystemClock), general, &reply_tx);
        pool
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let mut executors = ExecutorRegistry::new();
        register_defaults(&mut executors, &ManagerConfig::default());
        let (reply_tx, _reply_rx) = mpsc::unbounded_channel();
        let ids = UlidGenerator::new(SystemClock);

        let mut pool = WorkerPool::new();
        pool.initialize(&executors, &ids, 2, &reply_tx);
        pool.initialize(&executors, &ids, 2, &reply_tx);

        assert_eq!(pool.active_workers(), 5);
        pool.dispose();
        assert_eq!(pool.active_workers(), 0);
    }

    #[tokio::test]
    async fn dedicated_worker_is_returned_while_busy() {
        let mut executors = ExecutorRegistry::new();
        executors.register::<LabelTask, _, _>(|| Echo).unwrap();
        let mut pool = pool_with(&executors, 0);

        let first = pool.acquire(TaskCategory::TemporalCalc).unwrap();
        let second = pool.acquire(TaskCategory::TemporalCalc).unwrap();
        assert_eq!(first.worker_id, second.worker_id);
        assert_eq!(pool.busy_workers(), 1);

        // unregistered dedicated category has no worker
        assert!(matches!(
            pool.acquire(TaskCategory::MathOps),
            Err(SchedulerError::NoWorkerAvailable(TaskCategory::MathOps))
        ));
    }

    #[tokio::test]
    async fn general_workers_are_exclusive() {
        let mut executors = ExecutorRegistry::new();
        executors.register::<SpectrumLabelTask, _, _>(|| Echo).unwrap();
        let mut pool = pool_with(&executors, 1);

        let lease = pool.acquire(TaskCategory::SpectrumAnalysis).unwrap();
        assert!(pool.acquire(TaskCategory::SpectrumAnalysis).unwrap_err().is_routing());

        pool.release(lease.worker_id);
        let again = pool.acquire(TaskCategory::SpectrumAnalysis).unwrap();
        assert_eq!(again.worker_id, lease.worker_id);
    }

    #[tokio::test]
    async fn empty_general_pool_rejects() {
        let mut executors = ExecutorRegistry::new();
        executors.register::<SpectrumLabelTask, _, _>(|| Echo).unwrap();
        let mut pool = pool_with(&executors, 0);

        assert!(matches!(
            pool.acquire(TaskCategory::SpectrumAnalysis),
            Err(SchedulerError::NoWorkerAvailable(TaskCategory::SpectrumAnalysis))
        ));
    }
}
