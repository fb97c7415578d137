//! Manager - 外部コードが触る唯一の入口
//!
//! An explicit, constructible context (no global instance). It owns the
//! executor registry and, once initialized, the dispatch loop which in turn
//! owns the pool, the queue and the completion registry.
//!
//! Submission is synchronous and never blocks: it builds the task, hands it
//! to the dispatch loop and returns a [`TaskHandle`] to await.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::builder::ManagerBuilder;
use super::config::ManagerConfig;
use super::dispatch_loop::{DispatchCommand, DispatchLoop};
use super::dispatcher::Dispatcher;
use super::handle::TaskHandle;
use super::pool::WorkerPool;
use super::registry::CompletionHandle;
use super::status::SchedulerStatus;
use crate::domain::{Priority, SchedulerError, Task};
use crate::impls::{
    MathOperation, MathRequest, MathResult, MathValues, NeuralFusionInput, NeuralResult,
    SpectrumOperation, SpectrumRequest, SpectrumResult, TemporalCalculation, TemporalConstants,
    TemporalInput, TemporalResult, register_defaults,
};
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
use crate::typed::{CategoryTask, ExecutorRegistry};

struct Running {
    commands: mpsc::UnboundedSender<DispatchCommand>,
    dispatch_loop: JoinHandle<()>,
}

pub struct Manager {
    config: ManagerConfig,
    executors: ExecutorRegistry,
    ids: Arc<dyn IdGenerator>,
    // never held across an await
    state: Mutex<Option<Running>>,
}

impl Manager {
    /// Manager with the built-in executor for every category.
    pub fn new(config: ManagerConfig) -> Self {
        let mut executors = ExecutorRegistry::new();
        register_defaults(&mut executors, &config);
        Self::from_parts(config, executors, Arc::new(UlidGenerator::new(SystemClock)))
    }

    pub fn builder(config: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::new(config)
    }

    pub(crate) fn from_parts(
        config: ManagerConfig,
        executors: ExecutorRegistry,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            config,
            executors,
            ids,
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Spawn the workers and the dispatch loop. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn initialize(&self) -> Result<(), SchedulerError> {
        self.commands().map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .is_some_and(|running| !running.commands.is_closed())
    }

    fn commands(&self) -> Result<mpsc::UnboundedSender<DispatchCommand>, SchedulerError> {
        let mut state = self.state.lock();
        if let Some(running) = state.as_ref() {
            if !running.commands.is_closed() {
                return Ok(running.commands.clone());
            }
            warn!("dispatch loop ended unexpectedly, restarting");
        }
        let running = self.start()?;
        let commands = running.commands.clone();
        *state = Some(running);
        Ok(commands)
    }

    fn start(&self) -> Result<Running, SchedulerError> {
        Handle::try_current().map_err(|_| SchedulerError::RuntimeUnavailable)?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();

        let mut pool = WorkerPool::new();
        pool.initialize(
            &self.executors,
            self.ids.as_ref(),
            self.config.general_pool_size(),
            &reply_tx,
        );
        let dispatcher = Dispatcher::new(pool, self.config.task_timeout(), expiry_tx);
        let dispatch_loop = DispatchLoop::new(dispatcher, command_rx, reply_rx, expiry_rx).spawn();

        info!(
            general_workers = self.config.general_pool_size(),
            timeout_ms = self.config.task_timeout_ms,
            "scheduler initialized"
        );
        Ok(Running {
            commands: command_tx,
            dispatch_loop,
        })
    }

    /// Submit a typed task. Initializes the scheduler on first use.
    ///
    /// Every failure, including "no runtime", arrives through the handle.
    ///
    /// Priority orders the tasks waiting in the dispatcher queue at the same
    /// time: submissions that reach the dispatch loop before it next drains
    /// are dispatched highest priority first. On a multi-thread runtime the
    /// loop may drain between two calls, in which case the earlier task has
    /// already been handed to its worker whatever its priority.
    pub fn submit<T: CategoryTask>(&self, input: T, priority: Priority) -> TaskHandle<T::Output> {
        let task_id = self.ids.generate_task_id();
        let payload = match serde_json::to_value(&input) {
            Ok(payload) => payload,
            Err(e) => {
                return TaskHandle::failed(task_id, SchedulerError::Codec(format!("payload encode: {e}")));
            }
        };
        let commands = match self.commands() {
            Ok(commands) => commands,
            Err(err) => return TaskHandle::failed(task_id, err),
        };

        let task = Task::new(task_id, T::CATEGORY, priority, payload);
        let (completion, receiver) = CompletionHandle::channel(task_id);
        if commands
            .send(DispatchCommand::Submit { task, completion })
            .is_err()
        {
            // completion は破棄済み -> handle は Disposed で解決する
            debug!(%task_id, "dispatch loop gone before submission");
        }
        TaskHandle::new(task_id, receiver)
    }

    pub fn submit_neural_fusion(
        &self,
        input: NeuralFusionInput,
        priority: Priority,
    ) -> TaskHandle<NeuralResult> {
        self.submit(input, priority)
    }

    pub fn submit_temporal_calculation(
        &self,
        input: TemporalInput,
        constants: TemporalConstants,
        priority: Priority,
    ) -> TaskHandle<TemporalResult> {
        self.submit(TemporalCalculation { input, constants }, priority)
    }

    pub fn submit_math_operation(
        &self,
        operation: MathOperation,
        values: MathValues,
        priority: Priority,
    ) -> TaskHandle<MathResult> {
        self.submit(MathRequest { operation, values }, priority)
    }

    pub fn submit_spectrum_analysis(
        &self,
        data: Vec<f64>,
        operation: SpectrumOperation,
        priority: Priority,
    ) -> TaskHandle<SpectrumResult> {
        self.submit(
            SpectrumRequest {
                data,
                operation,
                options: Default::default(),
            },
            priority,
        )
    }

    /// Read-only snapshot. Never initializes; zeros before initialization.
    pub async fn status(&self) -> SchedulerStatus {
        let commands = match self.state.lock().as_ref() {
            Some(running) => running.commands.clone(),
            None => return SchedulerStatus::default(),
        };
        let (resp, rx) = oneshot::channel();
        if commands.send(DispatchCommand::Status { resp }).is_err() {
            return SchedulerStatus::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Stop every worker and reject every pending future with `Disposed`.
    ///
    /// Returns immediately; the teardown finishes on the dispatch loop. A
    /// later submission starts a fresh scheduler.
    pub fn dispose(&self) {
        if let Some(running) = self.state.lock().take() {
            let _ = running.commands.send(DispatchCommand::Shutdown { resp: None });
            info!("scheduler dispose requested");
        }
    }

    /// Like [`Manager::dispose`], but waits until the teardown is complete.
    pub async fn dispose_and_join(&self) {
        let Some(running) = self.state.lock().take() else {
            return;
        };
        let (resp, done) = oneshot::channel();
        if running
            .commands
            .send(DispatchCommand::Shutdown { resp: Some(resp) })
            .is_ok()
        {
            let _ = done.await;
        }
        let _ = running.dispatch_loop.await;
        info!("scheduler disposed");
    }
}
