//! offload-core
//!
//! Background task scheduling and worker-pool coordination.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, category, priority, task, envelope, state, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator）
//! - **typed**: 型付き Task API（CategoryTask, Handler, ExecutorRegistry）
//! - **impls**: 組み込み executor（neural, temporal, math, spectrum）
//! - **app**: Manager, Dispatcher, WorkerPool, CompletionRegistry
//! - **observability**: tracing の初期化
//!
//! ```ignore
//! let manager = Manager::new(ManagerConfig::from_env());
//! let result = manager
//!     .submit_math_operation(MathOperation::Variance, MathValues::Series(data), Priority::High)
//!     .await?;
//! ```

pub mod app;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use app::{Manager, ManagerBuilder, ManagerConfig, SchedulerStatus, TaskHandle};
pub use domain::{ErrorKind, Priority, SchedulerError, TaskCategory};
