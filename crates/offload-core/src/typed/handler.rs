//! Handler trait - per-category execution contract
//!
//! # 二層構造
//! - **Typed**: `Handler<T>` receives a decoded `T` and returns `T::Output`
//! - **Dyn**: `DynExecutor` is object-safe and speaks `serde_json::Value`,
//!   so a worker can own `Box<dyn DynExecutor>` without knowing `T`

use std::marker::PhantomData;

use async_trait::async_trait;
use thiserror::Error;

use super::task::CategoryTask;
use crate::domain::TaskCategory;

/// Failure raised inside a worker. Never crosses the worker boundary as-is;
/// the worker turns it into a failure reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("computation failed: {0}")]
    Computation(String),

    #[error("setup failed: {0}")]
    Setup(String),
}

/// Handler executes one category's tasks.
///
/// A handler is owned by exactly one worker and is never shared, hence
/// `&mut self` and no `Sync` bound.
///
/// `setup` runs lazily before the first task. If it fails, the worker answers
/// that task with an initialization error and calls `setup` again on the next
/// one.
///
/// ```ignore
/// struct ResampleHandler;
///
/// #[async_trait]
/// impl Handler<Resample> for ResampleHandler {
///     async fn handle(&mut self, task: Resample) -> Result<Vec<f64>, HandlerError> {
///         Ok(task.data)
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: CategoryTask>: Send {
    async fn setup(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn handle(&mut self, task: T) -> Result<T::Output, HandlerError>;
}

/// Object-safe view of a `Handler<T>`.
#[async_trait]
pub trait DynExecutor: Send {
    fn category(&self) -> TaskCategory;

    async fn setup(&mut self) -> Result<(), HandlerError>;

    async fn execute(
        &mut self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// Type erasure: `Handler<T>` -> `DynExecutor`.
pub struct TypedExecutor<T: CategoryTask, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CategoryTask, H: Handler<T>> TypedExecutor<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: CategoryTask, H: Handler<T>> DynExecutor for TypedExecutor<T, H> {
    fn category(&self) -> TaskCategory {
        T::CATEGORY
    }

    async fn setup(&mut self) -> Result<(), HandlerError> {
        self.handler.setup().await
    }

    async fn execute(
        &mut self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, HandlerError> {
        let task: T = serde_json::from_value(payload)
            .map_err(|e| HandlerError::InvalidInput(format!("json decode: {e}")))?;
        let output = self.handler.handle(task).await?;
        serde_json::to_value(output)
            .map_err(|e| HandlerError::Computation(format!("json encode: {e}")))
    }
}
