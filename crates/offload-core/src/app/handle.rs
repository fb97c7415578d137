//! TaskHandle - 呼び出し側が await する Future

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use super::registry::TaskOutcome;
use crate::domain::{SchedulerError, TaskId};

/// Resolves once with the typed result or a [`SchedulerError`].
///
/// Dropping the handle does not cancel the task; its result is discarded.
/// If the scheduler goes away first the handle resolves with
/// `SchedulerError::Disposed`.
#[must_use = "a TaskHandle does nothing unless awaited"]
#[derive(Debug)]
pub struct TaskHandle<T> {
    task_id: TaskId,
    receiver: oneshot::Receiver<TaskOutcome>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(task_id: TaskId, receiver: oneshot::Receiver<TaskOutcome>) -> Self {
        Self {
            task_id,
            receiver,
            _marker: PhantomData,
        }
    }

    /// A handle that resolves immediately with `err`.
    pub(crate) fn failed(task_id: TaskId, err: SchedulerError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(task_id, rx)
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }
}

impl<T: DeserializeOwned> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(_closed)) => Poll::Ready(Err(SchedulerError::Disposed)),
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome.and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| SchedulerError::Codec(format!("result decode: {e}")))
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    fn new_id() -> TaskId {
        TaskId::from_ulid(Ulid::new())
    }

    #[tokio::test]
    async fn decodes_typed_result() {
        let (tx, rx) = oneshot::channel();
        let handle: TaskHandle<Vec<f64>> = TaskHandle::new(new_id(), rx);
        tx.send(Ok(json!([1.0, 2.0]))).unwrap();

        assert_eq!(handle.await.unwrap(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn wrong_shape_is_a_codec_error() {
        let (tx, rx) = oneshot::channel();
        let handle: TaskHandle<f64> = TaskHandle::new(new_id(), rx);
        tx.send(Ok(json!("not a number"))).unwrap();

        assert!(matches!(handle.await, Err(SchedulerError::Codec(_))));
    }

    #[tokio::test]
    async fn dropped_sender_reads_as_disposed() {
        let (tx, rx) = oneshot::channel::<TaskOutcome>();
        let handle: TaskHandle<f64> = TaskHandle::new(new_id(), rx);
        drop(tx);

        assert!(matches!(handle.await, Err(SchedulerError::Disposed)));
    }

    #[tokio::test]
    async fn failed_handle_resolves_immediately() {
        let handle: TaskHandle<f64> =
            TaskHandle::failed(new_id(), SchedulerError::RuntimeUnavailable);
        assert!(matches!(handle.await, Err(SchedulerError::RuntimeUnavailable)));
    }
}
