//! Domain model (IDs, categories, tasks, envelopes, state, errors).

pub mod category;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod priority;
pub mod state;
pub mod task;

pub use category::{Route, TaskCategory};
pub use envelope::{FailureKind, ReplyError, WorkReply, WorkRequest};
pub use errors::{ErrorKind, SchedulerError};
pub use ids::{TaskId, WorkerId};
pub use priority::Priority;
pub use state::TaskState;
pub use task::Task;
