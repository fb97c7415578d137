//! Domain identifiers (strongly-typed IDs).
//!
//! IDs are ULID based (Universally Unique Lexicographically Sortable
//! Identifier) and share one generic implementation through a phantom marker.
//!
//! ## ULID の特性
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **衝突しない**: 調整なしでどのスレッドからでも生成できる
//! - **UUID互換**: 128-bit
//!
//! `Id<T>` keeps `TaskId` and `WorkerId` apart at compile time while costing
//! nothing at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait giving each ID type its display prefix.
pub trait IdMarker: Send + Sync + 'static {
    /// Display prefix (e.g. "task-", "worker-").
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
///
/// ```ignore
/// let task_id: TaskId = Id::from(Ulid::new());
/// let worker_id: WorkerId = Id::from(Ulid::new());
/// // task_id and worker_id are different types and cannot be mixed up
/// ```
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Worker のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// Identifier of a submitted task (one completion handle per id).
pub type TaskId = Id<Task>;

/// Identifier of a worker owned by the pool.
pub type WorkerId = Id<Worker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid1 = Ulid::new();
        let ulid2 = Ulid::new();

        let task = TaskId::from_ulid(ulid1);
        let worker = WorkerId::from_ulid(ulid2);

        assert_eq!(task.as_ulid(), ulid1);
        assert_eq!(worker.as_ulid(), ulid2);

        assert!(task.to_string().starts_with("task-"));
        assert!(worker.to_string().starts_with("worker-"));

        // let _: TaskId = worker; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn ids_serialize_as_plain_ulid() {
        let task_id = TaskId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&task_id).unwrap();
        assert_eq!(serialized, format!("\"{}\"", task_id.as_ulid()));

        let deserialized: TaskId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(task_id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;

        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<WorkerId>(), 16);
    }
}
