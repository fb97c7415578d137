//! PriorityQueue - dispatcher 専用の優先度キュー
//!
//! Owned exclusively by the dispatch loop, so no locking.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::domain::{Priority, Task};

/// Heap entry.
///
/// Higher priority first; within a priority the lower submission sequence
/// wins, which keeps equal priorities FIFO.
#[derive(Debug)]
struct QueuedTask {
    priority: Priority,
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // Reverse ordering: earlier submissions first
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedTask {
            priority: task.priority(),
            seq,
            task,
        });
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every queued task, highest priority first.
    pub fn drain_all(&mut self) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(self.heap.len());
        while let Some(task) = self.pop() {
            tasks.push(task);
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TaskCategory, TaskId};
    use serde_json::json;
    use ulid::Ulid;

    fn task(label: &str, priority: Priority) -> Task {
        Task::new(
            TaskId::from_ulid(Ulid::new()),
            TaskCategory::MathOps,
            priority,
            json!(label),
        )
    }

    fn labels(queue: &mut PriorityQueue) -> Vec<String> {
        queue
            .drain_all()
            .into_iter()
            .map(|t| t.payload().as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn higher_priority_pops_first() {
        let mut queue = PriorityQueue::new();
        queue.push(task("A", Priority::Low));
        queue.push(task("B", Priority::High));
        queue.push(task("C", Priority::Medium));

        assert_eq!(labels(&mut queue), vec!["B", "C", "A"]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut queue = PriorityQueue::new();
        for label in ["D", "E", "F", "G"] {
            queue.push(task(label, Priority::Medium));
        }
        queue.push(task("H", Priority::High));

        assert_eq!(labels(&mut queue), vec!["H", "D", "E", "F", "G"]);
        assert!(queue.is_empty());
    }
}
