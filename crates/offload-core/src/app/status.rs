//! Status - スケジューラの読み取り専用スナップショット

use serde::{Deserialize, Serialize};

/// Point-in-time view of the scheduler. All zeros before initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub initialized: bool,
    /// Live workers, dedicated plus general.
    pub active_workers: usize,
    /// Workers with at least one task outstanding.
    pub busy_workers: usize,
    pub queue_length: usize,
    /// Submitted tasks whose future has not settled yet.
    pub pending_futures: usize,
    pub settled_total: u64,
    /// Replies (or late timeouts) that found no pending future.
    pub orphaned_replies: u64,
}
