//! ManagerConfig - スケジューラ設定
//!
//! Defaults are usable as-is; `from_env` overrides them from `OFFLOAD_*`
//! variables (a `.env` file is honoured).

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::TaskCategory;

/// Upper bound on the total worker count regardless of hardware.
pub const DEFAULT_MAX_POOL_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Reported hardware parallelism. `None` asks the OS.
    pub hardware_parallelism: Option<usize>,

    pub max_pool_size: usize,

    /// Explicit general pool size; bypasses the parallelism formula.
    pub general_workers: Option<usize>,

    /// Model load attempts for the neural worker before falling back.
    pub neural_setup_attempts: u32,

    pub neural_setup_delay_ms: u64,

    /// Fail dispatched tasks that have not settled after this long.
    pub task_timeout_ms: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            hardware_parallelism: None,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            general_workers: None,
            neural_setup_attempts: 3,
            neural_setup_delay_ms: 500,
            task_timeout_ms: None,
        }
    }
}

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl ManagerConfig {
    /// Build config from the process environment (after loading `.env`).
    pub fn from_env() -> Self {
        load_dotenv();
        Self::from_lookup(env_opt)
    }

    /// Build config from an arbitrary key lookup. Unparsable values keep the
    /// default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            hardware_parallelism: parsed(&lookup, "OFFLOAD_PARALLELISM"),
            max_pool_size: parsed(&lookup, "OFFLOAD_MAX_POOL_SIZE")
                .unwrap_or(defaults.max_pool_size),
            general_workers: parsed(&lookup, "OFFLOAD_GENERAL_WORKERS"),
            neural_setup_attempts: parsed(&lookup, "OFFLOAD_NEURAL_SETUP_ATTEMPTS")
                .unwrap_or(defaults.neural_setup_attempts),
            neural_setup_delay_ms: parsed(&lookup, "OFFLOAD_NEURAL_SETUP_DELAY_MS")
                .unwrap_or(defaults.neural_setup_delay_ms),
            task_timeout_ms: parsed(&lookup, "OFFLOAD_TASK_TIMEOUT_MS"),
        }
    }

    pub fn with_general_workers(mut self, count: usize) -> Self {
        self.general_workers = Some(count);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.hardware_parallelism = Some(parallelism);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn effective_parallelism(&self) -> usize {
        self.hardware_parallelism.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    /// clamp(parallelism, 1, max_pool_size) - dedicated count, saturating at 0.
    pub fn general_pool_size(&self) -> usize {
        if let Some(n) = self.general_workers {
            return n;
        }
        let ceiling = self.max_pool_size.max(1);
        self.effective_parallelism()
            .clamp(1, ceiling)
            .saturating_sub(TaskCategory::DEDICATED.len())
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}
