//! TaskCategory - which kind of computation a task needs, and where it runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed enumeration of task categories.
///
/// The category alone determines routing (see [`TaskCategory::route`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Machine-learning style fusion of several input signals.
    NeuralFusion,
    /// Numeric time-stepped simulation.
    TemporalCalc,
    /// Generic math (variance, correlation, FFT, statistics).
    MathOps,
    /// Array transforms over spectrum data.
    SpectrumAnalysis,
}

/// Where a category is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Always the single long-lived worker bound to this category.
    Dedicated,
    /// Any idle worker from the general pool.
    General,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 4] = [
        TaskCategory::NeuralFusion,
        TaskCategory::TemporalCalc,
        TaskCategory::MathOps,
        TaskCategory::SpectrumAnalysis,
    ];

    /// Categories that own a dedicated worker.
    pub const DEDICATED: [TaskCategory; 3] = [
        TaskCategory::NeuralFusion,
        TaskCategory::TemporalCalc,
        TaskCategory::MathOps,
    ];

    /// Static routing table. This is not configuration.
    pub fn route(self) -> Route {
        match self {
            TaskCategory::NeuralFusion | TaskCategory::TemporalCalc | TaskCategory::MathOps => {
                Route::Dedicated
            }
            TaskCategory::SpectrumAnalysis => Route::General,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::NeuralFusion => "neural_fusion",
            TaskCategory::TemporalCalc => "temporal_calc",
            TaskCategory::MathOps => "math_ops",
            TaskCategory::SpectrumAnalysis => "spectrum_analysis",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
