//! TemporalCalc - damped extrapolation of a sampled signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::run_blocking;
use crate::domain::TaskCategory;
use crate::typed::{CategoryTask, Handler, HandlerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalInput {
    pub samples: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalConstants {
    /// Seconds between two samples (and between two projected points).
    pub time_step: f64,
    /// Fraction of velocity lost per step, in `[0, 1]`.
    pub damping: f64,
    /// Number of points to project.
    pub horizon: usize,
}

impl Default for TemporalConstants {
    fn default() -> Self {
        Self {
            time_step: 1.0,
            damping: 0.1,
            horizon: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalCalculation {
    pub input: TemporalInput,
    pub constants: TemporalConstants,
}

impl CategoryTask for TemporalCalculation {
    const CATEGORY: TaskCategory = TaskCategory::TemporalCalc;
    type Output = TemporalResult;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalResult {
    pub projected: Vec<f64>,
    pub initial_velocity: f64,
    pub mean_energy: f64,
}

#[derive(Debug, Default)]
pub struct TemporalHandler;

#[async_trait]
impl Handler<TemporalCalculation> for TemporalHandler {
    async fn handle(
        &mut self,
        calculation: TemporalCalculation,
    ) -> Result<TemporalResult, HandlerError> {
        run_blocking(move || simulate(&calculation)).await?
    }
}

/// Project the series forward from its last sample.
///
/// The starting velocity is the last finite difference; every step loses
/// `damping` of it.
pub fn simulate(calculation: &TemporalCalculation) -> Result<TemporalResult, HandlerError> {
    let samples = &calculation.input.samples;
    let TemporalConstants {
        time_step,
        damping,
        horizon,
    } = calculation.constants;

    let Some(&last) = samples.last() else {
        return Err(HandlerError::InvalidInput("no samples".to_string()));
    };
    if !(time_step > 0.0) {
        return Err(HandlerError::InvalidInput(
            "time_step must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&damping) {
        return Err(HandlerError::InvalidInput(
            "damping must be within [0, 1]".to_string(),
        ));
    }

    let initial_velocity = match samples.len() {
        0 | 1 => 0.0,
        n => (samples[n - 1] - samples[n - 2]) / time_step,
    };
    let mean_energy = samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64;

    let mut projected = Vec::with_capacity(horizon);
    let mut position = last;
    let mut velocity = initial_velocity;
    for _ in 0..horizon {
        velocity *= 1.0 - damping;
        position += velocity * time_step;
        projected.push(position);
    }

    Ok(TemporalResult {
        projected,
        initial_velocity,
        mean_energy,
    })
}
