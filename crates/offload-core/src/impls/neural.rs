//! NeuralFusion - fuse several signal channels into one.
//!
//! The handler loads a fusion model once, lazily, through a [`ModelLoader`].
//! Loading is retried under a bounded [`RetryPolicy`]; when every attempt
//! fails the handler switches to a reduced-capability mode (plain channel
//! mean) instead of failing, so callers still get an answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::retry::RetryPolicy;
use super::run_blocking;
use crate::domain::TaskCategory;
use crate::typed::{CategoryTask, Handler, HandlerError};

/// Confidence multiplier applied to answers produced without a model.
pub const FALLBACK_CONFIDENCE_SCALE: f64 = 0.5;

const NOISE_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralFusionInput {
    /// One vector per channel; all channels must have the same length.
    pub signals: Vec<Vec<f64>>,
}

impl CategoryTask for NeuralFusionInput {
    const CATEGORY: TaskCategory = TaskCategory::NeuralFusion;
    type Output = NeuralResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralResult {
    pub fused: Vec<f64>,
    pub confidence: f64,
    pub mode: InferenceMode,
}

/// Learned per-channel prior weights. Channels without an entry weigh 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionModel {
    pub prior_weights: Vec<f64>,
}

impl FusionModel {
    fn prior(&self, channel: usize) -> f64 {
        self.prior_weights.get(channel).copied().unwrap_or(1.0)
    }
}

/// Source of the fusion model (file, embedded weights, remote store, ...).
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<FusionModel, HandlerError>;
}

/// Loader that hands out a model already in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticModelLoader {
    model: FusionModel,
}

impl StaticModelLoader {
    pub fn new(model: FusionModel) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ModelLoader for StaticModelLoader {
    async fn load(&self) -> Result<FusionModel, HandlerError> {
        Ok(self.model.clone())
    }
}

pub struct NeuralFusionHandler {
    loader: Arc<dyn ModelLoader>,
    retry: RetryPolicy,
    model: Option<FusionModel>,
}

impl NeuralFusionHandler {
    pub fn new(loader: Arc<dyn ModelLoader>, retry: RetryPolicy) -> Self {
        Self {
            loader,
            retry,
            model: None,
        }
    }

    pub fn mode(&self) -> InferenceMode {
        if self.model.is_some() {
            InferenceMode::Model
        } else {
            InferenceMode::Fallback
        }
    }
}

#[async_trait]
impl Handler<NeuralFusionInput> for NeuralFusionHandler {
    async fn setup(&mut self) -> Result<(), HandlerError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.loader.load().await {
                Ok(model) => {
                    info!(attempt, "fusion model loaded");
                    self.model = Some(model);
                    return Ok(());
                }
                Err(e) if self.retry.allows_retry(attempt) => {
                    let delay = self.retry.next_delay(attempt);
                    warn!(attempt, error = %e, ?delay, "fusion model load failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        attempts = attempt,
                        error = %e,
                        "fusion model unavailable, answering in fallback mode"
                    );
                    self.model = None;
                    return Ok(());
                }
            }
        }
    }

    async fn handle(&mut self, input: NeuralFusionInput) -> Result<NeuralResult, HandlerError> {
        let model = self.model.clone();
        run_blocking(move || fuse(&input, model.as_ref())).await?
    }
}

/// Fuse `input` with `model`, or with the plain mean when `model` is `None`.
///
/// With a model, each channel weighs `prior / noise` where noise is the mean
/// squared first difference of the channel.
pub fn fuse(
    input: &NeuralFusionInput,
    model: Option<&FusionModel>,
) -> Result<NeuralResult, HandlerError> {
    let signals = &input.signals;
    let Some(first) = signals.first() else {
        return Err(HandlerError::InvalidInput("no signals".to_string()));
    };
    let len = first.len();
    if len == 0 {
        return Err(HandlerError::InvalidInput("signals are empty".to_string()));
    }
    if signals.iter().any(|s| s.len() != len) {
        return Err(HandlerError::InvalidInput(
            "signals must have equal length".to_string(),
        ));
    }

    let raw: Vec<f64> = match model {
        Some(model) => signals
            .iter()
            .enumerate()
            .map(|(k, s)| model.prior(k).max(0.0) / (first_difference_noise(s) + NOISE_FLOOR))
            .collect(),
        None => vec![1.0; signals.len()],
    };
    let total: f64 = raw.iter().sum();
    if !(total > 0.0) {
        return Err(HandlerError::Computation(
            "model assigns no weight to any channel".to_string(),
        ));
    }
    let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();

    let fused: Vec<f64> = (0..len)
        .map(|i| signals.iter().zip(&weights).map(|(s, w)| w * s[i]).sum())
        .collect();

    let dispersion = (0..len)
        .map(|i| {
            signals
                .iter()
                .zip(&weights)
                .map(|(s, w)| w * (s[i] - fused[i]).powi(2))
                .sum::<f64>()
        })
        .sum::<f64>()
        / len as f64;
    let agreement = 1.0 / (1.0 + dispersion);

    let (confidence, mode) = match model {
        Some(_) => (agreement, InferenceMode::Model),
        None => (agreement * FALLBACK_CONFIDENCE_SCALE, InferenceMode::Fallback),
    };
    Ok(NeuralResult {
        fused,
        confidence,
        mode,
    })
}

fn first_difference_noise(signal: &[f64]) -> f64 {
    if signal.len() < 2 {
        return 0.0;
    }
    signal.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum::<f64>() / (signal.len() - 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails `failures` times, then succeeds.
    struct FlakyLoader {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyLoader {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelLoader for FlakyLoader {
        async fn load(&self) -> Result<FusionModel, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(HandlerError::Setup(format!("model store offline (left={left})")));
            }
            Ok(FusionModel::default())
        }
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn setup_recovers_within_retry_budget() {
        let loader = Arc::new(FlakyLoader::new(2));
        let mut handler = NeuralFusionHandler::new(loader.clone(), quick_retry());

        handler.setup().await.unwrap();
        assert_eq!(handler.mode(), InferenceMode::Model);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn setup_falls_back_after_exhausting_attempts() {
        let loader = Arc::new(FlakyLoader::new(u32::MAX));
        let mut handler = NeuralFusionHandler::new(loader.clone(), quick_retry());

        handler.setup().await.unwrap();
        assert_eq!(handler.mode(), InferenceMode::Fallback);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 3);

        let result = handler
            .handle(NeuralFusionInput {
                signals: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            })
            .await
            .unwrap();
        assert_eq!(result.mode, InferenceMode::Fallback);
        assert_eq!(result.fused, vec![2.0, 3.0]);
        assert!(result.confidence <= FALLBACK_CONFIDENCE_SCALE);
    }

    #[test]
    fn model_prefers_the_smoother_channel() {
        let input = NeuralFusionInput {
            signals: vec![
                vec![1.0, 1.0, 1.0, 1.0],
                vec![0.0, 4.0, -4.0, 4.0],
            ],
        };
        let result = fuse(&input, Some(&FusionModel::default())).unwrap();

        assert_eq!(result.mode, InferenceMode::Model);
        for v in &result.fused {
            assert!((v - 1.0).abs() < 1e-6, "fused value {v} strays from the smooth channel");
        }
    }

    #[test]
    fn identical_channels_give_full_confidence() {
        let input = NeuralFusionInput {
            signals: vec![vec![0.5, 0.7], vec![0.5, 0.7]],
        };
        let result = fuse(&input, Some(&FusionModel::default())).unwrap();
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn ragged_or_empty_input_is_rejected() {
        let ragged = NeuralFusionInput {
            signals: vec![vec![1.0, 2.0], vec![1.0]],
        };
        assert!(matches!(fuse(&ragged, None), Err(HandlerError::InvalidInput(_))));

        let empty = NeuralFusionInput { signals: vec![] };
        assert!(fuse(&empty, None).is_err());
    }
}
