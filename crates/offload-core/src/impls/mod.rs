//! Impls - 組み込み executor
//!
//! One handler per category plus the shared retry policy. The pure functions
//! (`math::evaluate`, `spectrum::transform`, ...) are public so a caller whose
//! future was rejected can compute the same answer synchronously.

pub mod math;
pub mod neural;
pub mod retry;
pub mod spectrum;
pub mod temporal;

use std::sync::Arc;
use std::time::Duration;

use crate::app::ManagerConfig;
use crate::typed::{ExecutorRegistry, HandlerError};

pub use self::math::{MathHandler, MathOperation, MathRequest, MathResult, MathValue, MathValues};
pub use self::neural::{
    FusionModel, InferenceMode, ModelLoader, NeuralFusionHandler, NeuralFusionInput, NeuralResult,
    StaticModelLoader,
};
pub use self::retry::RetryPolicy;
pub use self::spectrum::{
    SpectrumHandler, SpectrumOperation, SpectrumOptions, SpectrumRequest, SpectrumResult,
};
pub use self::temporal::{
    TemporalCalculation, TemporalConstants, TemporalHandler, TemporalInput, TemporalResult,
};

/// Run CPU-bound work on the blocking pool so worker tasks keep yielding.
///
/// A panic inside `f` comes back as a `Computation` error.
pub(crate) async fn run_blocking<F, R>(f: F) -> Result<R, HandlerError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HandlerError::Computation(format!("blocking task aborted: {e}")))
}

/// Register the built-in executors for every category that has none yet.
pub fn register_defaults(registry: &mut ExecutorRegistry, config: &ManagerConfig) {
    let retry = RetryPolicy::fixed(
        config.neural_setup_attempts,
        Duration::from_millis(config.neural_setup_delay_ms),
    );
    let loader: Arc<dyn ModelLoader> = Arc::new(StaticModelLoader::default());

    // 登録済みのカテゴリは上書きしない
    let _ = registry.register::<NeuralFusionInput, _, _>(move || {
        NeuralFusionHandler::new(loader.clone(), retry.clone())
    });
    let _ = registry.register::<TemporalCalculation, _, _>(|| TemporalHandler);
    let _ = registry.register::<MathRequest, _, _>(|| MathHandler);
    let _ = registry.register::<SpectrumRequest, _, _>(|| SpectrumHandler);
}
