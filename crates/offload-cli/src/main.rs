use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use offload_core::impls::{
    MathOperation, MathRequest, MathValues, NeuralFusionInput, SpectrumOperation, SpectrumRequest,
    SpectrumOptions, TemporalCalculation, TemporalConstants, TemporalInput, math, neural,
    spectrum, temporal,
};
use offload_core::observability::init_tracing;
use offload_core::typed::HandlerError;
use offload_core::{Manager, ManagerConfig, Priority, TaskHandle};

/// Run a batch of computations through the scheduler and print the results.
#[derive(Debug, Parser)]
#[command(name = "offload", version)]
struct Args {
    /// Override the detected hardware parallelism
    #[arg(long)]
    parallelism: Option<usize>,

    /// Explicit general pool size
    #[arg(long)]
    general_workers: Option<usize>,

    /// Fail tasks that take longer than this
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(Debug, Serialize)]
struct Report {
    variance: math::MathResult,
    correlation: math::MathResult,
    fft: math::MathResult,
    statistics: math::MathResult,
    smoothed: spectrum::SpectrumResult,
    projection: temporal::TemporalResult,
    fused: neural::NeuralResult,
}

/// Await the scheduler; on any rejection compute the answer in place.
async fn or_fallback<T>(
    what: &str,
    handle: TaskHandle<T>,
    fallback: impl FnOnce() -> Result<T, HandlerError>,
) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    match handle.await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(task = what, error = %e, "scheduler rejected task, computing synchronously");
            fallback().with_context(|| format!("{what} failed synchronously too"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log);

    let mut config = ManagerConfig::from_env();
    if let Some(parallelism) = args.parallelism {
        config = config.with_parallelism(parallelism);
    }
    if let Some(general) = args.general_workers {
        config = config.with_general_workers(general);
    }
    if let Some(ms) = args.timeout_ms {
        config.task_timeout_ms = Some(ms);
    }

    let manager = Manager::new(config);
    manager.initialize().context("failed to start scheduler")?;
    info!(
        parallelism = manager.config().effective_parallelism(),
        general_workers = manager.config().general_pool_size(),
        "scheduler ready"
    );

    let signal: Vec<f64> = (0..32).map(|i| (i as f64 * 0.4).sin()).collect();
    let echo: Vec<f64> = signal.iter().map(|v| v * 0.8 + 0.1).collect();

    let variance_req = MathRequest {
        operation: MathOperation::Variance,
        values: MathValues::Series(signal.clone()),
    };
    let correlation_req = MathRequest {
        operation: MathOperation::Correlation,
        values: MathValues::Pair {
            arr1: signal.clone(),
            arr2: echo.clone(),
        },
    };
    let fft_req = MathRequest {
        operation: MathOperation::Fft,
        values: MathValues::Series(signal.clone()),
    };
    let stats_req = MathRequest {
        operation: MathOperation::Statistics,
        values: MathValues::Series(signal.clone()),
    };
    let smooth_req = SpectrumRequest {
        data: signal.clone(),
        operation: SpectrumOperation::Smooth,
        options: SpectrumOptions::default(),
    };
    let temporal_req = TemporalCalculation {
        input: TemporalInput {
            samples: signal.clone(),
        },
        constants: TemporalConstants::default(),
    };
    let neural_req = NeuralFusionInput {
        signals: vec![signal.clone(), echo.clone()],
    };

    // 全部先に投げてから await する
    let variance = manager.submit(variance_req.clone(), Priority::High);
    let correlation = manager.submit(correlation_req.clone(), Priority::High);
    let fft = manager.submit(fft_req.clone(), Priority::Medium);
    let statistics = manager.submit(stats_req.clone(), Priority::Low);
    let smoothed = manager.submit(smooth_req.clone(), Priority::Medium);
    let projection = manager.submit(temporal_req.clone(), Priority::Medium);
    let fused = manager.submit(neural_req.clone(), Priority::Low);

    let report = Report {
        variance: or_fallback("variance", variance, || math::evaluate(&variance_req)).await?,
        correlation: or_fallback("correlation", correlation, || {
            math::evaluate(&correlation_req)
        })
        .await?,
        fft: or_fallback("fft", fft, || math::evaluate(&fft_req)).await?,
        statistics: or_fallback("statistics", statistics, || math::evaluate(&stats_req)).await?,
        smoothed: or_fallback("smooth", smoothed, || spectrum::transform(&smooth_req)).await?,
        projection: or_fallback("projection", projection, || {
            temporal::simulate(&temporal_req)
        })
        .await?,
        fused: or_fallback("fusion", fused, || neural::fuse(&neural_req, None)).await?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    let status = manager.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    manager.dispose_and_join().await;
    info!("done");
    Ok(())
}
