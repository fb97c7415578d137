//! SpectrumAnalysis - array transforms run on the general pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::run_blocking;
use crate::domain::TaskCategory;
use crate::typed::{CategoryTask, Handler, HandlerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumOperation {
    Downsample,
    Smooth,
    Normalize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumOptions {
    /// Bucket size for `Downsample`.
    pub factor: usize,
    /// Moving-average width for `Smooth`.
    pub window: usize,
}

impl Default for SpectrumOptions {
    fn default() -> Self {
        Self {
            factor: 2,
            window: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRequest {
    pub data: Vec<f64>,
    pub operation: SpectrumOperation,
    #[serde(default)]
    pub options: SpectrumOptions,
}

impl CategoryTask for SpectrumRequest {
    const CATEGORY: TaskCategory = TaskCategory::SpectrumAnalysis;
    type Output = SpectrumResult;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumResult {
    pub data: Vec<f64>,
    pub operation: SpectrumOperation,
    pub original_len: usize,
}

#[derive(Debug, Default)]
pub struct SpectrumHandler;

#[async_trait]
impl Handler<SpectrumRequest> for SpectrumHandler {
    async fn handle(&mut self, request: SpectrumRequest) -> Result<SpectrumResult, HandlerError> {
        run_blocking(move || transform(&request)).await?
    }
}

pub fn transform(request: &SpectrumRequest) -> Result<SpectrumResult, HandlerError> {
    let data = match request.operation {
        SpectrumOperation::Downsample => downsample(&request.data, request.options.factor)?,
        SpectrumOperation::Smooth => smooth(&request.data, request.options.window)?,
        SpectrumOperation::Normalize => normalize(&request.data),
    };
    Ok(SpectrumResult {
        data,
        operation: request.operation,
        original_len: request.data.len(),
    })
}

/// Average consecutive buckets of `factor` samples; a trailing partial
/// bucket is averaged on its own.
pub fn downsample(data: &[f64], factor: usize) -> Result<Vec<f64>, HandlerError> {
    if factor == 0 {
        return Err(HandlerError::InvalidInput(
            "downsample factor must be positive".to_string(),
        ));
    }
    Ok(data
        .chunks(factor)
        .map(|bucket| bucket.iter().sum::<f64>() / bucket.len() as f64)
        .collect())
}

/// Centred moving average; the window is clipped at both edges.
pub fn smooth(data: &[f64], window: usize) -> Result<Vec<f64>, HandlerError> {
    if window == 0 {
        return Err(HandlerError::InvalidInput(
            "smoothing window must be positive".to_string(),
        ));
    }
    let half = window / 2;
    Ok((0..data.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = i.saturating_add(window - half).min(data.len());
            let slice = &data[lo..hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect())
}

/// Min-max scaling into `[0, 1]`. A constant series maps to zeros.
pub fn normalize(data: &[f64]) -> Vec<f64> {
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range == 0.0 {
        return vec![0.0; data.len()];
    }
    data.iter().map(|v| (v - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn downsample_averages_buckets() {
        let out = downsample(&[1.0, 3.0, 5.0, 7.0, 9.0], 2).unwrap();
        assert_eq!(out, vec![2.0, 6.0, 9.0]);
        assert!(downsample(&[1.0], 0).is_err());
    }

    #[test]
    fn smooth_clips_window_at_edges() {
        let out = smooth(&[0.0, 3.0, 6.0, 9.0], 3).unwrap();
        assert_eq!(out, vec![1.5, 3.0, 6.0, 7.5]);
    }

    #[test]
    fn smooth_window_of_one_is_identity() {
        let data = vec![2.0, 4.0, 8.0];
        assert_eq!(smooth(&data, 1).unwrap(), data);
    }

    #[rstest]
    #[case::wider_than_data(5)]
    #[case::huge(usize::MAX)]
    fn oversized_window_averages_everything(#[case] window: usize) {
        let out = smooth(&[1.0, 2.0], window).unwrap();
        assert_eq!(out, vec![1.5, 1.5]);

        let request = SpectrumRequest {
            data: vec![1.0, 2.0],
            operation: SpectrumOperation::Smooth,
            options: SpectrumOptions { factor: 2, window },
        };
        assert_eq!(transform(&request).unwrap().data, vec![1.5, 1.5]);
    }

    #[test]
    fn normalize_scales_into_unit_range() {
        assert_eq!(normalize(&[2.0, 4.0, 6.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(normalize(&[5.0, 5.0]), vec![0.0, 0.0]);
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn options_default_when_omitted() {
        let request: SpectrumRequest = serde_json::from_value(json!({
            "data": [1.0, 2.0, 3.0, 4.0],
            "operation": "downsample"
        }))
        .unwrap();
        assert_eq!(request.options, SpectrumOptions::default());

        let result = transform(&request).unwrap();
        assert_eq!(result.data, vec![1.5, 3.5]);
        assert_eq!(result.original_len, 4);
    }
}
