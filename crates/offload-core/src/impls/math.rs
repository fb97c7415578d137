//! MathOps - generic numeric operations.
//!
//! [`evaluate`] is the pure computation; [`MathHandler`] runs it off the async
//! threads. Callers that fall back to synchronous execution call `evaluate`
//! directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::run_blocking;
use crate::domain::TaskCategory;
use crate::typed::{CategoryTask, Handler, HandlerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOperation {
    Variance,
    Correlation,
    Fft,
    Statistics,
}

/// Either a single series or a pair of series (`{arr1, arr2}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MathValues {
    Series(Vec<f64>),
    Pair { arr1: Vec<f64>, arr2: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathRequest {
    pub operation: MathOperation,
    pub values: MathValues,
}

impl CategoryTask for MathRequest {
    const CATEGORY: TaskCategory = TaskCategory::MathOps;
    type Output = MathResult;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MathValue {
    Scalar(f64),
    Series(Vec<f64>),
    Summary(Statistics),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MathResult {
    pub operation: MathOperation,
    pub value: MathValue,
}

impl MathResult {
    pub fn as_scalar(&self) -> Option<f64> {
        match self.value {
            MathValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

/// Stateless; no setup needed.
#[derive(Debug, Default)]
pub struct MathHandler;

#[async_trait]
impl Handler<MathRequest> for MathHandler {
    async fn handle(&mut self, request: MathRequest) -> Result<MathResult, HandlerError> {
        run_blocking(move || evaluate(&request)).await?
    }
}

pub fn evaluate(request: &MathRequest) -> Result<MathResult, HandlerError> {
    let value = match (request.operation, &request.values) {
        (MathOperation::Variance, MathValues::Series(values)) => {
            MathValue::Scalar(variance(values)?)
        }
        (MathOperation::Correlation, MathValues::Pair { arr1, arr2 }) => {
            MathValue::Scalar(correlation(arr1, arr2)?)
        }
        (MathOperation::Fft, MathValues::Series(values)) => {
            MathValue::Series(fft_magnitudes(values)?)
        }
        (MathOperation::Statistics, MathValues::Series(values)) => {
            MathValue::Summary(statistics(values)?)
        }
        (op, _) => {
            return Err(HandlerError::InvalidInput(format!(
                "{op:?} does not accept this value shape"
            )));
        }
    };
    Ok(MathResult {
        operation: request.operation,
        value,
    })
}

fn require_non_empty(values: &[f64]) -> Result<(), HandlerError> {
    if values.is_empty() {
        return Err(HandlerError::InvalidInput("empty series".to_string()));
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> Result<f64, HandlerError> {
    require_non_empty(values)?;
    let m = mean(values);
    Ok(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Pearson correlation coefficient.
pub fn correlation(a: &[f64], b: &[f64]) -> Result<f64, HandlerError> {
    if a.len() != b.len() {
        return Err(HandlerError::InvalidInput(format!(
            "series lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    if a.len() < 2 {
        return Err(HandlerError::InvalidInput(
            "correlation needs at least two points".to_string(),
        ));
    }
    let (ma, mb) = (mean(a), mean(b));
    let mut cov = 0.0;
    let mut saa = 0.0;
    let mut sbb = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (dx, dy) = (x - ma, y - mb);
        cov += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }
    if saa == 0.0 || sbb == 0.0 {
        return Err(HandlerError::InvalidInput(
            "correlation is undefined for a constant series".to_string(),
        ));
    }
    // sqrt of the product keeps perfect correlation exactly 1.0
    Ok(cov / (saa * sbb).sqrt())
}

/// Magnitude spectrum of the first half of an in-place radix-2 FFT.
///
/// The input is zero-padded to the next power of two.
pub fn fft_magnitudes(values: &[f64]) -> Result<Vec<f64>, HandlerError> {
    require_non_empty(values)?;
    let n = values.len().next_power_of_two();
    let mut re: Vec<f64> = values.to_vec();
    re.resize(n, 0.0);
    let mut im = vec![0.0; n];

    // bit reversal
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * std::f64::consts::PI / len as f64;
        let (w_re, w_im) = (angle.cos(), angle.sin());
        for start in (0..n).step_by(len) {
            let (mut cur_re, mut cur_im) = (1.0, 0.0);
            for k in 0..len / 2 {
                let (a, b) = (start + k, start + k + len / 2);
                let t_re = re[b] * cur_re - im[b] * cur_im;
                let t_im = re[b] * cur_im + im[b] * cur_re;
                re[b] = re[a] - t_re;
                im[b] = im[a] - t_im;
                re[a] += t_re;
                im[a] += t_im;
                let next_re = cur_re * w_re - cur_im * w_im;
                cur_im = cur_re * w_im + cur_im * w_re;
                cur_re = next_re;
            }
        }
        len <<= 1;
    }

    let half = (n / 2).max(1);
    Ok((0..half).map(|k| re[k].hypot(im[k])).collect())
}

pub fn statistics(values: &[f64]) -> Result<Statistics, HandlerError> {
    require_non_empty(values)?;
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let count = sorted.len();
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };
    Ok(Statistics {
        count,
        mean: mean(values),
        median,
        std_dev: variance(values)?.sqrt(),
        min: sorted[0],
        max: sorted[count - 1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn population_variance_of_one_to_five() {
        assert_eq!(variance(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap(), 2.0);
    }

    #[rstest]
    #[case::identical(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0], 1.0)]
    #[case::inverse(vec![1.0, 2.0, 3.0], vec![3.0, 2.0, 1.0], -1.0)]
    #[case::scaled(vec![1.0, 2.0, 3.0, 4.0], vec![10.0, 20.0, 30.0, 40.0], 1.0)]
    fn pearson_correlation(#[case] a: Vec<f64>, #[case] b: Vec<f64>, #[case] expected: f64) {
        assert!(approx(correlation(&a, &b).unwrap(), expected));
    }

    #[test]
    fn correlation_rejects_mismatched_or_constant_series() {
        assert!(correlation(&[1.0, 2.0], &[1.0]).is_err());
        assert!(correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn fft_of_constant_signal_is_dc_only() {
        let mags = fft_magnitudes(&[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(mags.len(), 2);
        assert!(approx(mags[0], 4.0));
        assert!(approx(mags[1], 0.0));
    }

    #[test]
    fn fft_finds_alternating_frequency() {
        // period-2 signal: all energy at bin n/2, bin 1 stays empty
        let mags = fft_magnitudes(&[1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]).unwrap();
        assert_eq!(mags.len(), 4);
        assert!(mags.iter().all(|m| approx(*m, 0.0)));
    }

    #[test]
    fn statistics_summary() {
        let stats = statistics(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert!(approx(stats.mean, 2.5));
        assert!(approx(stats.median, 2.5));
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert!(approx(stats.std_dev, 1.25f64.sqrt()));
    }

    #[test]
    fn operation_and_shape_must_agree() {
        let request = MathRequest {
            operation: MathOperation::Correlation,
            values: MathValues::Series(vec![1.0, 2.0]),
        };
        assert!(matches!(evaluate(&request), Err(HandlerError::InvalidInput(_))));
    }

    #[test]
    fn request_accepts_pair_json() {
        let request: MathRequest = serde_json::from_value(json!({
            "operation": "correlation",
            "values": { "arr1": [1.0, 2.0, 3.0], "arr2": [1.0, 2.0, 3.0] }
        }))
        .unwrap();
        let result = evaluate(&request).unwrap();
        assert_eq!(result.as_scalar(), Some(1.0));
    }

    #[tokio::test]
    async fn handler_runs_off_thread() {
        let mut handler = MathHandler;
        let result = handler
            .handle(MathRequest {
                operation: MathOperation::Variance,
                values: MathValues::Series(vec![1.0, 2.0, 3.0, 4.0, 5.0]),
            })
            .await
            .unwrap();
        assert_eq!(result.as_scalar(), Some(2.0));
    }
}
