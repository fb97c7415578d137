//! Retry policy for one-time executor setup.

use std::time::Duration;

/// Bounded retry with backoff.
///
/// `multiplier == 1.0` gives a fixed delay between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Backoff multiplier applied per further failure.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after the `attempts`-th failure (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// A negative or NaN product waits zero; an overflowing one saturates at
    /// `Duration::MAX`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if delay_secs.is_nan() || delay_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }

    /// Whether another attempt is allowed after `attempts` failures.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(500))
    }
}
