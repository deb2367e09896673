//! Exponential backoff with jitter for failed operations.

use chrono::Duration;
use rand::Rng;

use crate::config::QueueConfig;

/// Retry delay policy.
///
/// The delay after the `n`th failed attempt (counting from 0) is
/// `min(max, base * 2^n)`, then moved by up to `jitter` of itself in either
/// direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base_seconds: f64,
    max_seconds: f64,
    jitter_factor: f64,
}

impl Backoff {
    #[must_use]
    pub const fn new(base_seconds: f64, max_seconds: f64, jitter_factor: f64) -> Self {
        Self {
            base_seconds,
            max_seconds,
            jitter_factor,
        }
    }

    #[must_use]
    pub const fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.backoff_base_seconds,
            config.max_backoff_seconds,
            config.jitter_factor,
        )
    }

    /// Delay in seconds before jitter.
    #[must_use]
    pub fn base_delay_seconds(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt.min(60)).unwrap_or(60);
        (self.base_seconds * 2_f64.powi(exponent)).min(self.max_seconds)
    }

    /// Delay for `attempt` with a fixed jitter sample in `[-1, 1]`.
    #[must_use]
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.base_delay_seconds(attempt);
        let jittered = base * self.jitter_factor.mul_add(sample.clamp(-1.0, 1.0), 1.0);
        #[allow(clippy::cast_possible_truncation)]
        let millis = (jittered.max(0.0) * 1000.0).round() as i64;
        Duration::milliseconds(millis)
    }

    /// Delay for `attempt` with a uniformly drawn jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_sample(attempt, sample)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
