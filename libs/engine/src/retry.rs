//! Retry backoff policy
//!
//! Exponential backoff with a cap and symmetric jitter to avoid thundering
//! herds against shared controllers (MaaS, BMCs).

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff policy applied between step attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Upper bound for any single delay
    pub max_interval: Duration,

    /// Backoff multiplier between consecutive retries
    pub multiplier: f64,

    /// Symmetric jitter factor; 0.2 means ±20%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Exponential backoff: 1 s base, 30 s cap, 2x growth, ±20% jitter
    #[must_use]
    pub fn exponential() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }

    /// Fixed-interval policy without jitter, used by fast tests
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Set the initial interval
    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Set the interval cap
    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Delay to sleep after the given failed attempt (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let base = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            capped * factor
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.max(0.0))
    }
}
