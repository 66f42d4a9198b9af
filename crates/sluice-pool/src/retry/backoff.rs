//! Exponential backoff calculator for connection creation retries
//!
//! Implements exponential backoff with optional jitter, so a fleet of
//! pools reconnecting to a recovering backend does not retry in lockstep.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff strategy for connection creation retries.
///
/// # Example
///
/// ```
/// use sluice_pool::retry::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(100, 5_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(200));
///
/// // Delay grows exponentially but is capped at max
/// assert!(backoff.calculate_delay(20) <= Duration::from_millis(5_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffStrategy {
    /// Initial delay in milliseconds for the first retry
    initial_ms: u64,
    /// Maximum delay in milliseconds
    max_ms: u64,
    /// Multiplier for exponential growth
    multiplier: f64,
    /// Whether to add jitter to delays
    jitter: bool,
}

impl BackoffStrategy {
    /// Create a new backoff strategy with the given initial and maximum delays.
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial_ms = initial_ms.max(1);
        Self {
            initial_ms,
            max_ms: max_ms.max(initial_ms),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Set the multiplier for exponential growth (clamped to at least 1.0).
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Enable or disable ±25% jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay before retry number `attempt` (zero-based).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_ms as f64) * self.multiplier.powi(attempt.min(64) as i32);
        let capped_ms = delay_ms.min(self.max_ms as f64) as u64;

        let final_ms = if self.jitter {
            let jitter_range = capped_ms / 4;
            let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
            capped_ms.saturating_sub(jitter_range).saturating_add(offset)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter
    }
}

impl Default for BackoffStrategy {
    /// 100ms initial, 5 seconds max, 2x multiplier, no jitter
    fn default() -> Self {
        Self::new(100, 5_000)
    }
}
