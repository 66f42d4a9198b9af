//! Latency classification of validation round-trips

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of validating a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    /// Answered, but slower than the pool's slow threshold. Still lent out.
    Degraded,
    /// Failed, timed out, or answered after the limit. Retired.
    Unhealthy,
}

impl HealthStatus {
    /// Whether the pool may hand the connection to a caller.
    pub fn is_usable(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

/// When a validation round-trip counts as slow, and when it is too slow
/// to trust at all
///
/// The pool builds these from `slow_validation_ms` and
/// `validation_timeout_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    slow: Duration,
    limit: Duration,
}

impl HealthThresholds {
    /// `slow_ms` is capped at `limit_ms`.
    pub fn new(slow_ms: u64, limit_ms: u64) -> Self {
        Self {
            slow: Duration::from_millis(slow_ms.min(limit_ms)),
            limit: Duration::from_millis(limit_ms),
        }
    }

    pub fn slow(&self) -> Duration {
        self.slow
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Classify a round-trip that completed after `latency`.
    ///
    /// Both bounds are inclusive.
    pub fn classify(&self, latency: Duration) -> HealthStatus {
        if latency > self.limit {
            HealthStatus::Unhealthy
        } else if latency > self.slow {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
