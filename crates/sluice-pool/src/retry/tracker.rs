//! Stateful retry gate for background connection creation

use std::time::Duration;

use tokio::time::Instant;

use super::BackoffStrategy;

/// Tracks consecutive creation failures and when the next attempt is allowed.
///
/// The reaper consults this before replenishing so a dead backend is not
/// hammered every cycle.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    backoff: BackoffStrategy,
    consecutive_failures: u32,
    next_attempt_at: Option<Instant>,
}

impl RetryTracker {
    pub fn new(backoff: BackoffStrategy) -> Self {
        Self {
            backoff,
            consecutive_failures: 0,
            next_attempt_at: None,
        }
    }

    /// Whether an attempt may be made at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.next_attempt_at.is_none_or(|at| now >= at)
    }

    /// Record a failed attempt and return the delay before the next one.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        let delay = self.backoff.calculate_delay(self.consecutive_failures);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.next_attempt_at = Some(now + delay);
        delay
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.next_attempt_at = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
