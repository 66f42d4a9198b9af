//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Cumulative counters kept alongside the pool's bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Counters {
    pub created: u64,
    pub closed: u64,
    pub acquired: u64,
    pub timed_out: u64,
    pub create_failures: u64,
}

/// Snapshot of a connection pool's current state
///
/// Gauges (`idle`, `active`, ...) describe the moment the snapshot was
/// taken; counters (`created`, `closed`, ...) accumulate over the pool's
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Idle connections available in the pool
    idle: usize,
    /// Connections currently lent to callers
    active: usize,
    /// Slots reserved for connections being established
    pending: usize,
    /// Callers queued for a connection
    waiting: usize,
    /// Configured hard cap
    max_size: usize,
    #[serde(flatten)]
    counters: Counters,
}

impl PoolStats {
    pub(crate) fn new(
        idle: usize,
        active: usize,
        pending: usize,
        waiting: usize,
        max_size: usize,
        counters: Counters,
    ) -> Self {
        Self {
            idle,
            active,
            pending,
            waiting,
            max_size,
            counters,
        }
    }

    /// Open connections (idle + active)
    pub fn total(&self) -> usize {
        self.idle + self.active
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Connections established over the pool's lifetime
    pub fn created(&self) -> u64 {
        self.counters.created
    }

    /// Connections closed over the pool's lifetime
    pub fn closed(&self) -> u64 {
        self.counters.closed
    }

    /// Successful acquisitions
    pub fn acquired(&self) -> u64 {
        self.counters.acquired
    }

    /// Acquisitions that ended in `PoolExhausted`
    pub fn timed_out(&self) -> u64 {
        self.counters.timed_out
    }

    /// Failed creation attempts, including retried ones
    pub fn create_failures(&self) -> u64 {
        self.counters.create_failures
    }

    /// Fraction of the size cap lent out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.active as f64 / self.max_size as f64
        }
    }

    /// Whether every slot is taken and nothing is idle
    pub fn is_full(&self) -> bool {
        self.idle == 0 && self.active + self.pending >= self.max_size && self.max_size > 0
    }
}
