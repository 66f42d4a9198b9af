//! Lifecycle events broadcast by the pool

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConnectionId;

/// Why a connection was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Sat idle longer than `idle_timeout`
    IdleTimeout,
    /// Older than `max_lifetime`
    MaxLifetime,
    /// Failed a health check
    Unhealthy,
    /// Returned broken or already closed by the backend
    Broken,
    /// Returned or drained during shutdown
    Shutdown,
    /// Still in use when the shutdown grace period ran out
    Forced,
    /// Creation or validation was cut short before the connection was lent
    Abandoned,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::MaxLifetime => "max_lifetime",
            CloseReason::Unhealthy => "unhealthy",
            CloseReason::Broken => "broken",
            CloseReason::Shutdown => "shutdown",
            CloseReason::Forced => "forced",
            CloseReason::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Pool event for monitoring
///
/// Delivered through [`ConnectionPool::subscribe`](crate::ConnectionPool::subscribe).
/// Slow subscribers lose the oldest events; the pool never waits for them.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEvent {
    /// A backend connection was established
    Created { id: ConnectionId },
    /// A caller received a connection
    Acquired { id: ConnectionId, waited: Duration },
    /// A caller returned a connection
    Released { id: ConnectionId },
    /// A connection was closed
    Closed { id: ConnectionId, reason: CloseReason },
    /// A caller joined the wait queue
    Waiting { queue_len: usize },
    /// A queued caller gave up
    TimedOut { waited: Duration },
    /// A creation attempt failed
    CreateFailed { attempt: u32, error: String },
    /// Shutdown finished
    ShutDown { force_closed: usize },
}
