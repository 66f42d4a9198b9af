//! Sluice Pool - Bounded connection pooling
//!
//! This crate lends out backend connections under a hard size cap, queues
//! callers fairly when the pool is saturated, validates idle connections
//! before reuse, and retires connections in the background once they sit
//! idle too long or reach their maximum lifetime.

mod error;
pub mod health;
pub mod pool;
pub mod retry;

pub use error::{PoolError, Result};
pub use health::{HealthCheckResult, HealthStatus, HealthThresholds, check_connection};
pub use pool::{
    CloseReason, ConnectionFactory, ConnectionId, ConnectionInfo, ConnectionPool, ConnectionState,
    PoolConfig, PoolEvent, PoolStats, PooledConnection, ShutdownReport,
};
pub use retry::{BackoffStrategy, RetryTracker};
