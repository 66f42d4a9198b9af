//! Connection pooling
//!
//! [`ConnectionPool`] lends out connections produced by a
//! [`ConnectionFactory`], bounded by `max_pool_size`. Callers that find the
//! pool saturated queue in FIFO order until a connection is returned or a
//! slot frees up. A background reaper retires connections that sat idle
//! too long or outlived `max_lifetime`, and keeps `min_idle` connections
//! ready.
//!
//! # Example
//!
//! ```ignore
//! use sluice_pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(2, 10).with_connection_timeout_ms(5_000);
//! let pool = ConnectionPool::new(config, MyFactory::new(options))?;
//!
//! let conn = pool.acquire().await?;
//! conn.ping().await?;
//! pool.release(conn).await?;
//!
//! pool.shutdown().await;
//! ```

mod config;
mod events;
mod factory;
mod pool;
mod reaper;
mod state;
mod stats;

#[cfg(test)]
pub(crate) mod mock;

pub use config::PoolConfig;
pub use events::{CloseReason, PoolEvent};
pub use factory::ConnectionFactory;
pub use pool::{ConnectionPool, PooledConnection, ShutdownReport};
pub use state::{ConnectionId, ConnectionInfo, ConnectionState};
pub use stats::PoolStats;
