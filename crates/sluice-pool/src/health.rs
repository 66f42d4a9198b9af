//! Health checking for pooled connections
//!
//! Wraps the factory's validation capability with a timeout and latency
//! classification. The pool runs it before handing out an idle connection
//! and retires anything classified `Unhealthy`.
//!
//! # Example
//!
//! ```ignore
//! use sluice_pool::health::{check_connection, HealthThresholds};
//!
//! let thresholds = HealthThresholds::new(250, 5_000);
//! let result = check_connection(&factory, &*conn, thresholds.limit(), &thresholds).await;
//! println!("Status: {:?}, Latency: {:?}", result.status, result.latency);
//! ```

mod check;
mod status;


pub use check::{HealthCheckResult, check_connection};
pub use status::{HealthStatus, HealthThresholds};
