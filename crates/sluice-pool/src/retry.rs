//! Retry policy for connection creation
//!
//! Creation failures never surface on the first try: `acquire` retries
//! within its deadline and the reaper retries on later cycles, both
//! spacing attempts with exponential backoff.
//!
//! # Example
//!
//! ```
//! use sluice_pool::retry::{BackoffStrategy, RetryTracker};
//!
//! let backoff = BackoffStrategy::new(100, 30_000).with_jitter(true);
//! let tracker = RetryTracker::new(backoff);
//! assert_eq!(tracker.consecutive_failures(), 0);
//! ```

mod backoff;
mod tracker;


pub use backoff::BackoffStrategy;
pub use tracker::RetryTracker;
