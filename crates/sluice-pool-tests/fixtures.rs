//! Shared fixtures: an instrumented in-memory backend and pool builders.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sluice_pool_tests::fixtures::{backend, TestBackend};
//! use rstest::rstest;
//!
//! #[rstest]
//! #[tokio::test(start_paused = true)]
//! async fn test_something(backend: Arc<TestBackend>) {
//!     let pool = backend.pool(PoolConfig::new(0, 2)).unwrap();
//!     let conn = pool.acquire().await.unwrap();
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rstest::fixture;
use sluice_core::{Connection, SluiceError};
use sluice_pool::{ConnectionFactory, ConnectionPool, PoolConfig};

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// A session on the test backend
#[derive(Debug)]
pub struct TestConnection {
    session: usize,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

impl TestConnection {
    /// Backend-side session number, starting at 1
    pub fn session(&self) -> usize {
        self.session
    }
}

#[async_trait]
impl Connection for TestConnection {
    fn backend_name(&self) -> &str {
        "test"
    }

    async fn ping(&self) -> sluice_core::Result<()> {
        if self.is_closed() {
            return Err(SluiceError::Connection("session closed".into()));
        }
        Ok(())
    }

    async fn close(&self) -> sluice_core::Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// In-memory backend that counts the sessions it opens and closes
#[derive(Debug, Default)]
pub struct TestBackend {
    counters: Arc<Counters>,
    connect_delay: Mutex<Duration>,
    refuse: AtomicBool,
}

impl TestBackend {
    /// Build a pool on top of this backend
    pub fn pool(self: &Arc<Self>, config: PoolConfig) -> Result<ConnectionPool> {
        initialize_logging();
        Ok(ConnectionPool::new(config, Arc::clone(self))?)
    }

    /// Sessions ever opened
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Sessions currently open on the backend side
    pub fn open_sessions(&self) -> usize {
        self.opened() - self.counters.closed.load(Ordering::SeqCst)
    }

    /// Delay every connect by `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Refuse (or accept again) new connections
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for TestBackend {
    async fn create(&self) -> sluice_core::Result<Arc<dyn Connection>> {
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SluiceError::Connection("connection refused".into()));
        }

        let session = self.counters.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(TestConnection {
            session,
            counters: Arc::clone(&self.counters),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Fresh backend for each test
#[fixture]
pub fn backend() -> Arc<TestBackend> {
    Arc::new(TestBackend::default())
}

/// Pool settings with the reaper parked, so only the test moves the pool
pub fn quiet_config(min_idle: usize, max_pool_size: usize) -> PoolConfig {
    PoolConfig::new(min_idle, max_pool_size).with_reaper_interval_ms(3_600_000)
}

/// Install a test-writer subscriber once per process
pub fn initialize_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sluice_pool=debug"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
