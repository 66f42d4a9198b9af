//! Mock backend shared by the crate's unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_core::{Connection, Result, SluiceError};

use super::ConnectionFactory;

/// Mock connection for testing
pub(crate) struct MockConnection {
    pub id: usize,
    closed: AtomicBool,
    healthy: AtomicBool,
    ping_delay: Duration,
}

impl MockConnection {
    pub fn new(id: usize) -> Self {
        Self::with_ping_delay(id, Duration::ZERO)
    }

    pub fn with_ping_delay(id: usize, ping_delay: Duration) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            ping_delay,
        }
    }

    /// Make subsequent pings fail
    pub fn break_link(&self) {
        self.healthy.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn backend_name(&self) -> &str {
        "mock"
    }

    async fn ping(&self) -> Result<()> {
        if !self.ping_delay.is_zero() {
            tokio::time::sleep(self.ping_delay).await;
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SluiceError::Connection("connection reset by peer".into()))
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock factory with scriptable failures and latency
#[derive(Default)]
pub(crate) struct MockFactory {
    counter: AtomicUsize,
    attempts: AtomicUsize,
    transient_failures: AtomicUsize,
    reject_all: AtomicBool,
    connect_delay: Mutex<Duration>,
    ping_delay: Mutex<Duration>,
    created: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connections successfully created
    pub fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// Calls to `create`, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Fail the next `n` creations with a transient error
    pub fn fail_next(&self, n: usize) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every creation with an authentication error
    pub fn reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Ping latency of connections created from now on
    pub fn set_ping_delay(&self, delay: Duration) {
        *self.ping_delay.lock() = delay;
    }

    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        Arc::clone(&self.created.lock()[index])
    }

    pub fn open_connections(&self) -> usize {
        self.created.lock().iter().filter(|c| !c.is_closed()).count()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.reject_all.load(Ordering::SeqCst) {
            return Err(SluiceError::Authentication("password rejected".into()));
        }
        let failing = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SluiceError::Connection("connection refused".into()));
        }

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let conn = Arc::new(MockConnection::with_ping_delay(id, *self.ping_delay.lock()));
        self.created.lock().push(Arc::clone(&conn));
        Ok(conn)
    }
}
