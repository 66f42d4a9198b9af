//! Connection pool implementation

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use sluice_core::{Connection, SluiceError};
use tokio::sync::{Notify, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::config::PoolConfig;
use super::events::{CloseReason, PoolEvent};
use super::factory::ConnectionFactory;
use super::reaper;
use super::state::{
    ConnectionId, ConnectionInfo, ConnectionState, Handoff, Meta, PoolState, Pooled,
};
use super::stats::PoolStats;
use crate::error::{PoolError, Result};
use crate::health::{HealthCheckResult, HealthThresholds, check_connection};

/// Stand-in deadline for waits too long to represent as an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + timeout`, saturating for effectively unbounded timeouts such
/// as `Duration::MAX`.
pub(super) fn deadline_from(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// State shared by the pool handle, lent connections and the reaper
pub(super) struct Shared {
    pub(super) config: PoolConfig,
    pub(super) factory: Arc<dyn ConnectionFactory>,
    pub(super) thresholds: HealthThresholds,
    pub(super) state: Mutex<PoolState>,
    next_id: AtomicU64,
    events: broadcast::Sender<PoolEvent>,
    pub(super) cancel: CancellationToken,
    /// Wakes the reaper early when the idle floor needs restoring
    pub(super) replenish: Arc<Notify>,
    /// Signalled whenever a slot is given back while the pool is closed
    drained: Notify,
    /// Connection closes running in the background
    closing: TaskTracker,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub(super) fn emit(&self, event: PoolEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Why an idle connection should be retired at `now`, if at all
    pub(super) fn retire_reason(&self, meta: &Meta, now: Instant) -> Option<CloseReason> {
        if meta.is_expired(self.config.max_lifetime(), now) {
            Some(CloseReason::MaxLifetime)
        } else if self
            .config
            .idle_timeout()
            .is_some_and(|timeout| meta.idle_at(now) >= timeout)
        {
            Some(CloseReason::IdleTimeout)
        } else {
            None
        }
    }

    /// Connect one backend session and run the creation health check.
    ///
    /// If the returned future is dropped part way, a session that was
    /// already opened is closed in the background.
    pub(super) async fn establish(&self) -> sluice_core::Result<Pooled> {
        let conn = self.factory.create().await?;
        let fresh = Unclaimed::new(self, conn, Meta::new(self.next_connection_id()));
        let id = fresh.meta.id;
        self.state.lock().counters.created += 1;
        self.emit(PoolEvent::Created { id });

        let check = self.validate(&*fresh.conn, self.config.validation_timeout()).await;
        if !check.status.is_usable() {
            let reason = check.error.unwrap_or_else(|| "unusable".to_string());
            self.close_connection(fresh.claim(), CloseReason::Unhealthy).await;
            return Err(SluiceError::Connection(format!(
                "new connection {} failed health check: {}",
                id, reason
            )));
        }
        check.log_if_slow(id);

        debug!(%id, backend = fresh.conn.backend_name(), "connection created");
        Ok(fresh.claim())
    }

    async fn validate(&self, conn: &dyn Connection, timeout: Duration) -> HealthCheckResult {
        check_connection(&*self.factory, conn, timeout, &self.thresholds).await
    }

    pub(super) fn record_create_failure(&self, attempt: u32, error: &SluiceError) {
        self.state.lock().counters.create_failures += 1;
        self.emit(PoolEvent::CreateFailed {
            attempt,
            error: error.to_string(),
        });
        warn!(attempt, error = %error, "failed to create connection");
    }

    /// Create a connection for an acquirer, retrying transient failures
    /// with backoff while the deadline allows.
    async fn create_with_retry(&self, deadline: Instant) -> Result<Pooled> {
        let max_attempts = self.config.create_retry_attempts();
        let mut attempt = 0u32;

        loop {
            if self.state.lock().closed {
                return Err(PoolError::PoolClosed);
            }
            attempt += 1;

            let error = match tokio::time::timeout_at(deadline, self.establish()).await {
                Ok(Ok(pooled)) => return Ok(pooled),
                Ok(Err(e)) => e,
                Err(_) => SluiceError::Timeout(
                    "connection was not established before the acquire deadline".into(),
                ),
            };
            self.record_create_failure(attempt, &error);

            let delay = self.config.create_backoff().calculate_delay(attempt - 1);
            if attempt >= max_attempts
                || !error.is_transient()
                || Instant::now()
                    .checked_add(delay)
                    .is_none_or(|retry_at| retry_at >= deadline)
            {
                return Err(PoolError::ConnectionCreationFailed {
                    attempts: attempt,
                    source: error,
                });
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Decide whether a checked-out connection may be given to the caller.
    ///
    /// Validation never runs past the caller's `deadline`.
    async fn vet(&self, conn: &PooledConnection, validate: bool, deadline: Instant) -> Verdict {
        if conn.meta.is_expired(self.config.max_lifetime(), Instant::now()) {
            return Verdict::Retire(CloseReason::MaxLifetime);
        }
        if !validate {
            return Verdict::Usable;
        }

        let check = self.validate(&*conn.conn, self.config.validation_timeout());
        let Ok(check) = tokio::time::timeout_at(deadline, check).await else {
            return Verdict::OutOfTime;
        };
        if !check.status.is_usable() {
            debug!(id = %conn.meta.id, error = ?check.error, "idle connection failed validation");
            return Verdict::Retire(CloseReason::Unhealthy);
        }
        check.log_if_slow(conn.meta.id);
        Verdict::Usable
    }

    /// Close a checked-out connection and keep its slot as a reservation
    /// so the same caller can connect a replacement.
    async fn retire_and_reserve<'a>(
        self: &'a Arc<Self>,
        conn: PooledConnection,
        reason: CloseReason,
    ) -> Result<Step<'a>> {
        let pooled = conn.detach();
        let step = {
            let mut state = self.state.lock();
            state.in_use.remove(&pooled.meta.id);
            if state.closed {
                Err(PoolError::PoolClosed)
            } else {
                state.reserve();
                Ok(())
            }
        }
        .map(|()| Step::Create(Reservation::armed(self)));
        if step.is_err() {
            self.drained.notify_waiters();
        }

        self.close_connection(pooled, reason).await;
        step
    }

    /// Turn a reservation into a connection lent to the caller.
    async fn fulfil(
        self: &Arc<Self>,
        reservation: Reservation<'_>,
        deadline: Instant,
    ) -> Result<PooledConnection> {
        let pooled = self.create_with_retry(deadline).await?;

        let accepted = {
            let mut state = self.state.lock();
            if state.closed {
                false
            } else {
                state.fulfil_reservation(&pooled);
                true
            }
        };
        if !accepted {
            drop(reservation);
            self.close_connection(pooled, CloseReason::Shutdown).await;
            return Err(PoolError::PoolClosed);
        }

        reservation.disarm();
        Ok(PooledConnection::new(Arc::clone(self), pooled))
    }

    /// Bookkeeping for a connection coming back from a caller.
    ///
    /// Returns the connection if it has to be closed rather than reused.
    fn check_in_returned(
        &self,
        mut pooled: Pooled,
        broken: bool,
    ) -> Result<Option<(Pooled, CloseReason)>> {
        let id = pooled.meta.id;
        let unusable = if broken || pooled.conn.is_closed() {
            Some(CloseReason::Broken)
        } else if pooled
            .meta
            .is_expired(self.config.max_lifetime(), Instant::now())
        {
            Some(CloseReason::MaxLifetime)
        } else {
            None
        };

        let (outcome, closed, replenish) = {
            let mut state = self.state.lock();
            if state.in_use.remove(&id).is_none() {
                if state.closed {
                    // Force-closed when the shutdown grace period ran out.
                    return Ok(None);
                }
                return Err(PoolError::InvalidRelease {
                    id,
                    reason: "connection is not checked out from this pool".into(),
                });
            }

            if state.closed {
                (Some((pooled, CloseReason::Shutdown)), true, false)
            } else if let Some(reason) = unusable {
                state.free_slot();
                let replenish = state.idle.len() < self.config.min_idle();
                (Some((pooled, reason)), false, replenish)
            } else {
                pooled.meta.touch();
                state.check_in(pooled);
                (None, false, false)
            }
        };

        if closed {
            self.drained.notify_waiters();
        }
        if replenish {
            self.replenish.notify_one();
        }
        self.emit(PoolEvent::Released { id });
        debug!(%id, reusable = outcome.is_none(), "connection released");
        Ok(outcome)
    }

    pub(super) async fn close_connection(&self, pooled: Pooled, reason: CloseReason) {
        let id = pooled.meta.id;
        if let Err(e) = pooled.conn.close().await {
            debug!(%id, error = %e, "error while closing connection");
        }
        self.state.lock().counters.closed += 1;
        self.emit(PoolEvent::Closed { id, reason });
        debug!(%id, %reason, "connection closed");
    }

    /// Close a connection from synchronous code (drop paths).
    ///
    /// Bookkeeping happens now; the close itself runs on the runtime and
    /// is awaited by shutdown.
    pub(super) fn spawn_close(&self, pooled: Pooled, reason: CloseReason) {
        let Pooled { conn, meta } = pooled;
        let id = meta.id;
        self.state.lock().counters.closed += 1;
        self.emit(PoolEvent::Closed { id, reason });

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.closing.spawn_on(
                    async move {
                        if let Err(e) = conn.close().await {
                            debug!(%id, error = %e, "error while closing connection");
                        }
                    },
                    &handle,
                );
                debug!(%id, %reason, "closing connection in the background");
            }
            Err(_) => {
                warn!(
                    %id,
                    %reason,
                    "no runtime available, dropping connection without closing it"
                );
            }
        }
    }
}

/// A session opened by the factory but not yet owned by the pool
///
/// Closed on drop unless claimed, so a cancelled creation or health check
/// does not leak a backend session.
struct Unclaimed<'a> {
    shared: &'a Shared,
    conn: Arc<dyn Connection>,
    meta: Meta,
    claimed: bool,
}

impl<'a> Unclaimed<'a> {
    fn new(shared: &'a Shared, conn: Arc<dyn Connection>, meta: Meta) -> Self {
        Self {
            shared,
            conn,
            meta,
            claimed: false,
        }
    }

    fn claim(mut self) -> Pooled {
        self.claimed = true;
        Pooled {
            conn: Arc::clone(&self.conn),
            meta: self.meta,
        }
    }
}

impl Drop for Unclaimed<'_> {
    fn drop(&mut self) {
        if self.claimed {
            return;
        }
        debug!(id = %self.meta.id, "connection creation abandoned");
        let pooled = Pooled {
            conn: Arc::clone(&self.conn),
            meta: self.meta,
        };
        self.shared.spawn_close(pooled, CloseReason::Abandoned);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A slot reserved for a connection that is being established.
///
/// Dropping an armed reservation gives the slot back, so an abandoned or
/// failed creation never leaks capacity.
pub(super) struct Reservation<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl<'a> Reservation<'a> {
    /// Wrap a slot already counted as pending.
    pub(super) fn armed(shared: &'a Shared) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    pub(super) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.lock().release_reservation();
            self.shared.drained.notify_waiters();
        }
    }
}

/// Whether a checked-out connection can be lent
enum Verdict {
    Usable,
    Retire(CloseReason),
    /// The caller's deadline passed while validating
    OutOfTime,
}

/// Where an acquire stands once it holds capacity
enum Step<'a> {
    /// Holding a live connection; `validate` asks for a health check first
    Check(PooledConnection, bool),
    /// Holding a reserved slot to connect into
    Create(Reservation<'a>),
}

impl<'a> Step<'a> {
    fn from_handoff(shared: &'a Arc<Shared>, handoff: Handoff, validate: bool) -> Self {
        match handoff {
            Handoff::Connection(pooled) => {
                Step::Check(PooledConnection::new(Arc::clone(shared), pooled), validate)
            }
            Handoff::Reservation => Step::Create(Reservation::armed(shared)),
        }
    }
}

enum WaitOutcome {
    Handoff(Handoff),
    TimedOut,
    Closed,
}

/// A caller's place in the wait queue.
///
/// Exactly one of {handoff, timeout} wins: handoffs are sent under the
/// pool lock, and a timing-out waiter retakes the lock to leave the queue.
/// If it is no longer queued, the handoff already arrived and is used.
/// Dropping an unsettled guard (a cancelled acquire) passes any handoff
/// that raced in on to the next waiter.
struct Waiter<'a> {
    shared: &'a Arc<Shared>,
    id: u64,
    rx: oneshot::Receiver<Handoff>,
    settled: bool,
}

impl Waiter<'_> {
    async fn wait(&mut self, deadline: Instant) -> WaitOutcome {
        let outcome = match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(handoff)) => WaitOutcome::Handoff(handoff),
            Ok(Err(_)) => WaitOutcome::Closed,
            Err(_) => {
                let removed = self.shared.state.lock().remove_waiter(self.id);
                if removed {
                    WaitOutcome::TimedOut
                } else {
                    match self.rx.try_recv() {
                        Ok(handoff) => WaitOutcome::Handoff(handoff),
                        Err(_) => WaitOutcome::Closed,
                    }
                }
            }
        };
        self.settled = true;
        outcome
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let to_close = {
            let mut state = self.shared.state.lock();
            if state.remove_waiter(self.id) {
                None
            } else {
                match self.rx.try_recv() {
                    Ok(handoff) => state.return_handoff(handoff),
                    Err(_) => None,
                }
            }
        };
        if let Some(pooled) = to_close {
            self.shared.spawn_close(pooled, CloseReason::Shutdown);
        }
    }
}

enum Grant<'a> {
    Ready(Step<'a>),
    Wait(Waiter<'a>, usize),
}

/// Outcome of [`ConnectionPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Idle connections closed immediately
    pub idle_closed: usize,
    /// Queued callers failed with `PoolClosed`
    pub waiters_rejected: usize,
    /// In-use connections returned and closed within the grace period
    pub drained: usize,
    /// In-use connections closed after the grace period ran out
    pub force_closed: usize,
    /// The pool had already been shut down; nothing was done
    pub already_closed: bool,
}

/// A bounded pool of backend connections
///
/// The pool is a cheap `Clone` handle; all clones share one set of
/// connections. Lent connections go back to the pool when the
/// [`PooledConnection`] is dropped or passed to [`ConnectionPool::release`].
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Create a new connection pool and start its reaper.
    ///
    /// Connections up to `min_idle` are opened by the reaper's first cycle,
    /// which runs immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(config.event_capacity());
        let shared = Arc::new(Shared {
            thresholds: config.health_thresholds(),
            state: Mutex::new(PoolState::new(config.max_pool_size())),
            factory: Arc::new(factory),
            next_id: AtomicU64::new(1),
            events,
            cancel: CancellationToken::new(),
            replenish: Arc::new(Notify::new()),
            drained: Notify::new(),
            closing: TaskTracker::new(),
            reaper: Mutex::new(None),
            config,
        });

        let handle = reaper::spawn(&shared);
        *shared.reaper.lock() = Some(handle);

        info!(
            max_pool_size = shared.config.max_pool_size(),
            min_idle = shared.config.min_idle(),
            "connection pool created"
        );
        Ok(Self { shared })
    }

    /// Get a connection, waiting at most the configured `connection_timeout`
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(self.shared.config.connection_timeout())
            .await
    }

    /// Get a connection, waiting at most `timeout`
    ///
    /// This will:
    /// 1. Reuse an idle connection if nobody is queued ahead
    /// 2. Otherwise connect a new one if the pool is below `max_pool_size`
    /// 3. Otherwise queue until a connection or slot is handed over
    ///
    /// `Duration::MAX` waits without a practical limit.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        let start = Instant::now();
        let deadline = deadline_from(start, timeout);

        let step = match self.try_grant()? {
            Grant::Ready(step) => step,
            Grant::Wait(mut waiter, queue_len) => {
                self.shared.emit(PoolEvent::Waiting { queue_len });
                debug!(queue_len, "pool saturated, waiting for a connection");
                match waiter.wait(deadline).await {
                    WaitOutcome::Handoff(handoff) => Step::from_handoff(&self.shared, handoff, false),
                    WaitOutcome::Closed => return Err(PoolError::PoolClosed),
                    WaitOutcome::TimedOut => return Err(self.exhausted(start.elapsed())),
                }
            }
        };

        let conn = self.complete(step, start, deadline).await?;
        let waited = start.elapsed();
        self.shared.state.lock().counters.acquired += 1;
        self.shared.emit(PoolEvent::Acquired {
            id: conn.id(),
            waited,
        });
        debug!(id = %conn.id(), waited_ms = waited.as_millis() as u64, "connection acquired");
        Ok(conn)
    }

    /// Claim capacity without waiting, or join the queue.
    fn try_grant(&self) -> Result<Grant<'_>> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        // Anyone already queued is served first.
        if !state.has_waiters() {
            if let Some(pooled) = state.idle.pop_back() {
                state.check_out(&pooled);
                let conn = PooledConnection::new(Arc::clone(shared), pooled);
                return Ok(Grant::Ready(Step::Check(conn, true)));
            }
            if state.has_capacity() {
                state.reserve();
                return Ok(Grant::Ready(Step::Create(Reservation::armed(shared))));
            }
        }

        let (id, rx) = state.enqueue_waiter();
        let waiter = Waiter {
            shared,
            id,
            rx,
            settled: false,
        };
        Ok(Grant::Wait(waiter, state.waiting()))
    }

    /// Drive held capacity to a connection the caller can use.
    async fn complete<'a>(
        &'a self,
        mut step: Step<'a>,
        start: Instant,
        deadline: Instant,
    ) -> Result<PooledConnection> {
        let shared = &self.shared;
        loop {
            step = match step {
                Step::Check(mut conn, validate) => match shared.vet(&conn, validate, deadline).await {
                    Verdict::Usable => {
                        conn.mark_acquired();
                        return Ok(conn);
                    }
                    Verdict::Retire(reason) => shared.retire_and_reserve(conn, reason).await?,
                    Verdict::OutOfTime => {
                        // An interrupted round-trip leaves the session in an
                        // unknown state, so it is not reused.
                        debug!(id = %conn.id(), "acquire deadline passed during validation");
                        let freed = shared.retire_and_reserve(conn, CloseReason::Abandoned).await?;
                        drop(freed);
                        return Err(self.exhausted(start.elapsed()));
                    }
                },
                Step::Create(reservation) => {
                    let mut conn = shared.fulfil(reservation, deadline).await?;
                    conn.mark_acquired();
                    return Ok(conn);
                }
            };
        }
    }

    fn exhausted(&self, waited: Duration) -> PoolError {
        let (in_use, waiting) = {
            let mut state = self.shared.state.lock();
            state.counters.timed_out += 1;
            (state.in_use.len(), state.waiting())
        };
        self.shared.emit(PoolEvent::TimedOut { waited });
        warn!(
            waited_ms = waited.as_millis() as u64,
            in_use, waiting, "timed out waiting for a connection"
        );
        PoolError::PoolExhausted {
            waited,
            max_size: self.shared.config.max_pool_size(),
            in_use,
            waiting,
        }
    }

    /// Return a connection to the pool
    ///
    /// Healthy connections go to the longest waiting caller, or back to the
    /// idle set. Broken or expired ones are closed and their slot is freed.
    /// Fails with `InvalidRelease` if the connection belongs to another pool,
    /// in which case it is returned to its own pool instead.
    pub async fn release(&self, mut conn: PooledConnection) -> Result<()> {
        if !Arc::ptr_eq(&conn.shared, &self.shared) {
            return Err(PoolError::InvalidRelease {
                id: conn.id(),
                reason: "connection belongs to a different pool".into(),
            });
        }

        let broken = conn.broken;
        let pooled = conn.take();
        if let Some((pooled, reason)) = self.shared.check_in_returned(pooled, broken)? {
            self.shared.close_connection(pooled, reason).await;
        }
        Ok(())
    }

    /// Shut down with the configured `shutdown_grace`
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with_grace(self.shared.config.shutdown_grace())
            .await
    }

    /// Shut the pool down
    ///
    /// New and queued acquires fail with `PoolClosed`, the reaper stops and
    /// idle connections are closed. In-use connections get until `grace`
    /// to come back; whatever is still out after that is closed from
    /// under its holder. Returns once every close has finished. Calling
    /// this again is a no-op.
    pub async fn shutdown_with_grace(&self, grace: Duration) -> ShutdownReport {
        let shared = &self.shared;
        let deadline = deadline_from(Instant::now(), grace);

        let (idle, waiters_rejected, in_use) = {
            let mut state = shared.state.lock();
            if state.closed {
                debug!("pool already shut down");
                return ShutdownReport {
                    already_closed: true,
                    ..Default::default()
                };
            }
            state.closed = true;
            let idle: Vec<Pooled> = state.idle.drain(..).collect();
            (idle, state.clear_waiters(), state.in_use.len())
        };
        info!(
            idle = idle.len(),
            in_use, waiters_rejected, "shutting down connection pool"
        );

        shared.cancel.cancel();
        let reaper = shared.reaper.lock().take();
        if let Some(mut handle) = reaper {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                // Wait until the task is gone so in-flight creations are closed.
                let _ = handle.await;
            }
        }

        let idle_closed = idle.len();
        for pooled in idle {
            shared.close_connection(pooled, CloseReason::Shutdown).await;
        }

        loop {
            let notified = shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = shared.state.lock();
                if state.in_use.is_empty() && state.pending == 0 {
                    break;
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        let forced: Vec<(ConnectionId, Arc<dyn Connection>)> =
            shared.state.lock().in_use.drain().collect();
        let force_closed = forced.len();
        for (id, conn) in forced {
            warn!(%id, "closing connection still in use after shutdown grace period");
            shared
                .close_connection(
                    Pooled {
                        conn,
                        meta: Meta::new(id),
                    },
                    CloseReason::Forced,
                )
                .await;
        }

        shared.closing.close();
        shared.closing.wait().await;

        shared.emit(PoolEvent::ShutDown { force_closed });
        let drained = in_use.saturating_sub(force_closed);
        info!(idle_closed, drained, force_closed, "connection pool shut down");
        ShutdownReport {
            idle_closed,
            waiters_rejected,
            drained,
            force_closed,
            already_closed: false,
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("stats", &self.stats())
            .finish()
    }
}

/// A connection borrowed from the pool
///
/// Exclusively owned by one caller until it is dropped or released. When
/// dropped, the connection is automatically returned to the pool.
pub struct PooledConnection {
    shared: Arc<Shared>,
    conn: Arc<dyn Connection>,
    meta: Meta,
    broken: bool,
    returned: bool,
}

impl PooledConnection {
    fn new(shared: Arc<Shared>, pooled: Pooled) -> Self {
        Self {
            shared,
            conn: pooled.conn,
            meta: pooled.meta,
            broken: false,
            returned: false,
        }
    }

    fn mark_acquired(&mut self) {
        self.meta.touch();
        self.meta.times_acquired += 1;
    }

    /// Take the connection out without returning it to the pool.
    fn take(&mut self) -> Pooled {
        self.returned = true;
        Pooled {
            conn: Arc::clone(&self.conn),
            meta: self.meta,
        }
    }

    fn detach(mut self) -> Pooled {
        self.take()
    }

    pub fn id(&self) -> ConnectionId {
        self.meta.id
    }

    pub fn info(&self) -> ConnectionInfo {
        self.meta.info(ConnectionState::InUse)
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    /// Flag the connection as unusable so it is closed instead of reused
    /// when it comes back to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        let broken = self.broken;
        let pooled = self.take();
        match self.shared.check_in_returned(pooled, broken) {
            Ok(Some((pooled, reason))) => self.shared.spawn_close(pooled, reason),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "dropped connection was not tracked by its pool"),
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.meta.id)
            .field("backend", &self.conn.backend_name())
            .field("times_acquired", &self.meta.times_acquired)
            .field("broken", &self.broken)
            .finish()
    }
}
