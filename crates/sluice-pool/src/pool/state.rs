//! Pool bookkeeping
//!
//! Everything in here runs under the pool's single mutex and never awaits.
//! Capacity is counted in slots: a slot is either an idle connection, an
//! in-use connection, or a reservation for a connection being established.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_core::Connection;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::stats::{Counters, PoolStats};

/// Identifier of a connection, unique within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    InUse,
    Closed,
}

/// Read-only snapshot of a connection's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub created_at: Instant,
    pub last_used_at: Instant,
    /// How many times the connection has been handed to a caller
    pub times_acquired: u64,
}

impl ConnectionInfo {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }
}

/// Metadata the pool tracks per connection
#[derive(Debug, Clone, Copy)]
pub(crate) struct Meta {
    pub id: ConnectionId,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub times_acquired: u64,
}

impl Meta {
    pub fn new(id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: now,
            last_used_at: now,
            times_acquired: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_used_at = Instant::now();
    }

    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn idle_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }

    /// Whether the connection has outlived `max_lifetime`
    pub fn is_expired(&self, max_lifetime: Option<Duration>, now: Instant) -> bool {
        max_lifetime.is_some_and(|max| self.age_at(now) >= max)
    }

    pub fn info(&self, state: ConnectionState) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
            times_acquired: self.times_acquired,
        }
    }
}

/// An established connection together with its metadata
pub(crate) struct Pooled {
    pub conn: Arc<dyn Connection>,
    pub meta: Meta,
}

/// What a queued caller can be given
pub(crate) enum Handoff {
    /// A live connection, already recorded as in use
    Connection(Pooled),
    /// A free slot, already recorded as pending; the receiver connects
    Reservation,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Handoff>,
}

/// The pool's mutable state, guarded by one mutex
pub(crate) struct PoolState {
    max_size: usize,
    pub idle: VecDeque<Pooled>,
    pub in_use: HashMap<ConnectionId, Arc<dyn Connection>>,
    pub pending: usize,
    waiters: VecDeque<Waiter>,
    next_waiter_id: u64,
    pub closed: bool,
    pub counters: Counters,
}

impl PoolState {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            idle: VecDeque::with_capacity(max_size),
            in_use: HashMap::with_capacity(max_size),
            pending: 0,
            waiters: VecDeque::new(),
            next_waiter_id: 0,
            closed: false,
            counters: Counters::default(),
        }
    }

    /// Slots currently taken
    pub fn total(&self) -> usize {
        self.idle.len() + self.in_use.len() + self.pending
    }

    pub fn has_capacity(&self) -> bool {
        self.total() < self.max_size
    }

    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.idle.len(),
            self.in_use.len(),
            self.pending,
            self.waiters.len(),
            self.max_size,
            self.counters,
        )
    }

    /// Panic if the slot count ever exceeds the cap.
    ///
    /// A violation means the bookkeeping itself is wrong; carrying on would
    /// hand out connections the pool cannot account for.
    pub fn assert_consistent(&self) {
        assert!(
            self.total() <= self.max_size,
            "pool bookkeeping corrupted: idle {} + in_use {} + pending {} exceeds max_pool_size {}",
            self.idle.len(),
            self.in_use.len(),
            self.pending,
            self.max_size
        );
    }

    /// Record a connection as lent out.
    pub fn check_out(&mut self, pooled: &Pooled) {
        let previous = self.in_use.insert(pooled.meta.id, Arc::clone(&pooled.conn));
        assert!(
            previous.is_none(),
            "connection {} checked out twice",
            pooled.meta.id
        );
    }

    /// Reserve a slot for a connection about to be established.
    pub fn reserve(&mut self) {
        self.pending += 1;
        self.assert_consistent();
    }

    /// Give up a reservation; the slot goes to the head waiter if any.
    pub fn release_reservation(&mut self) {
        assert!(self.pending > 0, "released a reservation that was never made");
        self.pending -= 1;
        self.free_slot();
    }

    /// Offer a slot that just became free to the head waiter.
    pub fn free_slot(&mut self) {
        self.hand_off(Handoff::Reservation);
    }

    /// Turn a finished reservation into an in-use connection.
    pub fn fulfil_reservation(&mut self, pooled: &Pooled) {
        assert!(self.pending > 0, "fulfilled a reservation that was never made");
        self.pending -= 1;
        self.check_out(pooled);
        self.assert_consistent();
    }

    /// Place a connection established in the background for a reservation.
    pub fn settle_reservation(&mut self, pooled: Pooled) -> Option<Pooled> {
        assert!(self.pending > 0, "settled a reservation that was never made");
        self.pending -= 1;
        self.check_in(pooled)
    }

    /// Place an established connection: head waiter first, idle set otherwise.
    ///
    /// The caller must already have removed it from `in_use` / `pending`.
    /// Returns the connection back if the pool is closed and it must be
    /// torn down instead.
    pub fn check_in(&mut self, pooled: Pooled) -> Option<Pooled> {
        if self.closed {
            return Some(pooled);
        }
        if let Some(Handoff::Connection(pooled)) = self.hand_off(Handoff::Connection(pooled)) {
            self.idle.push_back(pooled);
        }
        self.assert_consistent();
        None
    }

    /// Give a handoff to the longest-waiting live waiter.
    ///
    /// The handoff is recorded (in use / pending) before it is sent, so a
    /// waiter that receives it owns a slot that is already counted. Waiters
    /// whose receiver is gone are skipped. Returns the handoff if nobody
    /// took it.
    fn hand_off(&mut self, mut handoff: Handoff) -> Option<Handoff> {
        while let Some(waiter) = self.waiters.pop_front() {
            self.record(&handoff);
            match waiter.tx.send(handoff) {
                Ok(()) => return None,
                Err(returned) => {
                    self.unrecord(&returned);
                    handoff = returned;
                }
            }
        }
        Some(handoff)
    }

    fn record(&mut self, handoff: &Handoff) {
        match handoff {
            Handoff::Connection(pooled) => self.check_out(pooled),
            Handoff::Reservation => self.pending += 1,
        }
    }

    fn unrecord(&mut self, handoff: &Handoff) {
        match handoff {
            Handoff::Connection(pooled) => {
                self.in_use.remove(&pooled.meta.id);
            }
            Handoff::Reservation => self.pending -= 1,
        }
    }

    /// Undo a handoff that reached a waiter which no longer wants it.
    ///
    /// Returns a connection that must be closed because the pool is closed.
    pub fn return_handoff(&mut self, handoff: Handoff) -> Option<Pooled> {
        match handoff {
            Handoff::Connection(pooled) => {
                self.in_use.remove(&pooled.meta.id);
                self.check_in(pooled)
            }
            Handoff::Reservation => {
                self.release_reservation();
                None
            }
        }
    }

    pub fn enqueue_waiter(&mut self) -> (u64, oneshot::Receiver<Handoff>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.waiters.push_back(Waiter { id, tx });
        (id, rx)
    }

    /// Remove a waiter from the queue. Returns false if it was already
    /// dequeued, meaning a handoff was sent or the pool closed.
    pub fn remove_waiter(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drop every queued waiter; their receivers observe the pool closing.
    pub fn clear_waiters(&mut self) -> usize {
        let count = self.waiters.len();
        self.waiters.clear();
        count
    }
}
