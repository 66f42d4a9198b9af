//! Background maintenance: idle retirement and min-idle replenishment

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::events::CloseReason;
use super::pool::{Reservation, Shared, deadline_from};
use super::state::Pooled;
use crate::retry::RetryTracker;

/// Start the reaper for a pool.
///
/// The task only holds a weak reference, so it never keeps the pool
/// alive; it exits once the pool is dropped or shut down. The first
/// cycle runs immediately to fill the pool up to `min_idle`.
pub(super) fn spawn(shared: &Arc<Shared>) -> JoinHandle<()> {
    let weak = Arc::downgrade(shared);
    let cancel = shared.cancel.clone();
    let wake = Arc::clone(&shared.replenish);
    let period = shared.config.reaper_interval();
    let mut retry = RetryTracker::new(shared.config.create_backoff().clone());

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = wake.notified() => {}
            }

            let Some(shared) = weak.upgrade() else {
                break;
            };
            shared.run_maintenance(&mut retry).await;
        }
        debug!("reaper stopped");
    })
}

impl Shared {
    /// One reaper cycle.
    pub(super) async fn run_maintenance(&self, retry: &mut RetryTracker) {
        let now = Instant::now();
        let retired: Vec<(Pooled, CloseReason)> = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }

            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut retired = Vec::new();
            while let Some(pooled) = state.idle.pop_front() {
                match self.retire_reason(&pooled.meta, now) {
                    Some(reason) => retired.push((pooled, reason)),
                    None => kept.push_back(pooled),
                }
            }
            state.idle = kept;
            for _ in &retired {
                state.free_slot();
            }
            retired
        };

        if !retired.is_empty() {
            debug!(count = retired.len(), "retiring idle connections");
        }
        // Tracked closes, so an aborted cycle still closes what it removed.
        for (pooled, reason) in retired {
            self.spawn_close(pooled, reason);
        }

        self.replenish(retry).await;
    }

    /// Open connections until `min_idle` are idle, within the size cap.
    async fn replenish(&self, retry: &mut RetryTracker) {
        let min_idle = self.config.min_idle();
        if min_idle == 0 {
            return;
        }
        if !retry.is_ready(Instant::now()) {
            debug!(
                failures = retry.consecutive_failures(),
                "backing off before replenishing idle connections"
            );
            return;
        }

        let wanted = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            let missing = min_idle.saturating_sub(state.idle.len());
            let room = self.config.max_pool_size().saturating_sub(state.total());
            let wanted = missing.min(room);
            for _ in 0..wanted {
                state.reserve();
            }
            wanted
        };
        if wanted == 0 {
            return;
        }

        let mut reservations: Vec<Reservation<'_>> =
            (0..wanted).map(|_| Reservation::armed(self)).collect();
        let mut created = 0usize;
        while let Some(reservation) = reservations.pop() {
            let deadline = deadline_from(Instant::now(), self.config.connection_timeout());
            let error = match tokio::time::timeout_at(deadline, self.establish()).await {
                Ok(Ok(pooled)) => {
                    retry.record_success();
                    let rejected = self.state.lock().settle_reservation(pooled);
                    reservation.disarm();
                    if let Some(pooled) = rejected {
                        self.spawn_close(pooled, CloseReason::Shutdown);
                        return;
                    }
                    created += 1;
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => sluice_core::SluiceError::Timeout(format!(
                    "connection was not established within {:?}",
                    self.config.connection_timeout()
                )),
            };

            self.record_create_failure(retry.consecutive_failures() + 1, &error);
            let delay = retry.record_failure(Instant::now());
            warn!(
                retry_in_ms = delay.as_millis() as u64,
                "could not replenish idle connections"
            );
            // Remaining reservations are given back as they drop.
            break;
        }

        if created > 0 {
            debug!(created, "replenished idle connections");
        }
    }
}
