//! Pool invariants under concurrent load

#[cfg(test)]
mod concurrency_tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use sluice_pool::{ConnectionId, PoolConfig, PoolError};

    use crate::fixtures::{TestBackend, backend, quiet_config};

    /// Size cap holds and no connection is ever lent to two callers at once
    #[rstest]
    #[case::single(1, 10)]
    #[case::small(3, 30)]
    #[case::wide(8, 64)]
    #[tokio::test(start_paused = true)]
    async fn test_exclusive_ownership_under_load(
        backend: Arc<TestBackend>,
        #[case] max_size: usize,
        #[case] workers: usize,
    ) -> anyhow::Result<()> {
        let pool = backend.pool(quiet_config(0, max_size))?;
        let held: Arc<Mutex<HashSet<ConnectionId>>> = Arc::default();
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let pool = pool.clone();
            let held = Arc::clone(&held);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                for round in 0..5u64 {
                    let conn = pool.acquire_timeout(Duration::from_secs(60)).await?;
                    {
                        let mut held = held.lock();
                        assert!(held.insert(conn.id()), "{} lent twice", conn.id());
                        peak.fetch_max(held.len(), Ordering::SeqCst);
                    }
                    let stats = pool.stats();
                    assert!(stats.total() + stats.pending() <= max_size);

                    tokio::time::sleep(Duration::from_millis(1 + (worker as u64 + round) % 4)).await;

                    held.lock().remove(&conn.id());
                    pool.release(conn).await?;
                }
                Ok::<_, PoolError>(())
            }));
        }
        for handle in handles {
            handle.await??;
        }

        assert!(peak.load(Ordering::SeqCst) <= max_size);
        assert!(backend.opened() <= max_size);
        let stats = pool.stats();
        assert_eq!(stats.acquired(), (workers * 5) as u64);
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.waiting(), 0);
        Ok(())
    }

    /// Callers that give up never cost the pool capacity
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_timeouts_and_cancellations_leak_nothing(
        backend: Arc<TestBackend>,
    ) -> anyhow::Result<()> {
        backend.set_connect_delay(Duration::from_millis(20));
        let pool = backend.pool(quiet_config(0, 2))?;

        let mut handles = Vec::new();
        for i in 0..12u64 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let budget = Duration::from_millis(5 + i * 7);
                // Half the callers are cancelled from outside, half time out on their own
                if i % 2 == 0 {
                    let _ = tokio::time::timeout(budget, pool.acquire()).await;
                } else if let Ok(conn) = pool.acquire_timeout(budget).await {
                    tokio::time::sleep(Duration::from_millis(15)).await;
                    drop(conn);
                }
            }));
        }
        for handle in handles {
            handle.await?;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        let stats = pool.stats();
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.pending(), 0);
        assert_eq!(stats.waiting(), 0);
        assert!(stats.idle() <= 2);

        // Full capacity is still available
        let a = pool.acquire_timeout(Duration::from_secs(1)).await?;
        let b = pool.acquire_timeout(Duration::from_secs(1)).await?;
        assert_ne!(a.id(), b.id());
        Ok(())
    }

    /// Queued callers are served in arrival order even when new callers
    /// keep arriving
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_fifo_order_with_late_arrivals(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let pool = backend.pool(PoolConfig::new(0, 1).with_reaper_interval_ms(3_600_000))?;
        let held = pool.acquire().await?;
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for caller in 0..5usize {
            let pool = pool.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let conn = pool.acquire_timeout(Duration::from_secs(10)).await?;
                order.lock().push(caller);
                tokio::time::sleep(Duration::from_millis(5)).await;
                pool.release(conn).await
            }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        pool.release(held).await?;
        for handle in handles {
            handle.await??;
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(backend.opened(), 1);
        Ok(())
    }
}
