//! End-to-end pool scenarios
//!
//! Each test walks the pool through one externally observable story:
//! saturation, hand-over of a released connection to a queued caller,
//! and warm-up to the idle floor.

#[cfg(test)]
mod scenario_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use sluice_pool::{PoolConfig, PoolError};
    use tokio::time::Instant;

    use crate::fixtures::{TestBackend, backend, quiet_config};

    /// max=2, min_idle=0: two acquires succeed, the third times out
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_third_acquire_exhausts_pool(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let pool = backend.pool(quiet_config(0, 2))?;

        let _first = pool.acquire().await?;
        let _second = pool.acquire().await?;

        let start = Instant::now();
        let result = pool.acquire_timeout(Duration::from_millis(100)).await;
        let waited = start.elapsed();

        match result {
            Err(PoolError::PoolExhausted { max_size, in_use, .. }) => {
                assert_eq!(max_size, 2);
                assert_eq!(in_use, 2);
            }
            other => panic!("expected PoolExhausted, got {other:?}"),
        }
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(150), "gave up late: {waited:?}");
        assert_eq!(backend.opened(), 2);
        Ok(())
    }

    /// Releasing while a caller waits hands that connection over
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_release_mid_wait_satisfies_waiter(
        backend: Arc<TestBackend>,
    ) -> anyhow::Result<()> {
        let pool = backend.pool(quiet_config(0, 2))?;

        let first = pool.acquire().await?;
        let _second = pool.acquire().await?;
        let first_id = first.id();

        let waiting = tokio::spawn({
            let pool = pool.clone();
            async move {
                let start = Instant::now();
                let conn = pool.acquire_timeout(Duration::from_millis(100)).await;
                (conn, start.elapsed())
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.release(first).await?;

        let (conn, waited) = waiting.await?;
        let conn = conn?;
        assert_eq!(conn.id(), first_id);
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_millis(100));

        let stats = pool.stats();
        assert_eq!(stats.active(), 2);
        assert_eq!(stats.timed_out(), 0);
        assert_eq!(backend.opened(), 2);
        Ok(())
    }

    /// min_idle=3: after one reaper cycle, 3 idle and none in use
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_pool_warms_up_to_min_idle(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let config = PoolConfig::new(3, 10).with_reaper_interval_ms(1_000);
        let pool = backend.pool(config)?;

        tokio::time::sleep(Duration::from_millis(1_000)).await;

        let stats = pool.stats();
        assert_eq!(stats.idle(), 3);
        assert_eq!(stats.active(), 0);
        assert_eq!(backend.opened(), 3);
        Ok(())
    }

    /// Acquiring from a warm pool reuses idle connections instead of connecting
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_warm_pool_serves_without_connecting(
        backend: Arc<TestBackend>,
    ) -> anyhow::Result<()> {
        let pool = backend.pool(PoolConfig::new(2, 4).with_reaper_interval_ms(1_000))?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.set_refusing(true);

        let a = pool.acquire().await?;
        let b = pool.acquire().await?;
        assert_ne!(a.id(), b.id());
        assert_eq!(backend.opened(), 2);
        Ok(())
    }

    /// A backend outage surfaces as ConnectionCreationFailed, and the
    /// pool recovers once the backend is back
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_backend_outage(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let pool = backend.pool(quiet_config(0, 2))?;
        backend.set_refusing(true);

        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::ConnectionCreationFailed { .. }));
        assert!(err.is_retryable());
        assert_eq!(pool.stats().total(), 0);

        backend.set_refusing(false);
        let _conn = pool.acquire().await?;
        assert_eq!(pool.stats().active(), 1);
        Ok(())
    }
}
