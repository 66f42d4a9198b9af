//! Connection lifecycle: retirement, lifetime cap, shutdown, config files

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use rstest::*;
    use sluice_core::Connection;
    use sluice_pool::{CloseReason, PoolConfig, PoolError, PoolEvent};

    use crate::fixtures::{TestBackend, backend, quiet_config};

    /// Idle connections past idle_timeout are gone within one reaper cycle
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_idle_connections_retired_within_one_cycle(
        backend: Arc<TestBackend>,
    ) -> anyhow::Result<()> {
        let config = PoolConfig::new(0, 4)
            .with_idle_timeout_ms(200)
            .with_reaper_interval_ms(100);
        let pool = backend.pool(config)?;

        let conns = vec![pool.acquire().await?, pool.acquire().await?, pool.acquire().await?];
        drop(conns);
        assert_eq!(pool.stats().idle(), 3);

        // idle_timeout + one reaper interval
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(pool.stats().idle(), 0);
        assert_eq!(backend.open_sessions(), 0);
        Ok(())
    }

    /// Recently used connections survive the reaper
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_busy_connections_are_not_retired(
        backend: Arc<TestBackend>,
    ) -> anyhow::Result<()> {
        let config = PoolConfig::new(0, 2)
            .with_idle_timeout_ms(200)
            .with_reaper_interval_ms(50);
        let pool = backend.pool(config)?;

        for _ in 0..10 {
            let conn = pool.acquire().await?;
            tokio::time::sleep(Duration::from_millis(100)).await;
            pool.release(conn).await?;
        }

        assert_eq!(backend.opened(), 1);
        assert_eq!(pool.stats().idle(), 1);
        Ok(())
    }

    /// No connection older than max_lifetime is ever handed out
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_lifetime_cap_is_never_exceeded(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let max_lifetime = Duration::from_millis(250);
        let config = PoolConfig::new(1, 3)
            .with_max_lifetime_ms(250)
            .with_idle_timeout_ms(0)
            .with_reaper_interval_ms(100);
        let pool = backend.pool(config)?;

        for _ in 0..30 {
            let conn = pool.acquire().await?;
            assert!(
                conn.info().age() < max_lifetime,
                "{} handed out at age {:?}",
                conn.id(),
                conn.info().age()
            );
            tokio::time::sleep(Duration::from_millis(40)).await;
            drop(conn);
        }

        assert!(backend.opened() > 1, "connections were never rotated");
        Ok(())
    }

    /// Shutdown leaves zero open connections and fails later acquires
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_all_connections(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let pool = backend.pool(PoolConfig::new(2, 5).with_reaper_interval_ms(1_000))?;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let held = pool.acquire().await?;
        let extra = pool.acquire().await?;
        let third = pool.acquire().await?;
        drop(extra);
        let mut events = pool.subscribe();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(third);
        });

        let report = pool.shutdown_with_grace(Duration::from_millis(100)).await;
        assert_eq!(report.idle_closed, 1);
        assert_eq!(report.force_closed, 1);

        drop(held);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(backend.open_sessions(), 0);
        assert_eq!(pool.stats().total(), 0);
        assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));

        let mut forced = 0;
        let mut finished = false;
        while let Ok(event) = events.try_recv() {
            match event {
                PoolEvent::Closed {
                    reason: CloseReason::Forced,
                    ..
                } => forced += 1,
                PoolEvent::ShutDown { force_closed } => {
                    assert_eq!(force_closed, 1);
                    finished = true;
                }
                _ => {}
            }
        }
        assert_eq!(forced, 1);
        assert!(finished);
        Ok(())
    }

    /// A config file drives the pool end to end
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_pool_from_config_file(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sluice.toml");
        std::fs::write(
            &path,
            "[pool]\nmax_pool_size = 1\nmin_idle = 0\nconnection_timeout_ms = 75\n",
        )?;

        let pool = backend.pool(PoolConfig::load(&path)?)?;
        let _held = pool.acquire().await?;

        let err = pool.acquire().await.unwrap_err();
        match err {
            PoolError::PoolExhausted { waited, .. } => {
                assert!(waited >= Duration::from_millis(75));
            }
            other => panic!("expected PoolExhausted, got {other:?}"),
        }
        Ok(())
    }

    /// Broken connections are dropped and their slot reused
    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_broken_connection_replaced(backend: Arc<TestBackend>) -> anyhow::Result<()> {
        let pool = backend.pool(quiet_config(0, 1))?;

        let mut conn = pool.acquire().await?;
        conn.mark_broken();
        pool.release(conn).await?;

        let conn = pool.acquire().await?;
        assert_eq!(backend.opened(), 2);
        assert_eq!(backend.open_sessions(), 1);
        assert!(!conn.is_closed());
        Ok(())
    }
}
