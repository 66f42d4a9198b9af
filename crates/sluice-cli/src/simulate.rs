//! Load simulation against an in-process backend

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use sluice_core::{ConnectOptions, Connection, Result, SluiceError};
use sluice_pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolError, PoolStats, ShutdownReport};
use tokio::time::Instant;

/// Connection to the simulated backend
pub struct SimulatedConnection {
    id: u64,
    latency: Duration,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for SimulatedConnection {
    fn backend_name(&self) -> &str {
        "simulated"
    }

    async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SluiceError::Connection(format!(
                "session {} already closed",
                self.id
            )));
        }
        tokio::time::sleep(self.latency / 4).await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A backend that connects after `latency_ms` and refuses a
/// `failure_rate` fraction of attempts.
///
/// Both knobs are read from the connect options' parameters.
pub struct SimulatedBackend {
    options: ConnectOptions,
    latency: Duration,
    failure_rate: f64,
    sessions: AtomicU64,
}

impl SimulatedBackend {
    pub fn new(options: ConnectOptions) -> anyhow::Result<Self> {
        let latency_ms = match options.get_string("latency_ms") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("invalid latency_ms '{}'", value))?,
            None => 0,
        };
        let failure_rate = match options.get_string("failure_rate") {
            Some(value) => value
                .parse::<f64>()
                .with_context(|| format!("invalid failure_rate '{}'", value))?,
            None => 0.0,
        };
        anyhow::ensure!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {}",
            failure_rate
        );

        Ok(Self {
            options,
            latency: Duration::from_millis(latency_ms),
            failure_rate,
            sessions: AtomicU64::new(0),
        })
    }

    /// Sessions opened so far
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for SimulatedBackend {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        tokio::time::sleep(self.latency).await;

        if self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(SluiceError::Connection(format!(
                "{} refused the connection",
                self.options.address()
            )));
        }

        let id = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(SimulatedConnection {
            id,
            latency: self.latency,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Shape of the generated load
#[derive(Debug, Clone, Serialize)]
pub struct Workload {
    pub workers: usize,
    pub iterations: usize,
    /// How long each worker keeps a connection
    pub hold: Duration,
    pub acquire_timeout: Duration,
}

/// Outcome of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub workload: Workload,
    pub succeeded: u64,
    pub exhausted: u64,
    pub failed: u64,
    pub max_wait_ms: u64,
    pub mean_wait_ms: f64,
    pub elapsed_ms: u64,
    pub sessions_opened: u64,
    /// Pool statistics taken just before shutdown
    pub stats: PoolStats,
    pub shutdown: ShutdownReport,
}

#[derive(Debug, Default)]
struct WorkerTally {
    succeeded: u64,
    exhausted: u64,
    failed: u64,
    waits: Vec<Duration>,
}

/// Drive `workload` through a pool backed by `backend`, then shut it down.
pub async fn run(
    config: PoolConfig,
    backend: Arc<SimulatedBackend>,
    workload: Workload,
) -> anyhow::Result<SimulationReport> {
    let pool = ConnectionPool::new(config, Arc::clone(&backend)).context("failed to build pool")?;
    let start = Instant::now();

    let mut handles = Vec::with_capacity(workload.workers);
    for worker in 0..workload.workers {
        let pool = pool.clone();
        let workload = workload.clone();
        handles.push(tokio::spawn(async move {
            let mut tally = WorkerTally::default();
            for _ in 0..workload.iterations {
                let asked = Instant::now();
                match pool.acquire_timeout(workload.acquire_timeout).await {
                    Ok(conn) => {
                        tally.waits.push(asked.elapsed());
                        tokio::time::sleep(workload.hold).await;
                        if let Err(e) = pool.release(conn).await {
                            tracing::warn!(worker, error = %e, "release failed");
                        }
                        tally.succeeded += 1;
                    }
                    Err(PoolError::PoolExhausted { .. }) => tally.exhausted += 1,
                    Err(e) => {
                        tracing::debug!(worker, error = %e, "acquire failed");
                        tally.failed += 1;
                    }
                }
            }
            tally
        }));
    }

    let mut total = WorkerTally::default();
    for handle in handles {
        let tally = handle.await.context("simulation worker panicked")?;
        total.succeeded += tally.succeeded;
        total.exhausted += tally.exhausted;
        total.failed += tally.failed;
        total.waits.extend(tally.waits);
    }
    let elapsed = start.elapsed();

    let stats = pool.stats();
    let shutdown = pool.shutdown().await;

    let max_wait = total.waits.iter().max().copied().unwrap_or_default();
    let mean_wait_ms = if total.waits.is_empty() {
        0.0
    } else {
        total.waits.iter().map(Duration::as_secs_f64).sum::<f64>() * 1000.0
            / total.waits.len() as f64
    };

    Ok(SimulationReport {
        workload,
        succeeded: total.succeeded,
        exhausted: total.exhausted,
        failed: total.failed,
        max_wait_ms: max_wait.as_millis() as u64,
        mean_wait_ms,
        elapsed_ms: elapsed.as_millis() as u64,
        sessions_opened: backend.sessions(),
        stats,
        shutdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(latency_ms: u64, failure_rate: f64) -> ConnectOptions {
        ConnectOptions::new("simulated", "localhost")
            .with_param("latency_ms", latency_ms)
            .with_param("failure_rate", failure_rate)
    }

    fn workload(workers: usize, iterations: usize) -> Workload {
        Workload {
            workers,
            iterations,
            hold: Duration::from_millis(10),
            acquire_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backend_reads_options() {
        let backend = SimulatedBackend::new(options(15, 0.25)).expect("backend");
        assert_eq!(backend.latency, Duration::from_millis(15));
        assert!((backend.failure_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_backend_rejects_bad_failure_rate() {
        assert!(SimulatedBackend::new(options(0, 1.5)).is_err());

        let garbled = ConnectOptions::new("simulated", "localhost").with_param("latency_ms", "soon");
        assert!(SimulatedBackend::new(garbled).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_always_failing() {
        let backend = SimulatedBackend::new(options(0, 1.0)).expect("backend");
        let err = backend.create().await.err().expect("refused");
        assert!(err.is_transient());
        assert!(err.to_string().contains("localhost"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_completes_all_iterations() {
        let backend = Arc::new(SimulatedBackend::new(options(5, 0.0)).expect("backend"));
        let config = PoolConfig::new(1, 3);

        let report = run(config, Arc::clone(&backend), workload(6, 5))
            .await
            .expect("simulation");

        assert_eq!(report.succeeded, 30);
        assert_eq!(report.exhausted + report.failed, 0);
        assert!(report.sessions_opened <= 3);
        assert_eq!(report.stats.acquired(), 30);
        assert_eq!(report.shutdown.force_closed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_reports_exhaustion() {
        let backend = Arc::new(SimulatedBackend::new(options(0, 0.0)).expect("backend"));
        let config = PoolConfig::new(0, 1);
        let mut load = workload(4, 1);
        load.hold = Duration::from_millis(100);
        load.acquire_timeout = Duration::from_millis(50);

        let report = run(config, backend, load).await.expect("simulation");

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.exhausted, 3);
    }
}
