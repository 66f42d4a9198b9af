//! Pool configuration types

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};
use crate::health::HealthThresholds;
use crate::retry::BackoffStrategy;

/// Configuration for a connection pool
///
/// Controls pool sizing, timeouts, and connection lifecycle. Durations are
/// stored in milliseconds so the struct maps directly onto config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Hard cap on idle + in-use + connecting connections
    max_pool_size: usize,
    /// Number of idle connections the reaper tries to keep ready
    min_idle: usize,
    /// Default time `acquire` waits before giving up
    connection_timeout_ms: u64,
    /// Idle time after which a connection is retired (0 = never)
    idle_timeout_ms: u64,
    /// Age after which a connection is retired (0 = unlimited)
    max_lifetime_ms: u64,
    /// Upper bound on a single health check
    validation_timeout_ms: u64,
    /// Health checks slower than this classify the connection as degraded
    slow_validation_ms: u64,
    /// Period of the background reaper
    reaper_interval_ms: u64,
    /// How long shutdown waits for in-use connections to come back
    shutdown_grace_ms: u64,
    /// Creation attempts made by a single `acquire`
    create_retry_attempts: u32,
    /// Delay schedule between creation attempts
    create_backoff: BackoffStrategy,
    /// Buffer size of the event broadcast channel
    event_capacity: usize,
}

impl PoolConfig {
    /// Create a new pool configuration with the given idle floor and size cap
    ///
    /// # Panics
    ///
    /// Panics if `min_idle > max_pool_size` or if `max_pool_size` is 0.
    pub fn new(min_idle: usize, max_pool_size: usize) -> Self {
        assert!(
            max_pool_size > 0,
            "max_pool_size must be greater than 0, got {}",
            max_pool_size
        );
        assert!(
            min_idle <= max_pool_size,
            "min_idle ({}) cannot exceed max_pool_size ({})",
            min_idle,
            max_pool_size
        );

        Self {
            max_pool_size,
            min_idle,
            connection_timeout_ms: 30_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: 1_800_000,
            validation_timeout_ms: 5_000,
            slow_validation_ms: 250,
            reaper_interval_ms: 30_000,
            shutdown_grace_ms: 30_000,
            create_retry_attempts: 3,
            create_backoff: BackoffStrategy::default(),
            event_capacity: 256,
        }
    }

    /// Parse the `[pool]` table of a TOML document
    ///
    /// ```
    /// use sluice_pool::PoolConfig;
    ///
    /// let config = PoolConfig::from_toml_str(r#"
    ///     [pool]
    ///     max_pool_size = 4
    ///     min_idle = 1
    ///     connection_timeout_ms = 250
    /// "#).unwrap();
    /// assert_eq!(config.max_pool_size(), 4);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct ConfigFile {
            #[serde(default)]
            pool: PoolConfig,
        }

        let file: ConfigFile = toml::from_str(source)?;
        file.pool.validate()?;
        Ok(file.pool)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Check the configuration for values the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_pool_size == 0 {
            return Err(PoolError::Configuration(
                "max_pool_size must be greater than 0".into(),
            ));
        }
        if self.min_idle > self.max_pool_size {
            return Err(PoolError::Configuration(format!(
                "min_idle ({}) cannot exceed max_pool_size ({})",
                self.min_idle, self.max_pool_size
            )));
        }
        if self.connection_timeout_ms == 0 {
            return Err(PoolError::Configuration(
                "connection_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.reaper_interval_ms == 0 {
            return Err(PoolError::Configuration(
                "reaper_interval_ms must be greater than 0".into(),
            ));
        }
        if self.validation_timeout_ms == 0 {
            return Err(PoolError::Configuration(
                "validation_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(PoolError::Configuration(
                "event_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Override the size cap; checked by [`PoolConfig::validate`]
    pub fn with_max_pool_size(mut self, max_pool_size: usize) -> Self {
        self.max_pool_size = max_pool_size;
        self
    }

    /// Override the idle floor; checked by [`PoolConfig::validate`]
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connection_timeout_ms = timeout_ms;
        self
    }

    /// Set the idle timeout in milliseconds (0 disables idle retirement)
    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.idle_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum connection lifetime in milliseconds (0 = unlimited)
    pub fn with_max_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.max_lifetime_ms = lifetime_ms;
        self
    }

    pub fn with_validation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.validation_timeout_ms = timeout_ms;
        self
    }

    pub fn with_slow_validation_ms(mut self, threshold_ms: u64) -> Self {
        self.slow_validation_ms = threshold_ms;
        self
    }

    pub fn with_reaper_interval_ms(mut self, interval_ms: u64) -> Self {
        self.reaper_interval_ms = interval_ms;
        self
    }

    pub fn with_shutdown_grace_ms(mut self, grace_ms: u64) -> Self {
        self.shutdown_grace_ms = grace_ms;
        self
    }

    pub fn with_create_retry_attempts(mut self, attempts: u32) -> Self {
        self.create_retry_attempts = attempts;
        self
    }

    pub fn with_create_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.create_backoff = backoff;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    pub fn min_idle(&self) -> usize {
        self.min_idle
    }

    /// Default wait used by [`ConnectionPool::acquire`](crate::ConnectionPool::acquire)
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Idle timeout, or `None` when idle retirement is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// Maximum lifetime, or `None` when connections may live forever
    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_ms > 0).then(|| Duration::from_millis(self.max_lifetime_ms))
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    /// Latency thresholds for classifying health checks.
    ///
    /// Anything that completes within the validation timeout is at worst
    /// degraded; timing out makes it unhealthy.
    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds::new(self.slow_validation_ms, self.validation_timeout_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Creation attempts per acquire, never less than one
    pub fn create_retry_attempts(&self) -> u32 {
        self.create_retry_attempts.max(1)
    }

    pub fn create_backoff(&self) -> &BackoffStrategy {
        &self.create_backoff
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - max_pool_size: 10, min_idle: 0
    /// - connection_timeout: 30 seconds
    /// - idle_timeout: 10 minutes
    /// - max_lifetime: 30 minutes
    /// - reaper_interval: 30 seconds
    fn default() -> Self {
        Self::new(0, 10)
    }
}
