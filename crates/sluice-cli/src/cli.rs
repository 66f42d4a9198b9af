//! sluice - connection pool config checker and load simulator

mod logging;
mod report;
mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sluice_core::ConnectOptions;
use sluice_pool::PoolConfig;

use crate::logging::LoggingConfig;
use crate::simulate::{SimulatedBackend, Workload};

#[derive(Parser, Debug)]
#[command(
    name = "sluice",
    version,
    about = "Validate connection pool configs and exercise them under load"
)]
struct Cli {
    /// Log pool internals at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write JSON logs into this directory
    #[arg(long, global = true, env = "SLUICE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a pool config file and print the effective settings
    CheckConfig {
        /// TOML file with a [pool] table
        path: PathBuf,

        /// Print the config as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run concurrent workers against a simulated backend
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// TOML file with a [pool] table; defaults apply when omitted
    #[arg(short, long, env = "SLUICE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    max_pool_size: Option<usize>,

    #[arg(long)]
    min_idle: Option<usize>,

    /// Concurrent workers
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Acquisitions per worker
    #[arg(long, default_value_t = 20)]
    iterations: usize,

    /// How long each worker keeps a connection
    #[arg(long, default_value_t = 25)]
    hold_ms: u64,

    #[arg(long, default_value_t = 1_000)]
    acquire_timeout_ms: u64,

    /// Simulated connect latency
    #[arg(long, default_value_t = 10)]
    connect_latency_ms: u64,

    /// Fraction of connection attempts the backend refuses
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl SimulateArgs {
    fn pool_config(&self) -> Result<PoolConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => PoolConfig::default(),
        };
        if let Some(max) = self.max_pool_size {
            config = config.with_max_pool_size(max);
        }
        if let Some(min) = self.min_idle {
            config = config.with_min_idle(min);
        }
        config.validate().context("invalid pool settings")?;
        Ok(config)
    }

    fn backend_options(&self) -> ConnectOptions {
        ConnectOptions::new("simulated", "localhost")
            .with_param("latency_ms", self.connect_latency_ms)
            .with_param("failure_rate", self.failure_rate)
    }

    fn workload(&self) -> Workload {
        Workload {
            workers: self.workers,
            iterations: self.iterations,
            hold: Duration::from_millis(self.hold_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
        }
    }
}

fn load_config(path: &Path) -> Result<PoolConfig> {
    PoolConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn check_config(path: &Path, json: bool) -> Result<()> {
    let config = load_config(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{} is valid", path.display());
        println!("{}", report::config_table(&config));
    }
    Ok(())
}

async fn run_simulation(args: SimulateArgs) -> Result<()> {
    let config = args.pool_config()?;
    let backend = Arc::new(SimulatedBackend::new(args.backend_options())?);

    tracing::info!(
        workers = args.workers,
        iterations = args.iterations,
        max_pool_size = config.max_pool_size(),
        "starting simulation"
    );
    let report = simulate::run(config, backend, args.workload()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report::simulation_table(&report));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = if cli.verbose {
        LoggingConfig::verbose()
    } else {
        LoggingConfig::default()
    };
    if let Some(dir) = &cli.log_dir {
        logging = logging.with_json_logs(dir.clone());
    }
    logging::init(&logging)?;

    match cli.command {
        Command::CheckConfig { path, json } => check_config(&path, json),
        Command::Simulate(args) => run_simulation(args).await,
    }
}
