//! Terminal rendering of configs and simulation results

use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use sluice_pool::PoolConfig;

use crate::simulate::SimulationReport;

fn table(header: [&str; 2]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn millis_or(value: Option<std::time::Duration>, zero: &str) -> String {
    match value {
        Some(d) => format!("{} ms", d.as_millis()),
        None => zero.to_string(),
    }
}

/// Effective settings of a validated config
pub fn config_table(config: &PoolConfig) -> Table {
    let backoff = config.create_backoff();
    let mut table = table(["Setting", "Value"]);
    table
        .add_row(vec!["max_pool_size".to_string(), config.max_pool_size().to_string()])
        .add_row(vec!["min_idle".to_string(), config.min_idle().to_string()])
        .add_row(vec![
            "connection_timeout".to_string(),
            format!("{} ms", config.connection_timeout().as_millis()),
        ])
        .add_row(vec![
            "idle_timeout".to_string(),
            millis_or(config.idle_timeout(), "never"),
        ])
        .add_row(vec![
            "max_lifetime".to_string(),
            millis_or(config.max_lifetime(), "unlimited"),
        ])
        .add_row(vec![
            "validation_timeout".to_string(),
            format!("{} ms", config.validation_timeout().as_millis()),
        ])
        .add_row(vec![
            "reaper_interval".to_string(),
            format!("{} ms", config.reaper_interval().as_millis()),
        ])
        .add_row(vec![
            "shutdown_grace".to_string(),
            format!("{} ms", config.shutdown_grace().as_millis()),
        ])
        .add_row(vec![
            "create_retry".to_string(),
            format!(
                "{} attempts, {}-{} ms backoff",
                config.create_retry_attempts(),
                backoff.initial_delay().as_millis(),
                backoff.max_delay().as_millis()
            ),
        ]);
    table
}

/// Summary of a simulation run
pub fn simulation_table(report: &SimulationReport) -> Table {
    let stats = &report.stats;
    let mut table = table(["Metric", "Value"]);
    table
        .add_row(vec![
            "workers x iterations".to_string(),
            format!("{} x {}", report.workload.workers, report.workload.iterations),
        ])
        .add_row(vec!["succeeded".to_string(), report.succeeded.to_string()])
        .add_row(vec!["exhausted".to_string(), report.exhausted.to_string()])
        .add_row(vec!["failed".to_string(), report.failed.to_string()])
        .add_row(vec![
            "wait (mean / max)".to_string(),
            format!("{:.1} ms / {} ms", report.mean_wait_ms, report.max_wait_ms),
        ])
        .add_row(vec!["elapsed".to_string(), format!("{} ms", report.elapsed_ms)])
        .add_row(vec![
            "connections created / closed".to_string(),
            format!("{} / {}", stats.created(), stats.closed()),
        ])
        .add_row(vec![
            "create failures".to_string(),
            stats.create_failures().to_string(),
        ])
        .add_row(vec![
            "open at end (idle / active)".to_string(),
            format!("{} / {}", stats.idle(), stats.active()),
        ])
        .add_row(vec![
            "drained at shutdown".to_string(),
            report.shutdown.drained.to_string(),
        ])
        .add_row(vec![
            "force-closed at shutdown".to_string(),
            report.shutdown.force_closed.to_string(),
        ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_table_shows_disabled_timeouts() {
        let config = PoolConfig::new(1, 4)
            .with_idle_timeout_ms(0)
            .with_max_lifetime_ms(0);
        let rendered = config_table(&config).to_string();

        assert!(rendered.contains("max_pool_size"));
        assert!(rendered.contains("never"));
        assert!(rendered.contains("unlimited"));
    }
}
