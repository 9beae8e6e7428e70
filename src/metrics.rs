//! Strategy pipeline metrics.
//!
//! All names follow `lci_{phase}_{metric}` with `_total` on counters. Without
//! an installed recorder every call here is a no-op, so library users that do
//! not care about metrics pay nothing.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("lci_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("lci_", $phase, "_", $name)
    };
}

/// Install a Prometheus recorder for in-process rendering. Idempotent.
pub fn init_metrics() {
    HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus recorder installed");
            StrategyMetrics::describe();
            Some(handle)
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    });
}

/// Current metrics in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get()?.as_ref().map(PrometheusHandle::render)
}

pub struct StrategyMetrics;

impl StrategyMetrics {
    fn describe() {
        ::metrics::describe_counter!(
            phase_metric!(counter, "strategies", "applied"),
            "Strategies that returned a new batch"
        );
        ::metrics::describe_counter!(
            phase_metric!(counter, "strategies", "refused"),
            "Strategies that refused with a contained error"
        );
        ::metrics::describe_counter!(
            phase_metric!(counter, "strategies", "failed"),
            "Strategies that aborted their run"
        );
        ::metrics::describe_histogram!(
            phase_metric!(histogram, "strategies", "duration_seconds"),
            "Wall-clock time of one strategy"
        );
        ::metrics::describe_histogram!(
            phase_metric!(histogram, "strategies", "run_duration_seconds"),
            "Wall-clock time of one apply_strategies call"
        );
        ::metrics::describe_histogram!(
            phase_metric!(histogram, "strategies", "run_steps"),
            "Strategies attempted by one apply_strategies call"
        );
        ::metrics::describe_counter!(
            phase_metric!(counter, "unlinked", "writes"),
            "Batches written to the unlinked-data store"
        );
    }

    pub fn record_applied(strategy: &str, duration_secs: f64) {
        ::metrics::counter!(
            phase_metric!(counter, "strategies", "applied"),
            "strategy" => strategy.to_string()
        )
        .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "strategies", "duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_refused(strategy: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "strategies", "refused"),
            "strategy" => strategy.to_string()
        )
        .increment(1);
    }

    pub fn record_failed(strategy: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "strategies", "failed"),
            "strategy" => strategy.to_string()
        )
        .increment(1);
    }

    pub fn record_run(step_count: usize, duration_secs: f64) {
        ::metrics::histogram!(phase_metric!(
            histogram,
            "strategies",
            "run_duration_seconds"
        ))
        .record(duration_secs);
        ::metrics::histogram!(phase_metric!(histogram, "strategies", "run_steps"))
            .record(step_count as f64);
    }

    pub fn record_unlinked_write() {
        ::metrics::counter!(phase_metric!(counter, "unlinked", "writes")).increment(1);
    }
}
