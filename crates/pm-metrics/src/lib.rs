//! Prometheus export for the recompute binary.

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const RECOMPUTE_STUDENTS_TOTAL: &str = "pm_recompute_students_total";
pub const RECOMPUTE_SWEEP_SECONDS: &str = "pm_recompute_sweep_seconds";

fn resolve_port(raw: Option<String>, default_port: u16) -> u16 {
    raw.and_then(|raw| raw.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(default_port)
}

fn describe_recompute_metrics() {
    describe_counter!(
        RECOMPUTE_STUDENTS_TOTAL,
        Unit::Count,
        "Students recomputed, labelled by outcome"
    );
    describe_histogram!(
        RECOMPUTE_SWEEP_SECONDS,
        Unit::Seconds,
        "Wall time of a full recompute sweep"
    );
}

/// Serve metrics on `0.0.0.0:<port>`, reading the port from `port_env`.
/// Repeat calls return the running exporter; `None` if it could not start.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok(), default_port);
    match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install_recorder()
    {
        Ok(handle) => {
            describe_recompute_metrics();
            info!(metrics_port = port, "prometheus exporter listening");
            Some(PROMETHEUS_HANDLE.get_or_init(|| handle))
        }
        Err(err) => {
            warn!(error = %err, metrics_port = port, "prometheus exporter not started");
            None
        }
    }
}

/// Count recomputed students by outcome. No-op without an installed recorder.
pub fn record_students(succeeded: usize, failed: usize) {
    counter!(RECOMPUTE_STUDENTS_TOTAL, "outcome" => "ok").increment(succeeded as u64);
    counter!(RECOMPUTE_STUDENTS_TOTAL, "outcome" => "failed").increment(failed as u64);
}

pub fn record_sweep(succeeded: usize, failed: usize, elapsed: Duration) {
    record_students(succeeded, failed);
    histogram!(RECOMPUTE_SWEEP_SECONDS).record(elapsed.as_secs_f64());
}
