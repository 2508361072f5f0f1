//! Metrics collection and Prometheus export.
//!
//! Initializes the metrics exporter and records the school workflow counters.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder.
///
/// Called once at startup. A second call (as happens when several test apps
/// share a process) keeps the first recorder.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if METRICS_HANDLE.set(handle).is_err() {
                tracing::warn!("Metrics handle already initialized");
            }
        }
        Err(e) => tracing::warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record an admission or enrollment update.
pub fn record_enrollment(operation: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    metrics::counter!("enrollment_operations_total", "operation" => operation, "status" => status)
        .increment(1);
}

/// Record promotions or retentions that committed.
pub fn record_promotions(kind: &'static str, count: usize) {
    metrics::counter!("promotions_total", "kind" => kind).increment(count as u64);
}

pub fn record_payment(amount: f64) {
    metrics::counter!("payments_total").increment(1);
    metrics::histogram!("payment_amount").record(amount);
}

pub fn record_late_fee_run(updated: u32, errors: usize) {
    metrics::counter!("late_fee_runs_total").increment(1);
    metrics::counter!("late_fee_fees_updated_total").increment(u64::from(updated));
    metrics::counter!("late_fee_errors_total").increment(errors as u64);
}

pub fn record_late_fee_customization(count: usize) {
    metrics::counter!("late_fee_customizations_total").increment(count as u64);
}
