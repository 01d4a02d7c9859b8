//! [`MetricsSink`] backed by the `metrics` facade.
//!
//! Without an installed recorder every call is a no-op; install one with
//! [`crate::telemetry::install_prometheus_exporter`].

use crate::traits::MetricsSink;

pub const OPERATION_DURATION_SECONDS: &str = "bastion_operation_duration_seconds";
pub const OPERATIONS_TOTAL: &str = "bastion_operations_total";

/// Operation kinds are caller-defined; longer labels are truncated.
pub const MAX_LABEL_VALUE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetricsSink;

impl MetricsSink for PrometheusMetricsSink {
    fn record_duration(&self, operation_kind: &str, seconds: f64) {
        metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => label(operation_kind))
            .record(seconds);
    }

    fn record_outcome(&self, operation_kind: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        metrics::counter!(
            OPERATIONS_TOTAL,
            "operation" => label(operation_kind),
            "outcome" => outcome
        )
        .increment(1);
    }
}

fn label(value: &str) -> String {
    match value.char_indices().nth(MAX_LABEL_VALUE_LEN) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value.to_string(),
    }
}
