//! Drop guards that keep the executor's cleanup exactly-once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bastion_core::CorrelationId;
use tracing::{error, warn};

use super::AUDIT_EMIT_FAILURES;
use crate::traits::{MetricsSink, Transaction};

// ---------------------------------------------------------------------------
// TxGuard
// ---------------------------------------------------------------------------

/// Owns an open transaction until it is committed or rolled back.
///
/// Dropping a guard whose transaction is still open (the invocation future was
/// dropped mid-flight) spawns a rollback on the current runtime.
pub(crate) struct TxGuard {
    tx: Option<Box<dyn Transaction>>,
    correlation_id: CorrelationId,
}

impl TxGuard {
    pub(crate) fn new(tx: Box<dyn Transaction>, correlation_id: CorrelationId) -> Self {
        Self {
            tx: Some(tx),
            correlation_id,
        }
    }

    /// Commit. On error the transaction stays open for [`rollback`](Self::rollback).
    pub(crate) async fn commit(&mut self) -> anyhow::Result<()> {
        let Some(tx) = self.tx.as_mut() else {
            anyhow::bail!("transaction already finished");
        };
        tx.commit().await?;
        self.tx = None;
        Ok(())
    }

    /// Roll back if still open. Later calls are no-ops.
    pub(crate) async fn rollback(&mut self) {
        if let Some(mut tx) = self.tx.take() {
            if let Err(e) = tx.rollback().await {
                rollback_failed(self.correlation_id, &e);
            }
        }
    }
}

impl Drop for TxGuard {
    fn drop(&mut self) {
        let Some(mut tx) = self.tx.take() else {
            return;
        };
        let correlation_id = self.correlation_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%correlation_id, "invocation dropped with open transaction; rolling back");
                handle.spawn(async move {
                    if let Err(e) = tx.rollback().await {
                        rollback_failed(correlation_id, &e);
                    }
                });
            }
            Err(_) => {
                error!(%correlation_id, "no runtime for deferred rollback; transaction abandoned");
                ::metrics::counter!(AUDIT_EMIT_FAILURES, "phase" => "rollback").increment(1);
            }
        }
    }
}

fn rollback_failed(correlation_id: CorrelationId, e: &anyhow::Error) {
    error!(%correlation_id, error = %e, "transaction rollback failed");
    ::metrics::counter!(AUDIT_EMIT_FAILURES, "phase" => "rollback").increment(1);
}

// ---------------------------------------------------------------------------
// MetricsTimer
// ---------------------------------------------------------------------------

/// Records one duration and one outcome per invocation.
///
/// A timer dropped without [`finish`](Self::finish) records a failure.
pub(crate) struct MetricsTimer {
    sink: Arc<dyn MetricsSink>,
    operation_kind: String,
    started: Instant,
    recorded: bool,
}

impl MetricsTimer {
    pub(crate) fn start(sink: Arc<dyn MetricsSink>, operation_kind: &str) -> Self {
        Self {
            sink,
            operation_kind: operation_kind.to_string(),
            started: Instant::now(),
            recorded: false,
        }
    }

    pub(crate) fn finish(mut self, success: bool) -> Duration {
        self.record(success)
    }

    fn record(&mut self, success: bool) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.sink
                .record_duration(&self.operation_kind, elapsed.as_secs_f64());
            self.sink.record_outcome(&self.operation_kind, success);
        }
        elapsed
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        self.record(false);
    }
}
