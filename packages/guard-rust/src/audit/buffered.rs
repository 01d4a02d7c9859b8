use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bastion_core::{AuditRecord, Classification, ClockSource, OperationContext, SystemClock, Value};
use tracing::{debug, error};

use crate::error::GuardError;
use crate::traits::AuditSink;
use crate::worker::{BackgroundRunnable, BackgroundWorker};

/// Durable destination for batches of audit records (a table, a log shipper).
#[async_trait]
pub trait AuditRecordWriter: Send + 'static {
    async fn write_batch(&mut self, records: &[AuditRecord]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct BufferedAuditConfig {
    /// Queue capacity between submitters and the worker.
    pub channel_capacity: usize,
    /// Flush as soon as this many records are buffered.
    pub max_batch: usize,
    /// Flush whatever is buffered at this interval.
    pub flush_interval: Duration,
    /// Records retained across failed writes before the oldest are dropped.
    pub max_pending: usize,
}

impl Default for BufferedAuditConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            max_batch: 100,
            flush_interval: Duration::from_secs(1),
            max_pending: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditBatcher
// ---------------------------------------------------------------------------

struct AuditBatcher<W> {
    writer: W,
    pending: Vec<AuditRecord>,
    max_batch: usize,
    max_pending: usize,
}

impl<W: AuditRecordWriter> AuditBatcher<W> {
    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        match self.writer.write_batch(&self.pending).await {
            Ok(()) => {
                debug!(records = self.pending.len(), "audit batch written");
                self.pending.clear();
            }
            Err(e) => {
                error!(
                    pending = self.pending.len(),
                    error = %e,
                    "audit batch write failed; keeping records for next flush"
                );
                if self.pending.len() > self.max_pending {
                    let excess = self.pending.len() - self.max_pending;
                    self.pending.drain(..excess);
                    error!(dropped = excess, "audit buffer overflow; oldest records dropped");
                    ::metrics::counter!(crate::executor::AUDIT_EMIT_FAILURES, "phase" => "buffered")
                        .increment(u64::try_from(excess).unwrap_or(u64::MAX));
                }
            }
        }
    }
}

#[async_trait]
impl<W: AuditRecordWriter> BackgroundRunnable for AuditBatcher<W> {
    type Task = AuditRecord;

    async fn run(&mut self, record: AuditRecord) {
        self.pending.push(record);
        if self.pending.len() >= self.max_batch {
            self.flush().await;
        }
    }

    async fn on_tick(&mut self) {
        self.flush().await;
    }

    async fn shutdown(&mut self) {
        self.flush().await;
    }
}

// ---------------------------------------------------------------------------
// BufferedAuditSink
// ---------------------------------------------------------------------------

/// Audit sink that hands records to a background batch writer.
///
/// Emission only waits for queue capacity, not for the write. Call
/// [`shutdown`](Self::shutdown) to flush before exit.
pub struct BufferedAuditSink<W: AuditRecordWriter> {
    worker: BackgroundWorker<AuditBatcher<W>>,
    clock: Arc<dyn ClockSource>,
}

impl<W: AuditRecordWriter> BufferedAuditSink<W> {
    /// Spawn the batch writer. Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(writer: W, config: &BufferedAuditConfig) -> Self {
        Self::start_with_clock(writer, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn start_with_clock(
        writer: W,
        config: &BufferedAuditConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let batcher = AuditBatcher {
            writer,
            pending: Vec::with_capacity(config.max_batch),
            max_batch: config.max_batch.max(1),
            max_pending: config.max_pending.max(config.max_batch),
        };
        Self {
            worker: BackgroundWorker::start(
                batcher,
                config.channel_capacity,
                config.flush_interval,
            ),
            clock,
        }
    }

    /// Flush buffered records and stop the worker.
    pub async fn shutdown(&self) {
        self.worker.stop().await;
    }

    async fn emit(&self, record: AuditRecord) -> anyhow::Result<()> {
        self.worker.submit(record).await
    }
}

#[async_trait]
impl<W: AuditRecordWriter> AuditSink for BufferedAuditSink<W> {
    async fn log_start(&self, ctx: &OperationContext) -> anyhow::Result<()> {
        self.emit(AuditRecord::start(ctx, self.clock.now())).await
    }

    async fn log_success(&self, ctx: &OperationContext, _result: &Value) -> anyhow::Result<()> {
        self.emit(AuditRecord::success(ctx, self.clock.now())).await
    }

    async fn log_failure(
        &self,
        ctx: &OperationContext,
        error: &GuardError,
        classification: Classification,
    ) -> anyhow::Result<()> {
        let record = AuditRecord::failure(ctx, self.clock.now(), classification, error.to_string());
        self.emit(record).await
    }

    async fn escalate(&self, ctx: &OperationContext, error: &GuardError) -> anyhow::Result<()> {
        self.emit(AuditRecord::escalation(ctx, self.clock.now(), error.to_string()))
            .await
    }
}
