//! Shipped [`AuditSink`](crate::traits::AuditSink) implementations.
//!
//! - [`TracingAuditSink`] writes each record to the structured log.
//! - [`BufferedAuditSink`] queues records to a background worker that writes
//!   them in batches through an [`AuditRecordWriter`].

mod buffered;
mod log_sink;

pub use buffered::{AuditRecordWriter, BufferedAuditConfig, BufferedAuditSink};
pub use log_sink::TracingAuditSink;
