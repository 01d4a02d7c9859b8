use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use bastion_core::{Actor, Classification, OperationContext, Payload, Value};

use crate::error::GuardError;

/// Pluggable unit of work. Every executor invocation opens exactly one.
/// Implementations: SQL connection pools, in-memory stores (tests).
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Open a new transaction.
    async fn begin(&self) -> anyhow::Result<Box<dyn Transaction>>;
}

/// A live transaction handle.
///
/// `rollback` must be idempotent and safe to call after a failed `commit`.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(&mut self) -> anyhow::Result<()>;

    async fn rollback(&mut self) -> anyhow::Result<()>;
}

/// Append-only audit trail. Records are never mutated once emitted.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_start(&self, ctx: &OperationContext) -> anyhow::Result<()>;

    async fn log_success(&self, ctx: &OperationContext, result: &Value) -> anyhow::Result<()>;

    async fn log_failure(
        &self,
        ctx: &OperationContext,
        error: &GuardError,
        classification: Classification,
    ) -> anyhow::Result<()>;

    /// Out-of-band security escalation channel.
    async fn escalate(&self, ctx: &OperationContext, error: &GuardError) -> anyhow::Result<()>;
}

/// Timing and outcome recording. Synchronous so it can run from a drop guard.
pub trait MetricsSink: Send + Sync {
    fn record_duration(&self, operation_kind: &str, seconds: f64);

    fn record_outcome(&self, operation_kind: &str, success: bool);
}

/// Decides whether an actor holds every permission in a set.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn has_permissions(&self, actor: &Actor, permissions: &BTreeSet<String>) -> bool;
}

/// Counts attempts per key. Returns `false` once `limit` is reached within
/// `window`; otherwise records the attempt and returns `true`.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_and_increment(&self, key: &str, limit: u32, window: Duration) -> bool;
}

/// Checks a payload against its embedded digest or signature.
#[async_trait]
pub trait IntegrityVerifier: Send + Sync {
    async fn verify(&self, payload: &Payload) -> bool;
}
