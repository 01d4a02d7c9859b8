use async_trait::async_trait;
use bastion_core::{Classification, OperationContext, Value};
use tracing::{error, info, warn};

use crate::error::GuardError;
use crate::traits::AuditSink;

/// Audit target; route it to a dedicated appender to keep the trail separate.
pub const AUDIT_TARGET: &str = "bastion::audit";

/// Writes audit records as tracing events under [`AUDIT_TARGET`].
///
/// Start and success go out at `INFO`, failures at `WARN`, and security
/// escalations at `ERROR`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_start(&self, ctx: &OperationContext) -> anyhow::Result<()> {
        info!(
            target: AUDIT_TARGET,
            phase = "start",
            operation = ctx.operation_kind(),
            actor = %ctx.actor().id,
            correlation_id = %ctx.correlation_id(),
            attempt = ctx.attempt(),
            "operation started"
        );
        Ok(())
    }

    async fn log_success(&self, ctx: &OperationContext, result: &Value) -> anyhow::Result<()> {
        info!(
            target: AUDIT_TARGET,
            phase = "success",
            operation = ctx.operation_kind(),
            actor = %ctx.actor().id,
            correlation_id = %ctx.correlation_id(),
            attempt = ctx.attempt(),
            result_type = %result.value_type(),
            "operation succeeded"
        );
        Ok(())
    }

    async fn log_failure(
        &self,
        ctx: &OperationContext,
        error: &GuardError,
        classification: Classification,
    ) -> anyhow::Result<()> {
        warn!(
            target: AUDIT_TARGET,
            phase = "failure",
            operation = ctx.operation_kind(),
            actor = %ctx.actor().id,
            correlation_id = %ctx.correlation_id(),
            attempt = ctx.attempt(),
            kind = error.kind().as_str(),
            classification = classification.as_str(),
            error = %error,
            "operation failed"
        );
        Ok(())
    }

    async fn escalate(&self, ctx: &OperationContext, error: &GuardError) -> anyhow::Result<()> {
        error!(
            target: AUDIT_TARGET,
            phase = "security-escalation",
            operation = ctx.operation_kind(),
            actor = %ctx.actor().id,
            correlation_id = %ctx.correlation_id(),
            attempt = ctx.attempt(),
            kind = error.kind().as_str(),
            error = %error,
            "critical failure escalated"
        );
        Ok(())
    }
}
