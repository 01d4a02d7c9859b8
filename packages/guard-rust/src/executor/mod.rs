//! The guarded executor: wraps a unit of work in policy checks, a transaction,
//! result validation, audit, metrics, and failure classification.
//!
//! Every invocation follows the same order:
//!
//! 1. open a transaction
//! 2. policy gate (denial rolls back and fails)
//! 3. audit start
//! 4. run the operation (panics are caught)
//! 5. validate the result
//! 6. commit
//! 7. audit success, record success metrics
//! 8. on any failure: roll back, classify, audit failure, record failure
//!    metrics, escalate when critical
//!
//! Steps 2 and 4 run under the caller's [`CancelScope`].

mod guard;
mod retry;
mod scope;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bastion_core::{
    Classification, ClockSource, OperationContext, OperationError, PolicyResult, SystemClock, Value,
};
use futures_util::FutureExt;
use serde::Serialize;
use tracing::{error, field, info, info_span, warn, Instrument, Span};

use crate::classifier::FailureClassifier;
use crate::config::{ConfigError, ExecutorConfig};
use crate::error::{ExecutionFailure, GuardError};
use crate::policy::PolicyGate;
use crate::traits::{AuditSink, MetricsSink, TransactionManager};
use crate::validator::{ResultRules, ResultValidator, Verdict};

use self::guard::{MetricsTimer, TxGuard};
use self::scope::ActiveScope;

pub use self::scope::CancelScope;

/// Counter bumped whenever an audit emission fails and is logged instead of
/// surfaced.
pub const AUDIT_EMIT_FAILURES: &str = "bastion_audit_emit_failures_total";

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Side-effecting collaborators injected into the executor.
#[derive(Clone)]
pub struct Collaborators {
    pub transactions: Arc<dyn TransactionManager>,
    pub audit: Arc<dyn AuditSink>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Collaborators {
    #[must_use]
    pub fn new(
        transactions: Arc<dyn TransactionManager>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            transactions,
            audit,
            metrics,
        }
    }
}

// ---------------------------------------------------------------------------
// GuardedExecutor
// ---------------------------------------------------------------------------

/// Runs caller-supplied operations under the guarded protocol.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct GuardedExecutor {
    gate: Arc<PolicyGate>,
    collaborators: Collaborators,
    validator: ResultValidator,
    classifier: FailureClassifier,
    clock: Arc<dyn ClockSource>,
    default_deadline: Option<Duration>,
}

impl GuardedExecutor {
    /// Build an executor after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the configuration is inconsistent.
    pub fn new(
        config: &ExecutorConfig,
        gate: PolicyGate,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            gate: Arc::new(gate),
            collaborators,
            validator: ResultValidator,
            classifier: FailureClassifier::new(config),
            clock: Arc::new(SystemClock),
            default_deadline: config.operation_timeout(),
        })
    }

    /// Clock used to stamp retry contexts.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn gate(&self) -> &PolicyGate {
        &self.gate
    }

    #[must_use]
    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    /// Run `operation` once under the guarded protocol.
    ///
    /// The operation's result must serialize to a [`Value`] that passes `rules`.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutionFailure`] carrying the classified [`GuardError`]
    /// when any step fails. The transaction is rolled back in every such case.
    pub async fn execute<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        rules: &ResultRules,
        scope: &CancelScope,
        operation: F,
    ) -> Result<T, ExecutionFailure>
    where
        T: Serialize + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        let span = info_span!(
            "guarded_operation",
            operation = ctx.operation_kind(),
            correlation_id = %ctx.correlation_id(),
            attempt = ctx.attempt(),
            duration_ms = field::Empty,
            outcome = field::Empty,
        );
        self.run(ctx, rules, scope, operation).instrument(span).await
    }

    async fn run<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        rules: &ResultRules,
        scope: &CancelScope,
        operation: F,
    ) -> Result<T, ExecutionFailure>
    where
        T: Serialize + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        let metrics = Arc::clone(&self.collaborators.metrics);
        let timer = MetricsTimer::start(metrics, ctx.operation_kind());
        let active = scope.activate(self.default_deadline);

        let mut tx = match self.collaborators.transactions.begin().await {
            Ok(tx) => TxGuard::new(tx, ctx.correlation_id()),
            Err(source) => {
                let error = GuardError::Collaborator {
                    collaborator: "transaction_manager",
                    source,
                };
                return Err(self.fail(ctx, None, error, timer).await);
            }
        };

        match self.protocol(ctx, rules, &active, &mut tx, operation).await {
            Ok((value, observed)) => {
                if let Err(e) = self.collaborators.audit.log_success(ctx, &observed).await {
                    audit_emit_failed(ctx, "success", &e);
                }
                let elapsed = timer.finish(true);
                record_span_outcome(elapsed, "ok");
                info!(
                    operation = ctx.operation_kind(),
                    duration_ms = duration_ms(elapsed),
                    "guarded operation complete"
                );
                Ok(value)
            }
            Err(error) => Err(self.fail(ctx, Some(&mut tx), error, timer).await),
        }
    }

    /// Steps 2 through 6. Returns the result and its observed form.
    async fn protocol<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        rules: &ResultRules,
        active: &ActiveScope<'_>,
        tx: &mut TxGuard,
        operation: F,
    ) -> Result<(T, Value), GuardError>
    where
        T: Serialize + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        match active.run(self.gate.validate(ctx)).await {
            Err(cause) => return Err(GuardError::Cancelled { cause }),
            Ok(PolicyResult::Denied {
                reason,
                violated_rule,
            }) => {
                return Err(GuardError::PolicyViolation {
                    reason,
                    violated_rule,
                })
            }
            Ok(PolicyResult::Allowed) => {}
        }

        self.collaborators
            .audit
            .log_start(ctx)
            .await
            .map_err(|source| GuardError::Collaborator {
                collaborator: "audit_sink",
                source,
            })?;

        // The closure is called inside the guarded future so a panic while
        // building the operation is caught too.
        let guarded = AssertUnwindSafe(async move { operation().await }).catch_unwind();
        let value = match active.run(guarded).await {
            Err(cause) => return Err(GuardError::Cancelled { cause }),
            Ok(Err(panic)) => {
                return Err(GuardError::OperationPanic {
                    message: panic_message(panic.as_ref()),
                })
            }
            Ok(Ok(result)) => result?,
        };

        let observed = Value::from_serialize(&value).map_err(|e| GuardError::ResultValidation {
            reason: format!("result is not representable: {e}"),
        })?;
        if let Verdict::Invalid { reason } = self.validator.verify(&observed, rules) {
            return Err(GuardError::ResultValidation { reason });
        }

        tx.commit()
            .await
            .map_err(|source| GuardError::PersistenceFailure { source })?;

        Ok((value, observed))
    }

    /// Step 8.
    async fn fail(
        &self,
        ctx: &OperationContext,
        tx: Option<&mut TxGuard>,
        error: GuardError,
        timer: MetricsTimer,
    ) -> ExecutionFailure {
        if let Some(tx) = tx {
            tx.rollback().await;
        }

        let classification = self.classifier.classify(&error, ctx);
        match classification {
            Classification::CriticalEscalate => error!(
                operation = ctx.operation_kind(),
                correlation_id = %ctx.correlation_id(),
                kind = error.kind().as_str(),
                error = %error,
                "guarded operation failed critically"
            ),
            Classification::Retryable | Classification::Fatal => warn!(
                operation = ctx.operation_kind(),
                correlation_id = %ctx.correlation_id(),
                kind = error.kind().as_str(),
                classification = classification.as_str(),
                error = %error,
                "guarded operation failed"
            ),
        }

        if let Err(e) = self
            .collaborators
            .audit
            .log_failure(ctx, &error, classification)
            .await
        {
            audit_emit_failed(ctx, "failure", &e);
        }

        let elapsed = timer.finish(false);
        record_span_outcome(elapsed, classification.as_str());

        if classification == Classification::CriticalEscalate {
            if let Err(e) = self.collaborators.audit.escalate(ctx, &error).await {
                audit_emit_failed(ctx, "escalation", &e);
            }
        }

        ExecutionFailure {
            correlation_id: ctx.correlation_id(),
            operation_kind: ctx.operation_kind().to_string(),
            attempt: ctx.attempt(),
            classification,
            error,
        }
    }
}

fn audit_emit_failed(ctx: &OperationContext, phase: &'static str, e: &anyhow::Error) {
    error!(
        operation = ctx.operation_kind(),
        correlation_id = %ctx.correlation_id(),
        phase,
        error = %e,
        "audit emission failed"
    );
    ::metrics::counter!(AUDIT_EMIT_FAILURES, "phase" => phase).increment(1);
}

fn record_span_outcome(elapsed: Duration, outcome: &'static str) {
    let span = Span::current();
    span.record("duration_ms", duration_ms(elapsed));
    span.record("outcome", outcome);
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
