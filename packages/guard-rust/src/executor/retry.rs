use std::future::Future;

use bastion_core::{Classification, OperationContext, OperationError};
use serde::Serialize;
use tracing::{info, warn};

use super::{CancelScope, GuardedExecutor};
use crate::error::ExecutionFailure;
use crate::validator::ResultRules;

impl GuardedExecutor {
    /// Run the protocol, retrying `Retryable` failures with exponential backoff.
    ///
    /// Each attempt gets a fresh context from [`OperationContext::next_attempt`]
    /// (same correlation id, incremented attempt) and a fresh operation from
    /// `make_operation`. Every attempt re-runs the full protocol, policy checks
    /// included. The retry loop stops when the scope's token fires during a
    /// backoff; the last failure is returned.
    ///
    /// # Errors
    ///
    /// Returns the failure of the final attempt.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        rules: &ResultRules,
        scope: &CancelScope,
        mut make_operation: F,
    ) -> Result<T, ExecutionFailure>
    where
        T: Serialize + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, OperationError>> + Send,
    {
        let mut current = ctx.clone();
        loop {
            let failure = match self.execute(&current, rules, scope, &mut make_operation).await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };
            if failure.classification != Classification::Retryable {
                return Err(failure);
            }

            let delay = self.classifier.backoff(current.attempt());
            info!(
                operation = current.operation_kind(),
                correlation_id = %current.correlation_id(),
                attempt = current.attempt(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying after transient failure"
            );
            if scope.sleep(delay).await.is_err() {
                warn!(
                    correlation_id = %current.correlation_id(),
                    "retry abandoned: cancelled during backoff"
                );
                return Err(failure);
            }
            current = current.next_attempt(self.clock.as_ref());
        }
    }
}
