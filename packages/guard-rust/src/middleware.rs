//! Tower integration: run any `Service` call under the guarded protocol.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bastion_core::{OperationContext, OperationError};
use serde::Serialize;
use tower::{Layer, Service, ServiceExt};

use crate::error::ExecutionFailure;
use crate::executor::{CancelScope, GuardedExecutor};
use crate::validator::ResultRules;

/// Requests that carry the context they should be guarded under.
pub trait GuardedRequest {
    fn context(&self) -> &OperationContext;
}

// ---------------------------------------------------------------------------
// GuardLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps each call of the inner service in
/// [`GuardedExecutor::execute`].
#[derive(Clone)]
pub struct GuardLayer {
    executor: Arc<GuardedExecutor>,
    rules: ResultRules,
    scope: CancelScope,
}

impl GuardLayer {
    #[must_use]
    pub fn new(executor: Arc<GuardedExecutor>, rules: ResultRules) -> Self {
        Self {
            executor,
            rules,
            scope: CancelScope::none(),
        }
    }

    /// Scope applied to every call, e.g. a server-wide shutdown token.
    #[must_use]
    pub fn with_scope(mut self, scope: CancelScope) -> Self {
        self.scope = scope;
        self
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            executor: Arc::clone(&self.executor),
            rules: self.rules.clone(),
            scope: self.scope.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// GuardService
// ---------------------------------------------------------------------------

/// Service wrapper produced by [`GuardLayer`].
///
/// Readiness of the inner service is awaited inside the guarded operation, so
/// a failing `poll_ready` surfaces as a classified failure with a context.
#[derive(Clone)]
pub struct GuardService<S> {
    inner: S,
    executor: Arc<GuardedExecutor>,
    rules: ResultRules,
    scope: CancelScope,
}

impl<S, R> Service<R> for GuardService<S>
where
    R: GuardedRequest + Send + 'static,
    S: Service<R> + Clone + Send + 'static,
    S::Response: Serialize + Send + 'static,
    S::Error: Into<OperationError> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = ExecutionFailure;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, ExecutionFailure>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: R) -> Self::Future {
        let ctx = request.context().clone();
        let inner = self.inner.clone();
        let executor = Arc::clone(&self.executor);
        let rules = self.rules.clone();
        let scope = self.scope.clone();

        Box::pin(async move {
            executor
                .execute(&ctx, &rules, &scope, move || async move {
                    inner.oneshot(request).await.map_err(Into::into)
                })
                .await
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
