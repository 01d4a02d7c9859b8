use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CancelCause;

/// Caller-supplied cancellation.
///
/// The token spans everything the scope is passed to, including every attempt
/// and backoff of a retry loop. The deadline is armed afresh for each attempt
/// and bounds only that attempt's policy check and operation; backoff sleeps
/// are not counted against it. An explicit deadline overrides the executor's
/// configured default.
#[derive(Debug, Clone, Default)]
pub struct CancelScope {
    token: Option<CancellationToken>,
    deadline: Option<Duration>,
}

impl CancelScope {
    /// No token, executor default deadline.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Fix the deadline to an instant, starting now.
    pub(crate) fn activate(&self, default_deadline: Option<Duration>) -> ActiveScope<'_> {
        ActiveScope {
            token: self.token.as_ref(),
            deadline: self
                .deadline
                .or(default_deadline)
                .and_then(|deadline| Instant::now().checked_add(deadline)),
        }
    }

    /// Sleep for `delay` unless the token fires first.
    pub(crate) async fn sleep(&self, delay: Duration) -> Result<(), CancelCause> {
        match &self.token {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(CancelCause::Token),
                () = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

/// A scope bound to an absolute deadline for the duration of one invocation.
pub(crate) struct ActiveScope<'a> {
    token: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
}

impl ActiveScope<'_> {
    /// Drive `fut` to completion unless the token fires or the deadline passes.
    /// An interrupted future is dropped.
    pub(crate) async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CancelCause> {
        let timed = async {
            match self.deadline {
                Some(at) => tokio::time::timeout_at(at, fut)
                    .await
                    .map_err(|_| CancelCause::Deadline),
                None => Ok(fut.await),
            }
        };
        match self.token {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(CancelCause::Token),
                result = timed => result,
            },
            None => timed.await,
        }
    }
}
