use std::time::Duration;

use bastion_core::{Classification, ErrorTag, OperationContext};

use crate::config::ExecutorConfig;
use crate::error::GuardError;

/// Maps a failure to a handling recommendation.
///
/// | tag | classification |
/// |---|---|
/// | security | `CriticalEscalate` |
/// | infrastructure | `CriticalEscalate` (configurable, else `Fatal`) |
/// | transient, attempt < max | `Retryable` |
/// | anything else | `Fatal` |
#[derive(Debug, Clone)]
pub struct FailureClassifier {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    escalate_infrastructure: bool,
}

impl FailureClassifier {
    #[must_use]
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_backoff: Duration::from_millis(config.retry_base_backoff_ms),
            max_backoff: Duration::from_millis(config.retry_max_backoff_ms),
            escalate_infrastructure: config.escalate_infrastructure_failures,
        }
    }

    #[must_use]
    pub fn classify(&self, error: &GuardError, ctx: &OperationContext) -> Classification {
        match error.tag() {
            ErrorTag::Security => Classification::CriticalEscalate,
            ErrorTag::Infrastructure if self.escalate_infrastructure => {
                Classification::CriticalEscalate
            }
            ErrorTag::Transient if ctx.attempt() < self.max_attempts => Classification::Retryable,
            _ => Classification::Fatal,
        }
    }

    /// Delay before the attempt after `attempt`: `base * 2^(attempt - 1)`, capped.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
