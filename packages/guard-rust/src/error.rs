//! Failure taxonomy of the guarded executor.

use std::fmt;

use bastion_core::{Classification, CorrelationId, DenialReason, ErrorTag, OperationError};

/// What interrupted an invocation from the caller's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The caller's cancellation token fired.
    Token,
    /// The invocation deadline elapsed.
    Deadline,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Token => "token",
            Self::Deadline => "deadline",
        })
    }
}

/// Discriminant of a [`GuardError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    PolicyViolation,
    ResultValidation,
    PersistenceFailure,
    OperationPanic,
    Cancelled,
    OperationFailed,
    Collaborator,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PolicyViolation => "policy_violation",
            Self::ResultValidation => "result_validation",
            Self::PersistenceFailure => "persistence_failure",
            Self::OperationPanic => "operation_panic",
            Self::Cancelled => "cancelled",
            Self::OperationFailed => "operation_failed",
            Self::Collaborator => "collaborator",
        }
    }
}

/// Why a guarded invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("policy violation: {reason} ({violated_rule})")]
    PolicyViolation {
        reason: DenialReason,
        violated_rule: String,
    },
    #[error("result validation failed: {reason}")]
    ResultValidation { reason: String },
    #[error("commit failed: {source}")]
    PersistenceFailure {
        #[source]
        source: anyhow::Error,
    },
    #[error("operation panicked: {message}")]
    OperationPanic { message: String },
    #[error("operation cancelled by {cause}")]
    Cancelled { cause: CancelCause },
    #[error("operation failed: {0}")]
    Operation(#[from] OperationError),
    #[error("{collaborator} failed: {source}")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl GuardError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PolicyViolation { .. } => FailureKind::PolicyViolation,
            Self::ResultValidation { .. } => FailureKind::ResultValidation,
            Self::PersistenceFailure { .. } => FailureKind::PersistenceFailure,
            Self::OperationPanic { .. } => FailureKind::OperationPanic,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::Operation(_) => FailureKind::OperationFailed,
            Self::Collaborator { .. } => FailureKind::Collaborator,
        }
    }

    /// Classification hint carried by this error.
    ///
    /// Collaborator errors are transient unless their source chain holds a
    /// tagged `OperationError`.
    #[must_use]
    pub fn tag(&self) -> ErrorTag {
        match self {
            Self::PolicyViolation { reason, .. } if reason.is_security() => ErrorTag::Security,
            Self::PersistenceFailure { .. } => ErrorTag::Infrastructure,
            Self::Operation(err) => err.tag(),
            Self::Collaborator { source, .. } => source
                .chain()
                .find_map(|cause| cause.downcast_ref::<OperationError>())
                .map_or(ErrorTag::Transient, OperationError::tag),
            Self::PolicyViolation { .. }
            | Self::ResultValidation { .. }
            | Self::OperationPanic { .. }
            | Self::Cancelled { .. } => ErrorTag::Untagged,
        }
    }

    /// Denial reason, for policy violations.
    #[must_use]
    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            Self::PolicyViolation { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Error returned to callers of the executor: the failure, its
/// classification, and the correlation id of the invocation.
#[derive(Debug, thiserror::Error)]
#[error("{operation_kind} [{correlation_id}] attempt {attempt} failed ({classification}): {error}")]
pub struct ExecutionFailure {
    pub correlation_id: CorrelationId,
    pub operation_kind: String,
    pub attempt: u32,
    pub classification: Classification,
    #[source]
    pub error: GuardError,
}

impl ExecutionFailure {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.error.kind()
    }
}

/// Result of a full executor run, as data.
#[derive(Debug)]
pub enum OperationOutcome<T> {
    Success(T),
    Failure {
        classification: Classification,
        error: GuardError,
        correlation_id: CorrelationId,
    },
}

impl<T> OperationOutcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl<T> From<Result<T, ExecutionFailure>> for OperationOutcome<T> {
    fn from(result: Result<T, ExecutionFailure>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure {
                classification: failure.classification,
                error: failure.error,
                correlation_id: failure.correlation_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_denials_are_tagged_security() {
        let unauthorized = GuardError::PolicyViolation {
            reason: DenialReason::Unauthorized,
            violated_rule: "content.create".into(),
        };
        let rate_limited = GuardError::PolicyViolation {
            reason: DenialReason::RateLimited,
            violated_rule: "content.create".into(),
        };
        assert_eq!(unauthorized.tag(), ErrorTag::Security);
        assert_eq!(rate_limited.tag(), ErrorTag::Untagged);
        assert_eq!(unauthorized.denial_reason(), Some(DenialReason::Unauthorized));
    }

    #[test]
    fn persistence_failure_is_infrastructure() {
        let err = GuardError::PersistenceFailure {
            source: anyhow::anyhow!("deadlock"),
        };
        assert_eq!(err.tag(), ErrorTag::Infrastructure);
        assert_eq!(err.kind(), FailureKind::PersistenceFailure);
    }

    #[test]
    fn collaborator_errors_default_to_transient() {
        let err = GuardError::Collaborator {
            collaborator: "transaction_manager",
            source: anyhow::anyhow!("pool exhausted"),
        };
        assert_eq!(err.tag(), ErrorTag::Transient);
    }

    #[test]
    fn collaborator_errors_keep_operation_tag() {
        let source = anyhow::Error::new(OperationError::security("tampered audit chain"))
            .context("audit sink rejected record");
        let err = GuardError::Collaborator {
            collaborator: "audit_sink",
            source,
        };
        assert_eq!(err.tag(), ErrorTag::Security);
    }

    #[test]
    fn cancellation_is_untagged() {
        let err = GuardError::Cancelled {
            cause: CancelCause::Deadline,
        };
        assert_eq!(err.tag(), ErrorTag::Untagged);
        assert_eq!(err.to_string(), "operation cancelled by deadline");
    }

    #[test]
    fn outcome_from_result() {
        let ok: OperationOutcome<u32> = Ok::<_, ExecutionFailure>(7).into();
        assert!(ok.is_success());

        let failure = ExecutionFailure {
            correlation_id: CorrelationId::new(),
            operation_kind: "content.create".into(),
            attempt: 1,
            classification: Classification::Fatal,
            error: GuardError::ResultValidation {
                reason: "empty".into(),
            },
        };
        let outcome: OperationOutcome<u32> = Err(failure).into();
        assert!(matches!(
            outcome,
            OperationOutcome::Failure {
                classification: Classification::Fatal,
                ..
            }
        ));
    }
}
