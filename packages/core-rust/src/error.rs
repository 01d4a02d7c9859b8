//! Error types shared by callers and the executor.

use serde::{Deserialize, Serialize};

/// Tag attached to an error that drives failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    /// Authorization or integrity problem; always escalated.
    Security,
    /// Timeout or temporary unavailability; eligible for retry.
    Transient,
    /// Infrastructure failure that must reach an operator (e.g. failed commit).
    Infrastructure,
    /// No classification hint.
    Untagged,
}

impl ErrorTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Transient => "transient",
            Self::Infrastructure => "infrastructure",
            Self::Untagged => "untagged",
        }
    }
}

/// Error returned by a wrapped business operation.
///
/// Operations use the tagged constructors to tell the classifier how to treat
/// the failure; `?` on an `anyhow::Error` yields an untagged error (or recovers
/// the original tag if the `anyhow::Error` wraps an `OperationError`).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct OperationError {
    tag: ErrorTag,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl OperationError {
    pub fn new(tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            tag,
            message: message.into(),
            source: None,
        }
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::new(ErrorTag::Security, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorTag::Transient, message)
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::new(ErrorTag::Infrastructure, message)
    }

    pub fn untagged(message: impl Into<String>) -> Self {
        Self::new(ErrorTag::Untagged, message)
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn tag(&self) -> ErrorTag {
        self.tag
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<OperationError>() {
            Ok(op) => op,
            Err(err) => Self {
                tag: ErrorTag::Untagged,
                message: err.to_string(),
                source: Some(err),
            },
        }
    }
}

/// Errors from building an `OperationContext`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("operation kind must not be empty")]
    EmptyOperationKind,
    #[error("actor id must not be empty")]
    EmptyActorId,
    #[error("correlation id must not be nil")]
    NilCorrelationId,
}

/// Errors from parsing pipe-delimited rule notation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    #[error("unknown rule `{rule}`")]
    UnknownRule { rule: String },
    #[error("rule `{rule}` requires an argument")]
    MissingArgument { rule: String },
    #[error("rule `{rule}` has an invalid argument `{arg}`")]
    InvalidArgument { rule: String, arg: String },
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn anyhow_roundtrip_keeps_tag() {
        let original = OperationError::transient("db busy");
        let wrapped = anyhow::Error::new(original);
        let recovered = OperationError::from(wrapped);
        assert_eq!(recovered.tag(), ErrorTag::Transient);
        assert_eq!(recovered.message(), "db busy");
    }

    #[test]
    fn plain_anyhow_is_untagged_with_source() {
        let err = OperationError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.tag(), ErrorTag::Untagged);
        assert_eq!(err.to_string(), "boom");
        assert!(err.source().is_some());
    }

    #[test]
    fn with_source_exposes_cause() {
        let err = OperationError::security("signature mismatch")
            .with_source(anyhow::anyhow!("digest differs"));
        assert_eq!(err.source().unwrap().to_string(), "digest differs");
    }

    #[test]
    fn displays_message_without_cause() {
        let err = OperationError::infrastructure("replica lag exceeded");
        assert_eq!(err.to_string(), "replica lag exceeded");
        assert!(err.source().is_none());
    }
}
