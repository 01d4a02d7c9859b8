//! Structured results of policy checks and failure classification.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a policy check refused an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    InvalidInput,
    Unauthorized,
    RateLimited,
    IntegrityFailure,
}

impl DenialReason {
    /// Wire name of the reason (`"invalid_input"`, `"unauthorized"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::IntegrityFailure => "integrity_failure",
        }
    }

    /// Denials that indicate a security problem and must be escalated.
    #[must_use]
    pub fn is_security(self) -> bool {
        matches!(self, Self::Unauthorized | Self::IntegrityFailure)
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the policy gate. Denials are data, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResult {
    Allowed,
    Denied {
        reason: DenialReason,
        /// The rule, permission, or operation kind that was violated.
        violated_rule: String,
    },
}

impl PolicyResult {
    pub fn denied(reason: DenialReason, violated_rule: impl Into<String>) -> Self {
        Self::Denied {
            reason,
            violated_rule: violated_rule.into(),
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Recommendation for handling a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Transient failure under the attempt ceiling; safe to retry.
    Retryable,
    /// Security or infrastructure-critical failure; escalate out of band.
    CriticalEscalate,
    /// Log and propagate.
    Fatal,
}

impl Classification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::CriticalEscalate => "critical_escalate",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_reasons() {
        assert!(DenialReason::Unauthorized.is_security());
        assert!(DenialReason::IntegrityFailure.is_security());
        assert!(!DenialReason::RateLimited.is_security());
        assert!(!DenialReason::InvalidInput.is_security());
    }

    #[test]
    fn reasons_serialize_as_wire_names() {
        let json = serde_json::to_string(&DenialReason::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        assert_eq!(DenialReason::RateLimited.to_string(), "rate_limited");
    }

    #[test]
    fn denied_helper_builds_variant() {
        let result = PolicyResult::denied(DenialReason::Unauthorized, "content.create");
        assert!(!result.is_allowed());
        assert_eq!(
            result,
            PolicyResult::Denied {
                reason: DenialReason::Unauthorized,
                violated_rule: "content.create".into(),
            }
        );
    }
}
