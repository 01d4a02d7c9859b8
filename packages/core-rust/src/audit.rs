//! Immutable audit records, one per invocation phase.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::{CorrelationId, OperationContext};
use crate::outcome::Classification;

/// Phase of an invocation an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditPhase {
    Start,
    Success,
    Failure,
    SecurityEscalation,
}

impl AuditPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::SecurityEscalation => "security-escalation",
        }
    }
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit entry. Fields are public for reading; records are never
/// mutated after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub correlation_id: CorrelationId,
    pub phase: AuditPhase,
    pub operation_kind: String,
    pub actor_id: String,
    pub attempt: u32,
    /// Emission time in milliseconds since Unix epoch.
    pub recorded_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    fn for_phase(ctx: &OperationContext, phase: AuditPhase, recorded_at_ms: u64) -> Self {
        Self {
            correlation_id: ctx.correlation_id(),
            phase,
            operation_kind: ctx.operation_kind().to_string(),
            actor_id: ctx.actor().id.clone(),
            attempt: ctx.attempt(),
            recorded_at_ms,
            classification: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn start(ctx: &OperationContext, recorded_at_ms: u64) -> Self {
        Self::for_phase(ctx, AuditPhase::Start, recorded_at_ms)
    }

    #[must_use]
    pub fn success(ctx: &OperationContext, recorded_at_ms: u64) -> Self {
        Self::for_phase(ctx, AuditPhase::Success, recorded_at_ms)
    }

    #[must_use]
    pub fn failure(
        ctx: &OperationContext,
        recorded_at_ms: u64,
        classification: Classification,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            classification: Some(classification),
            detail: Some(detail.into()),
            ..Self::for_phase(ctx, AuditPhase::Failure, recorded_at_ms)
        }
    }

    #[must_use]
    pub fn escalation(
        ctx: &OperationContext,
        recorded_at_ms: u64,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            classification: Some(Classification::CriticalEscalate),
            detail: Some(detail.into()),
            ..Self::for_phase(ctx, AuditPhase::SecurityEscalation, recorded_at_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Actor;

    #[test]
    fn records_carry_context_identity() {
        let ctx = OperationContext::builder("content.publish", Actor::new("u-7"))
            .created_at_ms(10)
            .build()
            .unwrap();
        let record = AuditRecord::failure(&ctx, 99, Classification::Fatal, "boom");

        assert_eq!(record.correlation_id, ctx.correlation_id());
        assert_eq!(record.phase, AuditPhase::Failure);
        assert_eq!(record.operation_kind, "content.publish");
        assert_eq!(record.actor_id, "u-7");
        assert_eq!(record.recorded_at_ms, 99);
        assert_eq!(record.classification, Some(Classification::Fatal));
    }

    #[test]
    fn phase_serializes_kebab_case() {
        let json = serde_json::to_string(&AuditPhase::SecurityEscalation).unwrap();
        assert_eq!(json, "\"security-escalation\"");
    }

    #[test]
    fn start_record_omits_empty_fields() {
        let ctx = OperationContext::builder("content.create", Actor::new("u-1"))
            .build()
            .unwrap();
        let json = serde_json::to_value(AuditRecord::start(&ctx, 1)).unwrap();
        assert!(json.get("classification").is_none());
        assert!(json.get("detail").is_none());
        assert_eq!(json["phase"], "start");
    }
}
