//! Invocation context: who is running which operation, with what input.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{ClockSource, SystemClock};
use crate::error::ContextError;
use crate::value::{Payload, Value};

/// Identity invoking an operation: an id plus the roles and direct grants
/// used for permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub roles: BTreeSet<String>,
    /// Permissions granted to this actor directly, independent of roles.
    pub permissions: BTreeSet<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

/// Identifier tying together every audit and metrics record of one logical
/// invocation, retries included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Immutable description of a single invocation.
///
/// Built once per attempt via [`OperationContext::builder`]; a retry gets a fresh
/// context from [`OperationContext::next_attempt`] that keeps the correlation id.
/// The operation kind and correlation id are never empty.
#[derive(Debug, Clone)]
pub struct OperationContext {
    operation_kind: String,
    actor: Arc<Actor>,
    payload: Payload,
    required_permissions: BTreeSet<String>,
    created_at_ms: u64,
    correlation_id: CorrelationId,
    attempt: u32,
}

impl OperationContext {
    /// Starts building a context for `operation_kind` invoked by `actor`.
    pub fn builder(
        operation_kind: impl Into<String>,
        actor: impl Into<Arc<Actor>>,
    ) -> OperationContextBuilder {
        OperationContextBuilder {
            operation_kind: operation_kind.into(),
            actor: actor.into(),
            payload: Payload::new(),
            required_permissions: BTreeSet::new(),
            correlation_id: None,
            created_at_ms: None,
            attempt: 1,
        }
    }

    #[must_use]
    pub fn operation_kind(&self) -> &str {
        &self.operation_kind
    }

    #[must_use]
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn required_permissions(&self) -> &BTreeSet<String> {
        &self.required_permissions
    }

    /// Construction time in milliseconds since Unix epoch.
    #[must_use]
    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// 1-based attempt number within the correlation id.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Fresh context for the next retry: same correlation id, kind, actor, and
    /// payload; attempt incremented; new creation time read from `clock`.
    #[must_use]
    pub fn next_attempt(&self, clock: &dyn ClockSource) -> Self {
        Self {
            operation_kind: self.operation_kind.clone(),
            actor: Arc::clone(&self.actor),
            payload: self.payload.clone(),
            required_permissions: self.required_permissions.clone(),
            created_at_ms: clock.now(),
            correlation_id: self.correlation_id,
            attempt: self.attempt.saturating_add(1),
        }
    }
}

/// Builder for [`OperationContext`].
#[derive(Debug)]
pub struct OperationContextBuilder {
    operation_kind: String,
    actor: Arc<Actor>,
    payload: Payload,
    required_permissions: BTreeSet<String>,
    correlation_id: Option<CorrelationId>,
    created_at_ms: Option<u64>,
    attempt: u32,
}

impl OperationContextBuilder {
    /// Replaces the whole payload.
    #[must_use]
    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Sets a single payload field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn require_permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub fn require_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Joins an existing correlation id instead of generating one.
    #[must_use]
    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    #[must_use]
    pub fn created_at_ms(mut self, millis: u64) -> Self {
        self.created_at_ms = Some(millis);
        self
    }

    /// Sets the attempt number (1-based). Values below 1 are clamped to 1.
    #[must_use]
    pub fn attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt.max(1);
        self
    }

    /// Builds the context, reading the creation time from the system clock if
    /// none was set.
    ///
    /// # Errors
    ///
    /// Returns `ContextError` if the operation kind or actor id is blank, or the
    /// supplied correlation id is nil.
    pub fn build(self) -> Result<OperationContext, ContextError> {
        self.build_with_clock(&SystemClock)
    }

    /// Builds the context, reading the creation time from `clock` if none was set.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_with_clock(
        self,
        clock: &dyn ClockSource,
    ) -> Result<OperationContext, ContextError> {
        if self.operation_kind.trim().is_empty() {
            return Err(ContextError::EmptyOperationKind);
        }
        if self.actor.id.trim().is_empty() {
            return Err(ContextError::EmptyActorId);
        }
        let correlation_id = match self.correlation_id {
            Some(id) if id.as_uuid().is_nil() => return Err(ContextError::NilCorrelationId),
            Some(id) => id,
            None => CorrelationId::new(),
        };

        Ok(OperationContext {
            operation_kind: self.operation_kind,
            actor: self.actor,
            payload: self.payload,
            required_permissions: self.required_permissions,
            created_at_ms: self.created_at_ms.unwrap_or_else(|| clock.now()),
            correlation_id,
            attempt: self.attempt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn editor() -> Actor {
        Actor::new("user-1").with_role("editor")
    }

    #[test]
    fn build_generates_correlation_id_and_timestamp() {
        let clock = ManualClock::new(42);
        let ctx = OperationContext::builder("content.create", editor())
            .field("title", "Hello")
            .require_permission("content.create")
            .build_with_clock(&clock)
            .unwrap();

        assert_eq!(ctx.operation_kind(), "content.create");
        assert_eq!(ctx.created_at_ms(), 42);
        assert_eq!(ctx.attempt(), 1);
        assert!(!ctx.correlation_id().as_uuid().is_nil());
        assert_eq!(ctx.payload()["title"], Value::from("Hello"));
        assert!(ctx.required_permissions().contains("content.create"));
    }

    #[test]
    fn empty_operation_kind_is_rejected() {
        let err = OperationContext::builder("  ", editor()).build().unwrap_err();
        assert_eq!(err, ContextError::EmptyOperationKind);
    }

    #[test]
    fn empty_actor_is_rejected() {
        let err = OperationContext::builder("content.create", Actor::new(""))
            .build()
            .unwrap_err();
        assert_eq!(err, ContextError::EmptyActorId);
    }

    #[test]
    fn nil_correlation_id_is_rejected() {
        let err = OperationContext::builder("content.create", editor())
            .correlation_id(CorrelationId::from_uuid(Uuid::nil()))
            .build()
            .unwrap_err();
        assert_eq!(err, ContextError::NilCorrelationId);
    }

    #[test]
    fn next_attempt_keeps_correlation_id() {
        let clock = ManualClock::new(1_000);
        let first = OperationContext::builder("content.update", editor())
            .build_with_clock(&clock)
            .unwrap();
        clock.advance(500);
        let second = first.next_attempt(&clock);

        assert_eq!(second.correlation_id(), first.correlation_id());
        assert_eq!(second.attempt(), 2);
        assert_eq!(second.created_at_ms(), 1_500);
        assert_eq!(first.attempt(), 1);
    }

    #[test]
    fn correlation_id_parses_from_display() {
        let id = CorrelationId::new();
        let parsed: CorrelationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
