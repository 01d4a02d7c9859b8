//! Pre-execution policy checks.
//!
//! [`PolicyGate`] runs four checks in a fixed order and stops at the first
//! denial:
//!
//! 1. structural validation of the payload against the kind's input rules
//! 2. permissions (context requirements plus the kind's own)
//! 3. rate limiting keyed by actor and operation kind (see [`rate_limit_key`])
//! 4. payload integrity, for kinds that register a verifier
//!
//! Denials come back as [`PolicyResult::Denied`]; the gate never returns errors.

pub mod integrity;
pub mod permissions;
pub mod rate_limit;

use std::collections::BTreeSet;
use std::sync::Arc;

use bastion_core::{DenialReason, OperationContext, PolicyResult, ValidationRules};
use dashmap::DashMap;
use tracing::warn;

use crate::config::{ExecutorConfig, RateLimit};
use crate::traits::{IntegrityVerifier, PermissionChecker, RateLimiter};

pub use integrity::{DigestAlgorithm, DigestIntegrityVerifier};
pub use permissions::RolePermissionChecker;
pub use rate_limit::{InMemoryRateLimiter, RateLimiterConfig};

// ---------------------------------------------------------------------------
// OperationPolicy
// ---------------------------------------------------------------------------

/// Checks registered for one operation kind.
#[derive(Clone, Default)]
pub struct OperationPolicy {
    /// Structural rules for the payload. Empty means any payload passes.
    pub input_rules: ValidationRules,
    /// Permissions required on top of those named by the context.
    pub required_permissions: BTreeSet<String>,
    /// Overrides the gate's default rate limit.
    pub rate_limit: Option<RateLimit>,
    /// Enables integrity verification for this kind.
    pub integrity: Option<Arc<dyn IntegrityVerifier>>,
}

impl OperationPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn input_rules(mut self, rules: ValidationRules) -> Self {
        self.input_rules = rules;
        self
    }

    #[must_use]
    pub fn require_permission(mut self, permission: impl Into<String>) -> Self {
        self.required_permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    #[must_use]
    pub fn integrity(mut self, verifier: Arc<dyn IntegrityVerifier>) -> Self {
        self.integrity = Some(verifier);
        self
    }
}

impl std::fmt::Debug for OperationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPolicy")
            .field("input_rules", &self.input_rules)
            .field("required_permissions", &self.required_permissions)
            .field("rate_limit", &self.rate_limit)
            .field("integrity", &self.integrity.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PolicyGate
// ---------------------------------------------------------------------------

/// Runs the pre-execution checks for a context.
///
/// Collaborators are injected at construction. Policies are registered per
/// operation kind; unregistered kinds get empty input rules and the default
/// rate limit.
pub struct PolicyGate {
    permissions: Arc<dyn PermissionChecker>,
    rate_limiter: Arc<dyn RateLimiter>,
    default_rate_limit: RateLimit,
    policies: DashMap<String, Arc<OperationPolicy>>,
}

impl PolicyGate {
    #[must_use]
    pub fn new(
        permissions: Arc<dyn PermissionChecker>,
        rate_limiter: Arc<dyn RateLimiter>,
        default_rate_limit: RateLimit,
    ) -> Self {
        Self {
            permissions,
            rate_limiter,
            default_rate_limit,
            policies: DashMap::new(),
        }
    }

    /// Gate using the configured default rate limit.
    #[must_use]
    pub fn from_config(
        config: &ExecutorConfig,
        permissions: Arc<dyn PermissionChecker>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self::new(permissions, rate_limiter, config.default_rate_limit)
    }

    /// Register (or replace) the policy for an operation kind.
    pub fn register(&self, operation_kind: impl Into<String>, policy: OperationPolicy) {
        self.policies.insert(operation_kind.into(), Arc::new(policy));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with_policy(self, operation_kind: impl Into<String>, policy: OperationPolicy) -> Self {
        self.register(operation_kind, policy);
        self
    }

    /// Policy in effect for `operation_kind`.
    #[must_use]
    pub fn policy_for(&self, operation_kind: &str) -> Arc<OperationPolicy> {
        self.policies
            .get(operation_kind)
            .map_or_else(|| Arc::new(OperationPolicy::default()), |entry| Arc::clone(entry.value()))
    }

    /// Run all checks for `ctx`, stopping at the first denial.
    pub async fn validate(&self, ctx: &OperationContext) -> PolicyResult {
        // Cloned out of the map so no shard lock is held across an await.
        let policy = self.policy_for(ctx.operation_kind());

        if let Err(violation) = policy.input_rules.validate(ctx.payload()) {
            return deny(ctx, DenialReason::InvalidInput, violation.rule);
        }

        let required: BTreeSet<String> = ctx
            .required_permissions()
            .union(&policy.required_permissions)
            .cloned()
            .collect();
        if !required.is_empty() && !self.permissions.has_permissions(ctx.actor(), &required).await {
            let missing = self.first_missing_permission(ctx, &required).await;
            return deny(ctx, DenialReason::Unauthorized, missing);
        }

        let limit = policy.rate_limit.unwrap_or(self.default_rate_limit);
        if limit.validate().is_err() {
            warn!(
                operation = ctx.operation_kind(),
                limit = limit.limit,
                window_ms = limit.window_ms,
                "unusable rate limit registered; denying"
            );
            return deny(ctx, DenialReason::RateLimited, ctx.operation_kind());
        }
        let key = rate_limit_key(&ctx.actor().id, ctx.operation_kind());
        if !self
            .rate_limiter
            .check_and_increment(&key, limit.limit, limit.window())
            .await
        {
            return deny(ctx, DenialReason::RateLimited, ctx.operation_kind());
        }

        if let Some(verifier) = &policy.integrity {
            if !verifier.verify(ctx.payload()).await {
                return deny(ctx, DenialReason::IntegrityFailure, ctx.operation_kind());
            }
        }

        PolicyResult::Allowed
    }

    /// Narrows a failed set check down to one permission for the denial.
    /// Falls back to the whole set when no single permission fails alone.
    async fn first_missing_permission(
        &self,
        ctx: &OperationContext,
        required: &BTreeSet<String>,
    ) -> String {
        for permission in required {
            let single = BTreeSet::from([permission.clone()]);
            if !self.permissions.has_permissions(ctx.actor(), &single).await {
                return permission.clone();
            }
        }
        required.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Rate-limit key for an `(actor, operation kind)` pair.
///
/// The actor id is length-prefixed, so ids and kinds containing `:` cannot
/// collide: `("team:ops", "publish")` and `("team", "ops:publish")` differ.
#[must_use]
pub fn rate_limit_key(actor_id: &str, operation_kind: &str) -> String {
    format!("{}:{actor_id}:{operation_kind}", actor_id.len())
}

fn deny(
    ctx: &OperationContext,
    reason: DenialReason,
    violated_rule: impl Into<String>,
) -> PolicyResult {
    let violated_rule = violated_rule.into();
    warn!(
        operation = ctx.operation_kind(),
        actor = %ctx.actor().id,
        correlation_id = %ctx.correlation_id(),
        reason = reason.as_str(),
        rule = %violated_rule,
        "policy denied operation"
    );
    PolicyResult::denied(reason, violated_rule)
}
