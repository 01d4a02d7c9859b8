//! Recording fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bastion_core::{Actor, Classification, CorrelationId, ManualClock, OperationContext, Value};
use bastion_guard::policy::{InMemoryRateLimiter, RateLimiterConfig};
use bastion_guard::{
    AuditSink, Collaborators, ExecutorConfig, FailureKind, GuardError, GuardedExecutor,
    MetricsSink, PermissionChecker, PolicyGate, RateLimit, Transaction, TransactionManager,
};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Store: staged writes become visible only on commit
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Store {
    staged: Mutex<Vec<String>>,
    committed: Mutex<Vec<String>>,
    pub begins: AtomicU32,
    pub commits: AtomicU32,
    pub rollbacks: AtomicU32,
    fail_commit: Mutex<bool>,
    fail_begin: Mutex<bool>,
    fail_rollback: Mutex<bool>,
}

impl Store {
    pub fn write(&self, record: impl Into<String>) {
        self.staged.lock().push(record.into());
    }

    pub fn committed(&self) -> Vec<String> {
        self.committed.lock().clone()
    }

    pub fn fail_commits(&self) {
        *self.fail_commit.lock() = true;
    }

    pub fn fail_begins(&self) {
        *self.fail_begin.lock() = true;
    }

    /// Rollbacks are attempted (and counted) but report an error.
    pub fn fail_rollbacks(&self) {
        *self.fail_rollback.lock() = true;
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

pub struct StoreManager(pub Arc<Store>);

#[async_trait]
impl TransactionManager for StoreManager {
    async fn begin(&self) -> anyhow::Result<Box<dyn Transaction>> {
        if *self.0.fail_begin.lock() {
            anyhow::bail!("connection pool exhausted");
        }
        self.0.begins.fetch_add(1, Ordering::SeqCst);
        self.0.staged.lock().clear();
        Ok(Box::new(StoreTx {
            store: Arc::clone(&self.0),
            finished: false,
        }))
    }
}

struct StoreTx {
    store: Arc<Store>,
    finished: bool,
}

#[async_trait]
impl Transaction for StoreTx {
    async fn commit(&mut self) -> anyhow::Result<()> {
        self.store.commits.fetch_add(1, Ordering::SeqCst);
        if *self.store.fail_commit.lock() {
            anyhow::bail!("could not serialize access due to concurrent update");
        }
        let staged: Vec<String> = self.store.staged.lock().drain(..).collect();
        self.store.committed.lock().extend(staged);
        self.finished = true;
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.store.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.store.staged.lock().clear();
        self.finished = true;
        if *self.store.fail_rollback.lock() {
            anyhow::bail!("connection reset during rollback");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    Start {
        correlation_id: CorrelationId,
        attempt: u32,
    },
    Success {
        correlation_id: CorrelationId,
        result: Value,
    },
    Failure {
        correlation_id: CorrelationId,
        kind: FailureKind,
        classification: Classification,
    },
    Escalation {
        correlation_id: CorrelationId,
        kind: FailureKind,
    },
}

#[derive(Default)]
pub struct RecordingAudit {
    pub events: Mutex<Vec<AuditEvent>>,
    fail_start: Mutex<bool>,
    fail_success: Mutex<bool>,
    fail_failure: Mutex<bool>,
    fail_escalation: Mutex<bool>,
}

impl RecordingAudit {
    pub fn fail_start_records(&self) {
        *self.fail_start.lock() = true;
    }

    pub fn fail_success_records(&self) {
        *self.fail_success.lock() = true;
    }

    pub fn fail_failure_records(&self) {
        *self.fail_failure.lock() = true;
    }

    pub fn fail_escalations(&self) {
        *self.fail_escalation.lock() = true;
    }

    pub fn starts(&self) -> usize {
        self.count(|e| matches!(e, AuditEvent::Start { .. }))
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn successes(&self) -> usize {
        self.count(|e| matches!(e, AuditEvent::Success { .. }))
    }

    pub fn failures(&self) -> usize {
        self.count(|e| matches!(e, AuditEvent::Failure { .. }))
    }

    pub fn escalations(&self) -> usize {
        self.count(|e| matches!(e, AuditEvent::Escalation { .. }))
    }

    fn count(&self, pred: impl Fn(&AuditEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn log_start(&self, ctx: &OperationContext) -> anyhow::Result<()> {
        if *self.fail_start.lock() {
            anyhow::bail!("audit table is read-only");
        }
        self.events.lock().push(AuditEvent::Start {
            correlation_id: ctx.correlation_id(),
            attempt: ctx.attempt(),
        });
        Ok(())
    }

    async fn log_success(&self, ctx: &OperationContext, result: &Value) -> anyhow::Result<()> {
        if *self.fail_success.lock() {
            anyhow::bail!("audit table is read-only");
        }
        self.events.lock().push(AuditEvent::Success {
            correlation_id: ctx.correlation_id(),
            result: result.clone(),
        });
        Ok(())
    }

    async fn log_failure(
        &self,
        ctx: &OperationContext,
        error: &GuardError,
        classification: Classification,
    ) -> anyhow::Result<()> {
        if *self.fail_failure.lock() {
            anyhow::bail!("audit table is read-only");
        }
        self.events.lock().push(AuditEvent::Failure {
            correlation_id: ctx.correlation_id(),
            kind: error.kind(),
            classification,
        });
        Ok(())
    }

    async fn escalate(&self, ctx: &OperationContext, error: &GuardError) -> anyhow::Result<()> {
        if *self.fail_escalation.lock() {
            anyhow::bail!("pager endpoint unreachable");
        }
        self.events.lock().push(AuditEvent::Escalation {
            correlation_id: ctx.correlation_id(),
            kind: error.kind(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingMetrics {
    pub durations: Mutex<Vec<String>>,
    pub outcomes: Mutex<Vec<bool>>,
}

impl MetricsSink for RecordingMetrics {
    fn record_duration(&self, operation_kind: &str, _seconds: f64) {
        self.durations.lock().push(operation_kind.to_string());
    }

    fn record_outcome(&self, _operation_kind: &str, success: bool) {
        self.outcomes.lock().push(success);
    }
}

// ---------------------------------------------------------------------------
// Policy collaborators
// ---------------------------------------------------------------------------

/// Grants exactly the permissions listed on the actor, counting calls.
#[derive(Default)]
pub struct CountingPermissions {
    pub calls: AtomicU32,
}

#[async_trait]
impl PermissionChecker for CountingPermissions {
    async fn has_permissions(&self, actor: &Actor, permissions: &BTreeSet<String>) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        permissions.is_subset(&actor.permissions)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<Store>,
    pub audit: Arc<RecordingAudit>,
    pub metrics: Arc<RecordingMetrics>,
    pub permissions: Arc<CountingPermissions>,
    pub clock: Arc<ManualClock>,
    pub executor: GuardedExecutor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig {
            retry_base_backoff_ms: 10,
            retry_max_backoff_ms: 40,
            ..ExecutorConfig::default()
        })
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        let store = Arc::new(Store::default());
        let audit = Arc::new(RecordingAudit::default());
        let metrics = Arc::new(RecordingMetrics::default());
        let permissions = Arc::new(CountingPermissions::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let limiter = InMemoryRateLimiter::with_clock(RateLimiterConfig::default(), clock.clone());
        let gate = PolicyGate::from_config(&config, permissions.clone(), Arc::new(limiter));
        let executor = GuardedExecutor::new(
            &config,
            gate,
            Collaborators::new(
                Arc::new(StoreManager(store.clone())),
                audit.clone(),
                metrics.clone(),
            ),
        )
        .expect("valid config")
        .with_clock(clock.clone());
        Self {
            store,
            audit,
            metrics,
            permissions,
            clock,
            executor,
        }
    }

    pub fn default_limit() -> RateLimit {
        RateLimit::new(3, Duration::from_secs(60))
    }
}

pub fn editor() -> Actor {
    Actor::new("editor-1")
        .with_role("editor")
        .with_permission("content.create")
        .with_permission("content.update")
}

pub fn create_ctx(actor: Actor, title: &str) -> OperationContext {
    OperationContext::builder("content.create", actor)
        .field("title", title)
        .require_permission("content.create")
        .build()
        .expect("valid context")
}
