//! `Bastion` Guard: guarded operation executor with policy checks, transactional
//! atomicity, result validation, audit, metrics, and failure classification.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics_sink;
pub mod middleware;
pub mod policy;
pub mod telemetry;
pub mod traits;
pub mod transaction;
pub mod validator;
pub mod worker;

pub use classifier::FailureClassifier;
pub use config::{ConfigError, ExecutorConfig, RateLimit};
pub use error::{CancelCause, ExecutionFailure, FailureKind, GuardError, OperationOutcome};
pub use executor::{CancelScope, Collaborators, GuardedExecutor};
pub use metrics_sink::PrometheusMetricsSink;
pub use middleware::{GuardLayer, GuardService, GuardedRequest};
pub use policy::{OperationPolicy, PolicyGate};
pub use traits::{
    AuditSink, IntegrityVerifier, MetricsSink, PermissionChecker, RateLimiter, Transaction,
    TransactionManager,
};
pub use transaction::NullTransactionManager;
pub use validator::{ResultRules, ResultValidator, Verdict};
