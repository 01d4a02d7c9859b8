use std::time::Duration;

use serde::Deserialize;

/// Request budget applied per `(actor, operation kind)` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    /// Maximum attempts allowed within one window.
    pub limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl RateLimit {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// A zero window would reset on every call and never limit anything.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the limit or the window is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 || self.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate limit needs a non-zero limit and window",
            ));
        }
        Ok(())
    }
}

/// Executor-level configuration.
///
/// Controls deadlines, retry behavior, default rate limiting, and escalation.
/// Passed at construction time; nothing reads configuration from globals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Default deadline for one invocation in milliseconds. 0 disables it.
    pub operation_timeout_ms: u64,
    /// Attempt ceiling for transient failures (attempts are 1-based).
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles for each further attempt.
    pub retry_base_backoff_ms: u64,
    /// Upper bound on any single backoff.
    pub retry_max_backoff_ms: u64,
    /// Rate limit for operation kinds without an explicit one.
    pub default_rate_limit: RateLimit,
    /// Escalate infrastructure failures (failed commits) to the security channel.
    pub escalate_infrastructure_failures: bool,
    /// Payload field carrying the caller-supplied integrity digest.
    pub integrity_field: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 30_000,
            max_attempts: 3,
            retry_base_backoff_ms: 100,
            retry_max_backoff_ms: 5_000,
            default_rate_limit: RateLimit {
                limit: 60,
                window_ms: 60_000,
            },
            escalate_infrastructure_failures: true,
            integrity_field: "_checksum".to_string(),
        }
    }
}

/// Errors from loading or validating an `ExecutorConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

impl ExecutorConfig {
    /// Parses and validates a JSON config document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed JSON and `ConfigError::Invalid`
    /// if validation fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first inconsistent setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1"));
        }
        self.default_rate_limit.validate()?;
        if self.retry_base_backoff_ms > self.retry_max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry_base_backoff_ms must not exceed retry_max_backoff_ms",
            ));
        }
        if self.integrity_field.is_empty() {
            return Err(ConfigError::Invalid("integrity_field must not be empty"));
        }
        Ok(())
    }

    /// Default invocation deadline, if enabled.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExecutorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.operation_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.default_rate_limit.window(), Duration::from_secs(60));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            ExecutorConfig::from_json_str(r#"{"max_attempts": 5, "operation_timeout_ms": 0}"#)
                .unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.operation_timeout(), None);
        assert_eq!(config.retry_base_backoff_ms, 100);
        assert_eq!(config.integrity_field, "_checksum");
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = ExecutorConfig::from_json_str(r#"{"max_attempts": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn inverted_backoff_rejected() {
        let err = ExecutorConfig::from_json_str(
            r#"{"retry_base_backoff_ms": 10000, "retry_max_backoff_ms": 10}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = ExecutorConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rate_limit_from_duration() {
        let limit = RateLimit::new(3, Duration::from_secs(2));
        assert_eq!(limit.window_ms, 2_000);
        assert!(limit.validate().is_ok());
    }

    #[test]
    fn zero_window_or_limit_rejected() {
        assert!(RateLimit::new(3, Duration::ZERO).validate().is_err());
        assert!(RateLimit::new(0, Duration::from_secs(1)).validate().is_err());
        let err = ExecutorConfig::from_json_str(
            r#"{"default_rate_limit": {"limit": 5, "window_ms": 0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
