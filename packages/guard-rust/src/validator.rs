//! Post-execution result checks.

use bastion_core::{ValidationRules, Value};

/// Expectations on an operation's result.
///
/// The default rejects null and empty results. Operations whose result is
/// legitimately empty (deletes, fire-and-forget updates) use [`ResultRules::optional`].
#[derive(Debug, Clone)]
pub struct ResultRules {
    /// Reject null, blank strings, and empty collections.
    pub required: bool,
    /// Shape the result must have when it is a map. Empty means any shape.
    pub shape: ValidationRules,
}

impl Default for ResultRules {
    fn default() -> Self {
        Self {
            required: true,
            shape: ValidationRules::new(),
        }
    }
}

impl ResultRules {
    #[must_use]
    pub fn optional() -> Self {
        Self {
            required: false,
            shape: ValidationRules::new(),
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: ValidationRules) -> Self {
        self.shape = shape;
        self
    }
}

/// Verdict of a result check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid { reason: String },
}

impl Verdict {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Stateless result checker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultValidator;

impl ResultValidator {
    #[must_use]
    pub fn verify(&self, result: &Value, rules: &ResultRules) -> Verdict {
        if result.is_empty() {
            return if rules.required {
                Verdict::Invalid {
                    reason: format!("operation returned an empty {} result", result.value_type()),
                }
            } else {
                Verdict::Valid
            };
        }
        match rules.shape.validate_value(result) {
            Ok(()) => Verdict::Valid,
            Err(violation) => Verdict::Invalid {
                reason: violation.to_string(),
            },
        }
    }
}
