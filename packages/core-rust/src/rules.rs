//! Declarative validation rules for payloads and operation results.
//!
//! Rules are a tagged enum ([`RuleKind`]) attached to named fields
//! ([`FieldRule`]) and grouped into [`ValidationRules`]. Evaluation walks
//! fields in declaration order and stops at the first violation, reporting a
//! dotted rule path such as `author.name.required` or `tags[2].max_length`.
//!
//! # Notation
//!
//! [`FieldRule::parse`] accepts the pipe-delimited form used in configuration
//! files, e.g. `"required|string|max:255"`. `min`/`max` bound the length of
//! strings and arrays, or the value of numbers when `integer` or `numeric` is
//! present. `regex:` consumes the rest of the notation, so it may contain `|`.

use regex::Regex;

use crate::error::RuleParseError;
use crate::value::{Payload, Value, ValueType};

/// A single constraint on a value.
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Field must be present and non-empty.
    Required,
    /// Null is accepted and skips the remaining rules.
    Nullable,
    Type(ValueType),
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    OneOf(Vec<Value>),
    Pattern(Regex),
    /// Value must be an object satisfying the nested rules.
    Nested(ValidationRules),
    /// Value must be an array whose every item satisfies the rules.
    Each(Vec<RuleKind>),
}

impl RuleKind {
    /// Short name used as the last segment of a violation path.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Nullable => "nullable",
            Self::Type(_) => "type",
            Self::MinLength(_) => "min_length",
            Self::MaxLength(_) => "max_length",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::OneOf(_) => "one_of",
            Self::Pattern(_) => "pattern",
            Self::Nested(_) => "nested",
            Self::Each(_) => "each",
        }
    }
}

/// First rule a value failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{rule}: {message}")]
pub struct RuleViolation {
    /// Dotted path of the field plus the rule name, e.g. `title.max_length`.
    pub rule: String,
    pub message: String,
}

impl RuleViolation {
    fn new(path: &str, rule: &str, message: impl Into<String>) -> Self {
        let rule = if path.is_empty() {
            rule.to_string()
        } else {
            format!("{path}.{rule}")
        };
        Self {
            rule,
            message: message.into(),
        }
    }
}

/// Rules for one named field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: String,
    pub rules: Vec<RuleKind>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn rule(mut self, rule: RuleKind) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn required(self) -> Self {
        self.rule(RuleKind::Required)
    }

    #[must_use]
    pub fn nullable(self) -> Self {
        self.rule(RuleKind::Nullable)
    }

    #[must_use]
    pub fn of_type(self, value_type: ValueType) -> Self {
        self.rule(RuleKind::Type(value_type))
    }

    #[must_use]
    pub fn min_length(self, len: usize) -> Self {
        self.rule(RuleKind::MinLength(len))
    }

    #[must_use]
    pub fn max_length(self, len: usize) -> Self {
        self.rule(RuleKind::MaxLength(len))
    }

    #[must_use]
    pub fn min(self, bound: f64) -> Self {
        self.rule(RuleKind::Min(bound))
    }

    #[must_use]
    pub fn max(self, bound: f64) -> Self {
        self.rule(RuleKind::Max(bound))
    }

    #[must_use]
    pub fn one_of(self, values: Vec<Value>) -> Self {
        self.rule(RuleKind::OneOf(values))
    }

    #[must_use]
    pub fn pattern(self, regex: Regex) -> Self {
        self.rule(RuleKind::Pattern(regex))
    }

    #[must_use]
    pub fn nested(self, rules: ValidationRules) -> Self {
        self.rule(RuleKind::Nested(rules))
    }

    #[must_use]
    pub fn each(self, rules: Vec<RuleKind>) -> Self {
        self.rule(RuleKind::Each(rules))
    }

    /// Parses pipe-delimited rule notation into a `FieldRule`.
    ///
    /// # Errors
    ///
    /// Returns `RuleParseError` for unknown rule names, missing or malformed
    /// arguments, and invalid regular expressions.
    pub fn parse(field: impl Into<String>, notation: &str) -> Result<Self, RuleParseError> {
        let tokens = tokenize(notation);
        let numeric = tokens
            .iter()
            .any(|(name, _)| matches!(*name, "integer" | "numeric"));

        let mut rule = Self::new(field);
        for (name, arg) in tokens {
            let kind = match name {
                "required" => RuleKind::Required,
                "nullable" => RuleKind::Nullable,
                "string" => RuleKind::Type(ValueType::String),
                "integer" => RuleKind::Type(ValueType::Int),
                "numeric" => RuleKind::Type(ValueType::Number),
                "boolean" => RuleKind::Type(ValueType::Bool),
                "array" => RuleKind::Type(ValueType::Array),
                "object" => RuleKind::Type(ValueType::Map),
                "min" | "max" => bound_rule(name, arg, numeric)?,
                "in" => {
                    let arg = require_arg(name, arg)?;
                    RuleKind::OneOf(
                        arg.split(',')
                            .map(|item| literal(item.trim(), numeric))
                            .collect(),
                    )
                }
                "regex" => {
                    let arg = require_arg(name, arg)?;
                    let pattern = arg
                        .strip_prefix('/')
                        .and_then(|p| p.strip_suffix('/'))
                        .unwrap_or(arg);
                    let regex = Regex::new(pattern)
                        .map_err(|e| RuleParseError::InvalidPattern(e.to_string()))?;
                    RuleKind::Pattern(regex)
                }
                other => {
                    return Err(RuleParseError::UnknownRule {
                        rule: other.to_string(),
                    })
                }
            };
            rule.rules.push(kind);
        }
        Ok(rule)
    }

    fn check(&self, value: Option<&Value>, path: &str) -> Result<(), RuleViolation> {
        check_rules(&self.rules, value, path)
    }
}

/// Ordered set of field rules evaluated against a map.
#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    fields: Vec<FieldRule>,
}

impl ValidationRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field rule.
    #[must_use]
    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }

    /// Parses a list of `(field, notation)` pairs.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleParseError` encountered.
    pub fn parse<'a, I>(pairs: I) -> Result<Self, RuleParseError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let fields = pairs
            .into_iter()
            .map(|(field, notation)| FieldRule::parse(field, notation))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    /// Validates a payload map.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleViolation` in declaration order.
    pub fn validate(&self, payload: &Payload) -> Result<(), RuleViolation> {
        self.check_map(payload, "")
    }

    /// Validates an arbitrary value; non-empty rule sets require an object.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleViolation` in declaration order.
    pub fn validate_value(&self, value: &Value) -> Result<(), RuleViolation> {
        if self.is_empty() {
            return Ok(());
        }
        match value {
            Value::Map(map) => self.check_map(map, ""),
            other => Err(RuleViolation::new(
                "",
                "type",
                format!("expected object, found {}", other.value_type()),
            )),
        }
    }

    fn check_map(&self, map: &Payload, prefix: &str) -> Result<(), RuleViolation> {
        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.field.clone()
            } else {
                format!("{prefix}.{}", field.field)
            };
            field.check(map.get(&field.field), &path)?;
        }
        Ok(())
    }
}

fn check_rules(rules: &[RuleKind], value: Option<&Value>, path: &str) -> Result<(), RuleViolation> {
    let required = rules.iter().any(|r| matches!(r, RuleKind::Required));
    let nullable = rules.iter().any(|r| matches!(r, RuleKind::Nullable));

    let Some(value) = value else {
        if required {
            return Err(RuleViolation::new(path, "required", "field is required"));
        }
        return Ok(());
    };

    if matches!(value, Value::Null) && nullable {
        return Ok(());
    }
    if required && value.is_empty() {
        return Err(RuleViolation::new(path, "required", "field must not be empty"));
    }

    for rule in rules {
        apply(rule, value, path)?;
    }
    Ok(())
}

fn apply(rule: &RuleKind, value: &Value, path: &str) -> Result<(), RuleViolation> {
    let name = rule.name();
    match rule {
        RuleKind::Required | RuleKind::Nullable => Ok(()),
        RuleKind::Type(expected) => {
            if expected.matches(value) {
                Ok(())
            } else {
                Err(RuleViolation::new(
                    path,
                    name,
                    format!("expected {expected}, found {}", value.value_type()),
                ))
            }
        }
        RuleKind::MinLength(min) => match value.len() {
            Some(len) if len >= *min => Ok(()),
            Some(len) => Err(RuleViolation::new(
                path,
                name,
                format!("length {len} is below minimum {min}"),
            )),
            None => Err(RuleViolation::new(path, name, "value has no length")),
        },
        RuleKind::MaxLength(max) => match value.len() {
            Some(len) if len <= *max => Ok(()),
            Some(len) => Err(RuleViolation::new(
                path,
                name,
                format!("length {len} exceeds maximum {max}"),
            )),
            None => Err(RuleViolation::new(path, name, "value has no length")),
        },
        RuleKind::Min(min) => match value.as_f64() {
            Some(n) if n >= *min => Ok(()),
            Some(n) => Err(RuleViolation::new(
                path,
                name,
                format!("{n} is below minimum {min}"),
            )),
            None => Err(RuleViolation::new(path, name, "value is not numeric")),
        },
        RuleKind::Max(max) => match value.as_f64() {
            Some(n) if n <= *max => Ok(()),
            Some(n) => Err(RuleViolation::new(
                path,
                name,
                format!("{n} exceeds maximum {max}"),
            )),
            None => Err(RuleViolation::new(path, name, "value is not numeric")),
        },
        RuleKind::OneOf(allowed) => {
            if allowed.contains(value) {
                Ok(())
            } else {
                Err(RuleViolation::new(path, name, "value is not an allowed option"))
            }
        }
        RuleKind::Pattern(regex) => match value.as_str() {
            Some(s) if regex.is_match(s) => Ok(()),
            Some(_) => Err(RuleViolation::new(
                path,
                name,
                format!("value does not match `{}`", regex.as_str()),
            )),
            None => Err(RuleViolation::new(path, name, "value is not a string")),
        },
        RuleKind::Nested(rules) => match value {
            Value::Map(map) => rules.check_map(map, path),
            other => Err(RuleViolation::new(
                path,
                "type",
                format!("expected object, found {}", other.value_type()),
            )),
        },
        RuleKind::Each(item_rules) => match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    check_rules(item_rules, Some(item), &format!("{path}[{index}]"))?;
                }
                Ok(())
            }
            other => Err(RuleViolation::new(
                path,
                "type",
                format!("expected array, found {}", other.value_type()),
            )),
        },
    }
}

fn tokenize(notation: &str) -> Vec<(&str, Option<&str>)> {
    let mut tokens = Vec::new();
    let mut rest = notation.trim();
    while !rest.is_empty() {
        if let Some(pattern) = rest.strip_prefix("regex:") {
            tokens.push(("regex", Some(pattern)));
            break;
        }
        let (token, tail) = rest.split_once('|').unwrap_or((rest, ""));
        let token = token.trim();
        if !token.is_empty() {
            match token.split_once(':') {
                Some((name, arg)) => tokens.push((name.trim(), Some(arg.trim()))),
                None => tokens.push((token, None)),
            }
        }
        rest = tail.trim_start();
    }
    tokens
}

fn require_arg<'a>(name: &str, arg: Option<&'a str>) -> Result<&'a str, RuleParseError> {
    match arg {
        Some(arg) if !arg.is_empty() => Ok(arg),
        _ => Err(RuleParseError::MissingArgument {
            rule: name.to_string(),
        }),
    }
}

fn bound_rule(name: &str, arg: Option<&str>, numeric: bool) -> Result<RuleKind, RuleParseError> {
    let arg = require_arg(name, arg)?;
    let invalid = || RuleParseError::InvalidArgument {
        rule: name.to_string(),
        arg: arg.to_string(),
    };
    if numeric {
        let bound: f64 = arg.parse().map_err(|_| invalid())?;
        Ok(if name == "min" {
            RuleKind::Min(bound)
        } else {
            RuleKind::Max(bound)
        })
    } else {
        let bound: usize = arg.parse().map_err(|_| invalid())?;
        Ok(if name == "min" {
            RuleKind::MinLength(bound)
        } else {
            RuleKind::MaxLength(bound)
        })
    }
}

fn literal(item: &str, numeric: bool) -> Value {
    if numeric {
        if let Ok(i) = item.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = item.parse::<f64>() {
            return Value::Float(f);
        }
    }
    Value::String(item.to_string())
}
