//! Durable rule definitions.
//!
//! The persistence layer stores rules as `(scope, kind, condition, severity)`
//! records. [`RuleDefinition`] is that shape; [`RuleDefinition::into_rule`]
//! turns it into an executable [`Rule`].

use super::{Rule, RuleKind, RuleScope, Severity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const DEFAULT_MAX_DEPENDENCIES: u64 = 999;

/// Reasons a stored rule cannot be turned into an executable rule
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleDefinitionError {
    /// The kind has no executable form (e.g. custom predicates)
    #[error("unsupported rule kind '{0}'")]
    UnsupportedKind(String),

    /// The condition does not match the kind
    #[error("invalid condition for {kind} rule: {reason}")]
    InvalidCondition {
        /// Rule kind
        kind: String,
        /// What is wrong
        reason: String,
    },
}

/// Serializable rule record as kept by the durable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Rule name; defaults to `{kind}_{n}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Scope the rule applies to
    #[serde(default)]
    pub scope: RuleScope,

    /// `naming`, `dependency`, `layer` or `custom`
    pub kind: String,

    /// Kind-specific condition
    #[serde(default)]
    pub condition: Value,

    /// Defaults to `error` for global rules, `warning` otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    /// Evaluation priority
    #[serde(default)]
    pub priority: i32,

    /// Hint shown alongside violations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

impl RuleDefinition {
    /// Build the executable rule; `ordinal` names unnamed definitions.
    ///
    /// # Errors
    ///
    /// Fails for unsupported kinds and malformed conditions.
    pub fn into_rule(self, ordinal: usize) -> Result<Rule, RuleDefinitionError> {
        let kind = match self.kind.as_str() {
            "naming" => parse_naming(&self.condition)?,
            "dependency" | "max_dependency_count" => RuleKind::MaxDependencyCount {
                max: parse_max_dependencies(&self.condition)?,
            },
            "layer" | "layer_forbidden" => parse_layer(&self.condition)?,
            other => return Err(RuleDefinitionError::UnsupportedKind(other.to_string())),
        };

        let severity = self.severity.unwrap_or(if self.scope == RuleScope::Global {
            Severity::Error
        } else {
            Severity::Warning
        });

        Ok(Rule {
            name: self
                .name
                .unwrap_or_else(|| format!("{}_{ordinal}", self.kind)),
            scope: self.scope,
            kind,
            priority: self.priority,
            severity,
            suggested_fix: self.suggested_fix,
        })
    }
}

fn invalid(kind: &str, reason: impl Into<String>) -> RuleDefinitionError {
    RuleDefinitionError::InvalidCondition {
        kind: kind.to_string(),
        reason: reason.into(),
    }
}

fn parse_naming(condition: &Value) -> Result<RuleKind, RuleDefinitionError> {
    let (prefix, suffix) = match condition {
        Value::String(text) => {
            if let Some(arg) = call_argument(text, "endswith") {
                (None, Some(arg))
            } else if let Some(arg) = call_argument(text, "startswith") {
                (Some(arg), None)
            } else {
                return Err(invalid("naming", format!("unrecognised condition '{text}'")));
            }
        }
        Value::Object(map) => (
            map.get("prefix").and_then(Value::as_str).map(str::to_string),
            map.get("suffix").and_then(Value::as_str).map(str::to_string),
        ),
        _ => (None, None),
    };

    if prefix.is_none() && suffix.is_none() {
        return Err(invalid("naming", "expected a prefix or suffix"));
    }
    Ok(RuleKind::Naming { prefix, suffix })
}

/// Extract `X` from `func('X')` or `func("X")` anywhere in `text`.
fn call_argument(text: &str, func: &str) -> Option<String> {
    let start = text.find(&format!("{func}("))? + func.len() + 1;
    let rest = &text[start..];
    let end = rest.find(')')?;
    let arg = rest[..end].trim().trim_matches(|c| c == '\'' || c == '"');
    (!arg.is_empty()).then(|| arg.to_string())
}

fn parse_max_dependencies(condition: &Value) -> Result<usize, RuleDefinitionError> {
    let max = match condition {
        Value::Null => DEFAULT_MAX_DEPENDENCIES,
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid("dependency", "max_dependencies must be a non-negative integer"))?,
        Value::Object(map) => match map.get("max_dependencies") {
            None => DEFAULT_MAX_DEPENDENCIES,
            Some(value) => value.as_u64().ok_or_else(|| {
                invalid("dependency", "max_dependencies must be a non-negative integer")
            })?,
        },
        _ => return Err(invalid("dependency", "expected an object")),
    };
    usize::try_from(max).map_err(|_| invalid("dependency", "max_dependencies out of range"))
}

fn parse_layer(condition: &Value) -> Result<RuleKind, RuleDefinitionError> {
    let field = |key: &str| {
        condition
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid("layer", format!("missing '{key}'")))
    };
    Ok(RuleKind::LayerForbidden {
        from_layer: field("from_layer")?,
        to_layer: field("to_layer")?,
    })
}
