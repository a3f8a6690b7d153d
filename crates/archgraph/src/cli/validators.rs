//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute to validate
//! user input at parse time.

use serde_json::Value;

/// Validate a project id.
///
/// Delegates to [`crate::commands::init::validate_project_id`].
pub fn validate_project(s: &str) -> Result<String, String> {
    use crate::commands::init;

    let trimmed = s.trim();
    init::validate_project_id(trimmed).map_err(|e| e.to_string())?;
    Ok(trimmed.to_string())
}

/// Validate a node id: non-empty, no whitespace.
pub fn validate_node_id(s: &str) -> Result<String, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Node ID cannot be empty".to_string());
    }
    if s.chars().any(char::is_whitespace) {
        return Err(format!("Invalid node ID '{s}': whitespace is not allowed"));
    }
    Ok(s.to_string())
}

/// Parse a `key=value` attribute assignment.
///
/// The value is read as JSON when it parses (`level=2`, `tags=["a"]`) and as
/// a plain string otherwise (`status=deprecated`).
pub fn parse_attribute(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid attribute '{s}'. Expected format: key=value"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid attribute '{s}': key cannot be empty"));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
