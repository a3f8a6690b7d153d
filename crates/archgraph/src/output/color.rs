//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Success:   green   (committed plans, valid graphs, low risk)
//!   - Warning:   yellow  (warnings, medium risk)
//!   - Error:     red     (violations, cycles, high and critical risk)
//!   - Reference: cyan    (node ids, snapshot ids)
//!   - Muted:     dimmed  (field labels)

use crate::monitor::AlertSeverity;
use crate::simulation::RiskLevel;
use colored::Colorize;

use super::OutputConfig;

/// Apply semantic "success" color (green) to text.
pub fn success(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.green().to_string()
}

/// Apply semantic "error" color (red) to text.
pub fn error(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.red().to_string()
}

/// Apply semantic "warning" color (yellow) to text.
pub fn warning(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.yellow().to_string()
}

/// Apply semantic "info" color (cyan) to text.
pub fn info(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.cyan().to_string()
}

pub(crate) fn bold(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

pub(crate) fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}

/// Color a risk level by how dangerous it is.
pub(crate) fn colorize_risk(risk: RiskLevel, config: &OutputConfig) -> String {
    let text = risk.to_string();
    match risk {
        RiskLevel::Low => success(&text, config),
        RiskLevel::Medium => warning(&text, config),
        RiskLevel::High => error(&text, config),
        RiskLevel::Critical => {
            if config.use_colors {
                text.red().bold().to_string()
            } else {
                text
            }
        }
    }
}

/// Color an alert severity.
pub(crate) fn colorize_severity(severity: AlertSeverity, config: &OutputConfig) -> String {
    let text = match severity {
        AlertSeverity::Warning => "warning",
        AlertSeverity::Error => "error",
        AlertSeverity::Critical => "critical",
    };
    match severity {
        AlertSeverity::Warning => warning(text, config),
        AlertSeverity::Error | AlertSeverity::Critical => error(text, config),
    }
}
