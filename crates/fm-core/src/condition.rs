//! Activation condition results.
//!
//! The condition itself is evaluated elsewhere; the core only consumes the
//! results pushed to it.

use thiserror::Error;

/// A condition that could not be evaluated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("condition evaluation failed: {0}")]
    Evaluation(String),
}

/// Interprets a textual condition result.
pub fn parse_condition(raw: &str) -> Result<bool, ConditionError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        other => Err(ConditionError::Evaluation(format!(
            "not a boolean result: {other:?}"
        ))),
    }
}
