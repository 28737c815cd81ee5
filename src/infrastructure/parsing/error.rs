//! Extraction error types.
//!
//! Every failure names the step and selector that produced it, so an
//! operator can tell a markup change from a configuration mistake.

use thiserror::Error;

pub type ExtractionResult<T> = Result<T, ExtractionError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("required field '{field}' not found (selector: {selector})")]
    RequiredFieldMissing { field: &'static str, selector: String },

    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("extraction step '{step}' failed: {message}")]
    StepFailed { step: &'static str, message: String },
}

impl ExtractionError {
    pub fn required_field(field: &'static str, selector: &str) -> Self {
        Self::RequiredFieldMissing { field, selector: selector.to_string() }
    }

    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector { selector: selector.to_string(), reason: reason.to_string() }
    }
}
