//! Error types for name parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The name string is empty or only whitespace.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The name contains whitespace.
    #[error("{kind} cannot contain whitespace: '{actual}'")]
    Whitespace { kind: &'static str, actual: String },

    /// The ARN does not have the `arn:partition:service:region:account:resource` shape.
    #[error("invalid ARN '{actual}': {message}")]
    InvalidArn { actual: String, message: String },

    /// The ARN is well formed but does not name a deployment target.
    #[error("ARN resource type '{0}' is not a deployment target")]
    UnsupportedTarget(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }

    pub(crate) fn invalid_arn(actual: &str, message: impl Into<String>) -> Self {
        Self::InvalidArn {
            actual: actual.to_string(),
            message: message.into(),
        }
    }
}
