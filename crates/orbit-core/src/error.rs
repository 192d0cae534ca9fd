//! Error types for parsing and validating core values.

use thiserror::Error;

/// Result type alias for core value construction.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised when a core value cannot be parsed or is invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid {kind} '{value}': {reason}")]
    InvalidName {
        kind: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("invalid zone '{0}'")]
    InvalidZone(String),

    #[error("invalid identifier '{0}'")]
    InvalidId(String),

    #[error("instance '{0}' is declared more than once")]
    DuplicateInstance(String),
}
