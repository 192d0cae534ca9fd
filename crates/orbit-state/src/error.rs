//! Error types for the Orbit state store.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("timed out after {timeout:?} waiting for lock '{path}'")]
    LockTimeout { path: String, timeout: Duration },

    #[error("expected a {expected} tenant, but '{name}' is a {actual} tenant")]
    TenantType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl StateError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StateError::LockTimeout { .. })
    }
}
