//! Controller error types.

use orbit_core::CoreError;
use orbit_routing::RoutingError;
use orbit_state::StateError;
use orbit_version::VersionError;
use thiserror::Error;

/// Errors surfaced by the application and tenant controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} does not exist")]
    NotExists(String),

    #[error("{0}")]
    IllegalArgument(String),

    #[error("{0}")]
    IllegalState(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("deployment failed: {0}")]
    Deployment(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl ControllerError {
    /// Whether the request may succeed if retried later, i.e. it failed
    /// waiting for a lock.
    pub fn is_transient(&self) -> bool {
        match self {
            ControllerError::State(e)
            | ControllerError::Routing(RoutingError::State(e))
            | ControllerError::Version(VersionError::State(e)) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<CoreError> for ControllerError {
    fn from(error: CoreError) -> Self {
        ControllerError::IllegalArgument(error.to_string())
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn timeout() -> StateError {
        StateError::LockTimeout {
            path: "/applications/acme:search".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn lock_timeouts_are_transient_at_any_depth() {
        assert!(ControllerError::from(timeout()).is_transient());
        assert!(ControllerError::from(RoutingError::from(timeout())).is_transient());
        assert!(ControllerError::from(VersionError::from(timeout())).is_transient());
        assert!(!ControllerError::NotExists("application 'acme:search'".to_string()).is_transient());
        assert!(
            !ControllerError::from(RoutingError::RotationsExhausted("all taken".to_string()))
                .is_transient()
        );
    }

    #[test]
    fn invalid_names_are_illegal_arguments() {
        let err = ControllerError::from(CoreError::InvalidId("a:b:c:d".to_string()));
        assert!(matches!(err, ControllerError::IllegalArgument(_)));
    }
}
