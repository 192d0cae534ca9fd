use orbit_core::ZoneId;
use orbit_state::StateError;
use thiserror::Error;

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no rotations available: {0}")]
    RotationsExhausted(String),

    #[error("ambiguous routing method: {0}")]
    AmbiguousRoutingMethod(String),

    #[error("no VIP configured for zone {0}")]
    MissingVipConfiguration(ZoneId),

    #[error("name service failure: {0}")]
    NameService(String),

    #[error(transparent)]
    State(#[from] StateError),
}
