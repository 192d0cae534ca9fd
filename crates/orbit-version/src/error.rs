use orbit_state::StateError;
use thiserror::Error;

pub type VersionResult<T> = Result<T, VersionError>;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("no suitable version: {0}")]
    NoSuitableVersion(String),

    #[error(transparent)]
    State(#[from] StateError),
}
