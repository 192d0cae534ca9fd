//! orbit-version: which platform version an application compiles against.
//!
//! [`VersionSelector`] picks the compile version for an application from the
//! system's version status, the platforms already installed for it and the
//! application's upgrade policy. [`VersionStatusMaintainer`] prunes versions
//! nothing runs anymore.

pub mod compatibility;
pub mod error;
pub mod maintainer;
pub mod repository;
pub mod selector;

pub use compatibility::VersionCompatibility;
pub use error::{VersionError, VersionResult};
pub use maintainer::VersionStatusMaintainer;
pub use repository::{ArtifactRepository, NodeRepository};
pub use selector::VersionSelector;
