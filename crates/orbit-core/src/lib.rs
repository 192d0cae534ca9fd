//! orbit-core: shared types for the Orbit deployment platform.
//!
//! Everything here is a plain value: identifiers, zones, platform versions,
//! the declarative deployment spec and the daemon configuration. Nothing in
//! this crate touches storage or locks.

pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod job;
pub mod package;
pub mod routing;
pub mod spec;
pub mod version;
pub mod zone;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::OrbitConfig;
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use job::{JobId, JobType};
pub use package::ApplicationPackage;
pub use routing::{AuthMethod, RotationId, RoutingMethod};
pub use spec::*;
pub use version::{RevisionId, Version};
pub use zone::{CloudAccount, Environment, RegionName, ZoneId};
