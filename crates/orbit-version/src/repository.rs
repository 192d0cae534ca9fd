//! Collaborators consulted when the store can't answer.

use orbit_core::{InstanceId, Version, ZoneId};

/// Live node state of the zones.
pub trait NodeRepository: Send + Sync {
    /// Platform versions of the active and reserved nodes of an instance in a zone.
    fn platform_versions(&self, instance: &InstanceId, zone: &ZoneId) -> Vec<Version>;
}

/// Where platform releases are published.
pub trait ArtifactRepository: Send + Sync {
    /// All published platform versions, including ones the system hasn't
    /// picked up yet.
    fn published_versions(&self) -> Vec<Version>;
}
