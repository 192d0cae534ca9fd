//! Periodic upkeep of the persisted version status.

use std::collections::BTreeSet;

use orbit_core::Version;
use orbit_state::StateStore;
use tracing::{info, warn};

use crate::error::VersionResult;

/// Removes platform versions nothing runs anymore.
#[derive(Clone)]
pub struct VersionStatusMaintainer {
    store: StateStore,
}

impl VersionStatusMaintainer {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Remove versions that are not the system version, not deployed anywhere,
    /// and older than the oldest deployed version, together with their OS
    /// certifications. A failure for one version is logged and the version
    /// kept; the rest are still removed. Returns the removed versions.
    pub fn remove_obsolete(&self) -> VersionResult<Vec<Version>> {
        let deployed: BTreeSet<Version> = self
            .store
            .read_applications()?
            .iter()
            .flat_map(|application| application.instances().values())
            .flat_map(|instance| instance.deployments().values())
            .map(|deployment| deployment.version.clone())
            .collect();
        let Some(oldest_deployed) = deployed.first().cloned() else {
            return Ok(Vec::new());
        };

        let lock = self.store.lock_version_status()?;
        let mut status = self.store.read_version_status()?;
        let obsolete: Vec<Version> = status
            .versions()
            .iter()
            .filter(|v| !v.is_system_version)
            .map(|v| v.version.clone())
            .filter(|v| !deployed.contains(v) && v.is_before(&oldest_deployed))
            .collect();

        let mut removed = Vec::new();
        for version in obsolete {
            match self.remove_certifications(&version) {
                Ok(()) => {
                    status = status.without(&version);
                    removed.push(version);
                }
                Err(e) => warn!(%version, error = %e, "failed to remove obsolete version"),
            }
        }
        if !removed.is_empty() {
            self.store.write_version_status(&status, &lock)?;
            info!(count = removed.len(), "removed obsolete versions");
        }
        Ok(removed)
    }

    fn remove_certifications(&self, version: &Version) -> VersionResult<()> {
        let lock = self.store.lock_os_versions()?;
        let mut certified = self.store.read_certified_os_versions()?;
        let before = certified.len();
        certified.retain(|c| &c.platform_version != version);
        if certified.len() != before {
            self.store.write_certified_os_versions(&certified, &lock)?;
        }
        Ok(())
    }
}
