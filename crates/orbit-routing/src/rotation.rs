//! Assignment of global rotations to declared endpoints.

use std::collections::BTreeSet;

use orbit_core::config::RotationConfig;
use orbit_core::{DeploymentSpec, InstanceName, OrbitConfig, RotationId};
use orbit_state::{Application, AssignedRotation, RotationLock, StateStore};
use tracing::info;

use crate::error::{RoutingError, RoutingResult};

/// Hands out rotations from the configured pool. A rotation belongs to at
/// most one (instance, endpoint, cluster) at a time, across all applications.
#[derive(Clone)]
pub struct RotationAssigner {
    store: StateStore,
    pool: Vec<RotationConfig>,
}

impl RotationAssigner {
    pub fn new(store: StateStore, mut pool: Vec<RotationConfig>) -> Self {
        pool.sort_by(|a, b| a.id.cmp(&b.id));
        pool.dedup_by(|a, b| a.id == b.id);
        Self { store, pool }
    }

    pub fn from_config(store: StateStore, config: &OrbitConfig) -> Self {
        Self::new(store, config.rotations.clone())
    }

    /// Canonical hostname of a rotation.
    pub fn rotation_name(&self, id: &RotationId) -> Option<&str> {
        self.pool
            .iter()
            .find(|r| &r.id == id)
            .map(|r| r.name.as_str())
    }

    /// Rotations for every global endpoint `spec` declares for `instance` of
    /// `application`.
    ///
    /// `application` is the caller's current view, which may hold
    /// assignments not yet written; those count as taken too. Endpoints that
    /// already have a rotation keep it, with their target regions refreshed.
    /// Others get the lowest free rotation of the pool. Rotations of
    /// endpoints no longer declared are released.
    pub fn get_or_assign_rotations(
        &self,
        spec: &DeploymentSpec,
        application: &Application,
        instance: &InstanceName,
        _lock: &RotationLock,
    ) -> RoutingResult<Vec<AssignedRotation>> {
        let Some(instance) = application.instance(instance) else {
            return Ok(Vec::new());
        };
        let Some(instance_spec) = spec.instance(instance.name()) else {
            return Ok(Vec::new());
        };
        if instance_spec.endpoints.is_empty() {
            return Ok(Vec::new());
        }

        let mut taken = self.assigned_elsewhere(application, instance.name())?;
        let mut assigned = Vec::with_capacity(instance_spec.endpoints.len());
        for declared in &instance_spec.endpoints {
            let regions = declared.regions().into_iter().collect();
            let existing = instance.rotations().iter().find(|r| {
                r.endpoint_id == declared.endpoint_id && r.cluster == declared.container_id
            });
            let rotation_id = match existing {
                Some(existing) if !taken.contains(&existing.rotation_id) => existing.rotation_id.clone(),
                _ => {
                    let free = self
                        .pool
                        .iter()
                        .find(|r| !taken.contains(&r.id))
                        .ok_or_else(|| {
                            RoutingError::RotationsExhausted(format!(
                                "endpoint '{}' of {} needs one of {} rotations, all assigned",
                                declared.endpoint_id,
                                instance.id(),
                                self.pool.len()
                            ))
                        })?;
                    info!(
                        instance = %instance.id(),
                        endpoint = %declared.endpoint_id,
                        rotation = %free.id,
                        "assigned rotation"
                    );
                    free.id.clone()
                }
            };
            taken.insert(rotation_id.clone());
            assigned.push(AssignedRotation::new(
                declared.container_id.clone(),
                declared.endpoint_id.clone(),
                rotation_id,
                regions,
            ));
        }
        Ok(assigned)
    }

    /// Rotations held by any other instance: stored ones for other
    /// applications, the given view for this one.
    fn assigned_elsewhere(
        &self,
        application: &Application,
        instance: &InstanceName,
    ) -> RoutingResult<BTreeSet<RotationId>> {
        let stored = self.store.read_applications()?;
        let others = stored
            .iter()
            .filter(|other| other.id() != application.id())
            .flat_map(|other| other.instances().values());
        let siblings = application
            .instances()
            .values()
            .filter(|other| other.name() != instance);
        Ok(others
            .chain(siblings)
            .flat_map(|other| other.rotations())
            .map(|r| r.rotation_id.clone())
            .collect())
    }
}
