//! In-memory collaborators for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use orbit_core::{
    ApplicationId, ApplicationPackage, ClusterId, DeploymentId, InstanceId, TenantName, Version,
    ZoneId,
};
use orbit_routing::LoadBalancer;
use orbit_state::{Application, QuotaUsage};
use orbit_version::{ArtifactRepository, NodeRepository};

use crate::collaborators::{
    AccessControl, Credentials, Deployer, DeploymentRequest, DeploymentResult, PackageValidator,
};
use crate::error::{ControllerError, ControllerResult};
use crate::tenant::TenantSpec;

/// Grants every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn create_tenant(&self, _: &TenantSpec, _: &Credentials) -> ControllerResult<()> {
        Ok(())
    }

    fn update_tenant(&self, _: &TenantSpec, _: &Credentials) -> ControllerResult<()> {
        Ok(())
    }

    fn delete_tenant(&self, _: &TenantName, _: &Credentials) -> ControllerResult<()> {
        Ok(())
    }

    fn create_application(&self, _: &ApplicationId, _: &Credentials) -> ControllerResult<()> {
        Ok(())
    }

    fn delete_application(&self, _: &ApplicationId, _: &Credentials) -> ControllerResult<()> {
        Ok(())
    }
}

/// Accepts every package.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl PackageValidator for AcceptAll {
    fn validate(&self, _: &Application, _: &ApplicationPackage, _: u64) -> ControllerResult<()> {
        Ok(())
    }
}

/// A deployment the [`RecordingDeployer`] accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployed {
    pub deployment: DeploymentId,
    pub platform: Version,
    pub endpoints: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
struct Recorded {
    deployed: Vec<Deployed>,
    deactivated: Vec<DeploymentId>,
    load_balancers: HashMap<DeploymentId, Vec<LoadBalancer>>,
    warnings: Vec<String>,
    failure: Option<String>,
}

/// Records deployments instead of making them. Each successful deployment
/// provisions one load balancer per container cluster.
#[derive(Debug, Default)]
pub struct RecordingDeployer {
    recorded: Mutex<Recorded>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make each deployment take `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the following deployments with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.recorded().failure = Some(message.into());
    }

    pub fn succeed(&self) {
        self.recorded().failure = None;
    }

    /// Report these warnings for the following deployments.
    pub fn warn(&self, warnings: Vec<String>) {
        self.recorded().warnings = warnings;
    }

    pub fn deployed(&self) -> Vec<Deployed> {
        self.recorded().deployed.clone()
    }

    pub fn deactivated(&self) -> Vec<DeploymentId> {
        self.recorded().deactivated.clone()
    }

    /// Most deployments ever running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Deployer for RecordingDeployer {
    fn deploy(&self, request: DeploymentRequest<'_>) -> ControllerResult<DeploymentResult> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let deployment = DeploymentId::new(request.instance.clone(), request.zone.clone());
        let result = {
            let mut recorded = self.recorded();
            match recorded.failure.clone() {
                Some(message) => Err(ControllerError::Deployment(message)),
                None => {
                    recorded.deployed.push(Deployed {
                        deployment: deployment.clone(),
                        platform: request.platform.clone(),
                        endpoints: request
                            .endpoints
                            .endpoints
                            .dns_names()
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                        dry_run: request.dry_run,
                    });
                    let balancers = request
                        .package
                        .services
                        .containers
                        .iter()
                        .map(|container| load_balancer(&container.id, &deployment))
                        .collect();
                    recorded.load_balancers.insert(deployment, balancers);
                    Ok(DeploymentResult {
                        warnings: recorded.warnings.clone(),
                        quota: QuotaUsage { rate: 1.0 },
                    })
                }
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn deactivate(&self, deployment: &DeploymentId) -> ControllerResult<()> {
        let mut recorded = self.recorded();
        recorded.load_balancers.remove(deployment);
        recorded.deactivated.push(deployment.clone());
        Ok(())
    }

    fn load_balancers(&self, deployment: &DeploymentId) -> Vec<LoadBalancer> {
        self.recorded()
            .load_balancers
            .get(deployment)
            .cloned()
            .unwrap_or_default()
    }
}

fn load_balancer(cluster: &ClusterId, deployment: &DeploymentId) -> LoadBalancer {
    LoadBalancer {
        cluster: cluster.clone(),
        hostname: format!(
            "lb-{cluster}.{}.{}.{}",
            deployment.instance.application, deployment.instance.tenant, deployment.zone
        ),
    }
}

/// Node versions set by hand.
#[derive(Debug, Default)]
pub struct FixedNodeRepository {
    versions: Mutex<HashMap<(InstanceId, ZoneId), Vec<Version>>>,
}

impl FixedNodeRepository {
    pub fn set(&self, instance: InstanceId, zone: ZoneId, versions: Vec<Version>) {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((instance, zone), versions);
    }
}

impl NodeRepository for FixedNodeRepository {
    fn platform_versions(&self, instance: &InstanceId, zone: &ZoneId) -> Vec<Version> {
        self.versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(instance.clone(), zone.clone()))
            .cloned()
            .unwrap_or_default()
    }
}

/// A fixed list of published versions.
#[derive(Debug, Default, Clone)]
pub struct FixedArtifactRepository(pub Vec<Version>);

impl ArtifactRepository for FixedArtifactRepository {
    fn published_versions(&self) -> Vec<Version> {
        self.0.clone()
    }
}
