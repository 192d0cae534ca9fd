//! Systems the controllers call out to but don't own.

use std::sync::Arc;

use orbit_core::{
    ApplicationId, ApplicationPackage, Clock, CloudAccount, DeploymentId, InstanceId, Tags,
    TenantName, Version, ZoneId,
};
use orbit_routing::{LoadBalancer, PreparedEndpoints};
use orbit_state::{Application, QuotaUsage};

use crate::error::ControllerResult;
use crate::tenant::TenantSpec;

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
}

impl Credentials {
    pub fn of(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

/// Authorization gate for tenant and application changes. Implementations
/// fail with [`Unauthorized`](crate::ControllerError::Unauthorized).
pub trait AccessControl: Send + Sync {
    fn create_tenant(&self, spec: &TenantSpec, credentials: &Credentials) -> ControllerResult<()>;

    fn update_tenant(&self, spec: &TenantSpec, credentials: &Credentials) -> ControllerResult<()>;

    fn delete_tenant(&self, tenant: &TenantName, credentials: &Credentials) -> ControllerResult<()>;

    fn create_application(
        &self,
        id: &ApplicationId,
        credentials: &Credentials,
    ) -> ControllerResult<()>;

    fn delete_application(
        &self,
        id: &ApplicationId,
        credentials: &Credentials,
    ) -> ControllerResult<()>;
}

/// Everything the deployer needs to activate a package in a zone.
#[derive(Debug)]
pub struct DeploymentRequest<'a> {
    pub instance: &'a InstanceId,
    pub tags: &'a Tags,
    pub zone: &'a ZoneId,
    pub package: &'a ApplicationPackage,
    pub platform: &'a Version,
    pub endpoints: &'a PreparedEndpoints,
    pub cloud_account: &'a CloudAccount,
    pub dry_run: bool,
}

/// What came back from a successful deployment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeploymentResult {
    /// Warnings about the package, shown to the tenant.
    pub warnings: Vec<String>,
    pub quota: QuotaUsage,
}

/// The external orchestration that runs deployments. Calls may block for a
/// long time; they are never made while an application lock is held.
pub trait Deployer: Send + Sync {
    fn deploy(&self, request: DeploymentRequest<'_>) -> ControllerResult<DeploymentResult>;

    fn deactivate(&self, deployment: &DeploymentId) -> ControllerResult<()>;

    /// Load balancers currently provisioned for the deployment.
    fn load_balancers(&self, deployment: &DeploymentId) -> Vec<LoadBalancer>;
}

/// Checks a package against the application it is submitted to. Errors are
/// surfaced to the caller unchanged.
pub trait PackageValidator: Send + Sync {
    fn validate(
        &self,
        application: &Application,
        package: &ApplicationPackage,
        now: u64,
    ) -> ControllerResult<()>;
}

/// The external collaborators of an [`ApplicationController`](crate::ApplicationController).
#[derive(Clone)]
pub struct Collaborators {
    pub deployer: Arc<dyn Deployer>,
    pub access_control: Arc<dyn AccessControl>,
    pub package_validator: Arc<dyn PackageValidator>,
    pub clock: Arc<dyn Clock>,
}
