//! Application lifecycle: creation, submission, deployment and teardown.

use std::collections::BTreeSet;
use std::sync::Arc;

use orbit_core::{
    ApplicationId, ApplicationPackage, Clock, CloudAccount, DeploymentId, DeploymentSpec,
    Environment, InstanceId, JobId, RevisionId, Tags, ValidationId, ValidationOverrides, Version,
};
use orbit_routing::{EndpointCertificate, RoutingController};
use orbit_state::{
    Application, ApplicationVersion, DeploymentMeta, LockedApplication, NotificationLevel,
    NotificationSource, NotificationType, StateStore,
};
use orbit_version::VersionSelector;
use tracing::{debug, info, warn};

use crate::collaborators::{
    AccessControl, Collaborators, Credentials, Deployer, DeploymentRequest, DeploymentResult,
    PackageValidator,
};
use crate::error::{ControllerError, ControllerResult};
use crate::notifications::Notifier;

/// Creates, configures, deploys and deletes applications.
#[derive(Clone)]
pub struct ApplicationController {
    store: StateStore,
    routing: RoutingController,
    versions: VersionSelector,
    deployer: Arc<dyn Deployer>,
    access_control: Arc<dyn AccessControl>,
    package_validator: Arc<dyn PackageValidator>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl ApplicationController {
    pub fn new(
        store: StateStore,
        routing: RoutingController,
        versions: VersionSelector,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            notifier: Notifier::new(store.clone(), collaborators.clock.clone()),
            store,
            routing,
            versions,
            deployer: collaborators.deployer,
            access_control: collaborators.access_control,
            package_validator: collaborators.package_validator,
            clock: collaborators.clock,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn routing(&self) -> &RoutingController {
        &self.routing
    }

    pub fn get(&self, id: &ApplicationId) -> ControllerResult<Option<Application>> {
        Ok(self.store.read_application(id)?)
    }

    pub fn require(&self, id: &ApplicationId) -> ControllerResult<Application> {
        self.get(id)?
            .ok_or_else(|| ControllerError::NotExists(format!("application '{id}'")))
    }

    // ── Creation ───────────────────────────────────────────────────

    /// Create an empty application. The tenant must exist, and no
    /// application of the tenant may have the same name up to dashes and
    /// underscores.
    pub fn create_application(
        &self,
        id: &ApplicationId,
        credentials: &Credentials,
    ) -> ControllerResult<Application> {
        let tenant = self
            .store
            .read_tenant(&id.tenant)?
            .ok_or_else(|| ControllerError::NotExists(format!("tenant '{}'", id.tenant)))?;
        if tenant.is_deleted() {
            return Err(ControllerError::IllegalArgument(format!(
                "tenant '{}' has been deleted",
                id.tenant
            )));
        }
        let lock = self.store.lock_application(id)?;
        if self.store.read_application(id)?.is_some() {
            return Err(ControllerError::AlreadyExists(format!("application '{id}'")));
        }
        let normalized = id.dash_to_underscore();
        if let Some(alias) = self
            .store
            .read_applications_of(&id.tenant)?
            .into_iter()
            .find(|a| a.id().dash_to_underscore() == normalized)
        {
            return Err(ControllerError::AlreadyExists(format!(
                "application '{}', which conflicts with '{id}'",
                alias.id()
            )));
        }
        id.application.validate_new()?;

        self.access_control.create_application(id, credentials)?;
        let application = LockedApplication::new(Application::new(id.clone(), self.clock.now()), &lock);
        self.store.write_application(&application)?;
        info!(application = %id, user = %credentials.user, "created application");
        Ok(application.get().clone())
    }

    /// Add an instance to an existing application.
    pub fn create_instance(&self, id: &InstanceId, tags: Tags) -> ControllerResult<()> {
        let application_id = id.application_id();
        let lock = self.store.lock_application(&application_id)?;
        let application = LockedApplication::new(self.require(&application_id)?, &lock);
        let application = self.with_new_instance(application, id, tags)?;
        self.store.write_application(&application)?;
        info!(instance = %id, "created instance");
        Ok(())
    }

    /// `application` with a new instance `id`. Tester names are reserved, and
    /// names colliding with an existing instance up to dashes and
    /// underscores are taken.
    pub fn with_new_instance<'a>(
        &self,
        application: LockedApplication<'a>,
        id: &InstanceId,
        tags: Tags,
    ) -> ControllerResult<LockedApplication<'a>> {
        if id.instance.is_tester() {
            return Err(ControllerError::IllegalArgument(format!(
                "'{}' is a reserved tester instance name",
                id.instance
            )));
        }
        let normalized = id.instance.dash_to_underscore();
        if application
            .get()
            .instances()
            .keys()
            .any(|name| name.dash_to_underscore() == normalized)
        {
            return Err(ControllerError::AlreadyExists(format!("instance '{id}'")));
        }
        id.instance.validate_new()?;
        Ok(application.with_new_instance(id.instance.clone(), tags))
    }

    // ── Submission ─────────────────────────────────────────────────

    /// Store `package` as the next revision of the application and apply
    /// its deployment spec.
    pub fn submit(
        &self,
        id: &ApplicationId,
        package: ApplicationPackage,
        source_commit: Option<String>,
    ) -> ControllerResult<RevisionId> {
        let lock = self.store.lock_application(id)?;
        let application = self.require(id)?;
        let now = self.clock.now();
        self.package_validator.validate(&application, &package, now)?;

        let revision = application
            .revisions()
            .last()
            .map_or(RevisionId(1), |latest| latest.id.next());
        self.store.write_package(id, revision, &package)?;
        let application = LockedApplication::new(application, &lock).with_revision(
            ApplicationVersion::submitted(revision, package.compile_version.clone(), source_commit, now),
        );
        self.apply_config(application, &package, now)?;
        info!(application = %id, %revision, "submitted application package");
        Ok(revision)
    }

    /// Validate `package` and make its deployment spec and validation
    /// overrides those of `application`, then store it.
    ///
    /// Declared instances are created or get their tags updated. Production
    /// deployments the new deployment spec drops are deactivated, which the
    /// validation overrides must allow. Undeclared instances left without
    /// deployments are removed, and so are notifications about what no
    /// longer exists.
    pub fn store_with_updated_config<'a>(
        &self,
        application: LockedApplication<'a>,
        package: &ApplicationPackage,
    ) -> ControllerResult<LockedApplication<'a>> {
        let now = self.clock.now();
        self.package_validator
            .validate(application.get(), package, now)?;
        self.apply_config(application, package, now)
    }

    fn apply_config<'a>(
        &self,
        application: LockedApplication<'a>,
        package: &ApplicationPackage,
        now: u64,
    ) -> ControllerResult<LockedApplication<'a>> {
        let spec = &package.deployment_spec;
        let previous_spec = application.get().deployment_spec().clone();
        let mut application = application
            .with_deployment_spec(spec.clone())
            .with_validation_overrides(package.validation_overrides.clone());

        for declared in spec.instances() {
            if application.get().instance(&declared.name).is_some() {
                let tags = declared.tags.clone();
                application = application.with_instance(&declared.name, |i| i.with_tags(tags));
            } else {
                let id = application.get().id().instance(declared.name.clone());
                application = self.with_new_instance(application, &id, declared.tags.clone())?;
            }
        }

        let removed = removed_production_deployments(application.get(), spec);
        if !removed.is_empty() {
            if !package
                .validation_overrides
                .allows(ValidationId::DeploymentRemoval, now)
            {
                let regions: Vec<String> = removed
                    .iter()
                    .map(|d| format!("{} (instance {})", d.zone.region, d.instance.instance))
                    .collect();
                return Err(ControllerError::IllegalArgument(format!(
                    "{}: application '{}' is deployed in {}, but the deployment spec no longer \
                     declares {}. {}",
                    ValidationId::DeploymentRemoval,
                    application.get().id(),
                    regions.join(", "),
                    if regions.len() == 1 { "it" } else { "them" },
                    ValidationOverrides::allow_message(ValidationId::DeploymentRemoval)
                )));
            }
            for deployment in &removed {
                application = self.deactivate_locked(application, deployment, &previous_spec)?;
            }
        }

        let undeclared: Vec<_> = application
            .get()
            .instances()
            .values()
            .filter(|i| spec.instance(i.name()).is_none() && i.deployments().is_empty())
            .map(|i| i.name().clone())
            .collect();
        for name in &undeclared {
            self.routing
                .remove_rotation_endpoints_from_dns(application.get(), name)?;
            application = application.without(name);
            info!(application = %application.get().id(), instance = %name, "removed undeclared instance");
        }

        self.store.write_application(&application)?;
        self.remove_orphaned_notifications(application.get())?;
        Ok(application)
    }

    // ── Deployment ─────────────────────────────────────────────────

    /// Deploy the current run of `job`, with its source versions if
    /// `deploy_source_versions` is set.
    ///
    /// The application lock is only held while preparing routing and while
    /// recording the result; the deployer is called without it. Routing of
    /// the zone is reconfigured afterwards whether the deployment succeeded
    /// or not.
    pub fn deploy(&self, job: &JobId, deploy_source_versions: bool) -> ControllerResult<DeploymentResult> {
        let instance_id = &job.instance;
        let zone = job.zone();
        let application_id = instance_id.application_id();
        let deployment = DeploymentId::new(instance_id.clone(), zone.clone());
        let _deployment_lock = self.store.lock_deployment(instance_id, zone)?;

        let run = self
            .store
            .last_run(job)?
            .ok_or_else(|| ControllerError::IllegalState(format!("no run of {job} to deploy")))?;
        if run.has_ended() {
            return Err(ControllerError::IllegalState(format!(
                "run {} of {job} has already ended",
                run.id.number
            )));
        }
        let (platform, revision) = if deploy_source_versions {
            (
                run.versions
                    .source_platform
                    .clone()
                    .unwrap_or_else(|| run.versions.target_platform.clone()),
                run.versions
                    .source_revision
                    .unwrap_or(run.versions.target_revision),
            )
        } else {
            (run.versions.target_platform.clone(), run.versions.target_revision)
        };
        let package = self.store.read_package(&application_id, revision)?.ok_or_else(|| {
            ControllerError::NotExists(format!("package of {application_id} for {revision}"))
        })?;

        let (tags, cloud_account, spec, prepared) = {
            let lock = self.store.lock_application(&application_id)?;
            let application = self.require(&application_id)?;
            let instance = application.instance(&instance_id.instance).ok_or_else(|| {
                ControllerError::NotExists(format!("instance '{instance_id}'"))
            })?;
            let tags = instance.tags().clone();
            let spec = application.deployment_spec().clone();
            let cloud_account = cloud_account(&spec, &deployment);
            let certificate = EndpointCertificate {
                key_name: format!("{}-key", self.routing.certificate_common_name(&deployment)),
                cert_name: format!("{}-cert", self.routing.certificate_common_name(&deployment)),
                dns_names: self.routing.certificate_dns_names(&deployment, &spec),
            };
            let (_, prepared) = self.routing.prepare(
                &deployment,
                &package.services,
                Some(certificate),
                LockedApplication::new(application, &lock),
            )?;
            self.routing.register_rotation_endpoints_in_dns(&prepared)?;
            (tags, cloud_account, spec, prepared)
        };

        debug!(%deployment, %platform, %revision, "deploying");
        let deployed = {
            let _reconfigure = scopeguard::guard((), |_| self.reconfigure_routing(&deployment, &spec));
            self.deployer.deploy(DeploymentRequest {
                instance: instance_id,
                tags: &tags,
                zone,
                package: &package,
                platform: &platform,
                endpoints: &prepared,
                cloud_account: &cloud_account,
                dry_run: run.dry_run,
            })
        };
        let result = deployed?;

        let source = NotificationSource::from_deployment(instance_id, zone.clone());
        if result.warnings.is_empty() {
            self.notifier
                .remove(&source, NotificationType::ApplicationPackage)?;
        } else {
            self.notifier.set(
                source,
                NotificationType::ApplicationPackage,
                NotificationLevel::Warning,
                result.warnings.clone(),
            )?;
        }
        if run.dry_run {
            info!(%deployment, "dry run complete, nothing recorded");
            return Ok(result);
        }

        let lock = self.store.lock_application(&application_id)?;
        let application = LockedApplication::new(self.require(&application_id)?, &lock);
        let quota = result.quota;
        let now = self.clock.now();
        let application = application.with_instance(&instance_id.instance, |i| {
            i.with_new_deployment(zone.clone(), cloud_account, revision, platform.clone(), now, quota)
        });
        self.store.write_application(&application)?;
        info!(%deployment, %platform, %revision, "deployed");
        Ok(result)
    }

    /// Point DNS at what the deployer provisioned, and remember manual
    /// deployments. Failures are logged.
    fn reconfigure_routing(&self, deployment: &DeploymentId, spec: &DeploymentSpec) {
        let load_balancers = self.deployer.load_balancers(deployment);
        if let Err(e) = self.routing.configure(deployment, spec, &load_balancers) {
            warn!(%deployment, error = %e, "failed to reconfigure routing");
        }
        if deployment.zone.environment.is_manually_deployed() {
            let meta = DeploymentMeta {
                instance: deployment.instance.clone(),
                zone: deployment.zone.clone(),
                at: self.clock.now(),
            };
            if let Err(e) = self.store.write_deployment_meta(&meta) {
                warn!(%deployment, error = %e, "failed to store deployment metadata");
            }
        }
    }

    /// Remove a deployment.
    pub fn deactivate(&self, deployment: &DeploymentId) -> ControllerResult<()> {
        let application_id = deployment.application_id();
        let lock = self.store.lock_application(&application_id)?;
        let application = LockedApplication::new(self.require(&application_id)?, &lock);
        let spec = application.get().deployment_spec().clone();
        let application = self.deactivate_locked(application, deployment, &spec)?;
        self.store.write_application(&application)?;
        self.notifier.remove_all(&NotificationSource::from_deployment(
            &deployment.instance,
            deployment.zone.clone(),
        ))?;
        Ok(())
    }

    fn deactivate_locked<'a>(
        &self,
        application: LockedApplication<'a>,
        deployment: &DeploymentId,
        spec: &DeploymentSpec,
    ) -> ControllerResult<LockedApplication<'a>> {
        self.deployer.deactivate(deployment)?;
        self.routing
            .remove_zone_endpoints(deployment, spec, application.lock())?;
        info!(%deployment, "deactivated deployment");
        Ok(application.with_instance(&deployment.instance.instance, |i| {
            i.without_deployment_in(&deployment.zone)
        }))
    }

    // ── Deletion ───────────────────────────────────────────────────

    /// Delete an instance without deployments.
    pub fn delete_instance(&self, id: &InstanceId) -> ControllerResult<()> {
        let application_id = id.application_id();
        let lock = self.store.lock_application(&application_id)?;
        let application = self.require(&application_id)?;
        let instance = application
            .instance(&id.instance)
            .ok_or_else(|| ControllerError::NotExists(format!("instance '{id}'")))?;
        if !instance.deployments().is_empty() {
            let zones: Vec<String> = instance.deployments().keys().map(|z| z.to_string()).collect();
            return Err(ControllerError::IllegalArgument(format!(
                "could not delete '{id}': it has active deployments in: {}",
                zones.join(", ")
            )));
        }
        self.routing
            .remove_rotation_endpoints_from_dns(&application, &id.instance)?;
        let application = LockedApplication::new(application, &lock).without(&id.instance);
        self.store.write_application(&application)?;
        self.notifier
            .remove_all(&NotificationSource::from_instance(id))?;
        info!(instance = %id, "deleted instance");
        Ok(())
    }

    /// Delete an application without deployments, with all its instances.
    pub fn delete_application(
        &self,
        id: &ApplicationId,
        credentials: &Credentials,
    ) -> ControllerResult<()> {
        let lock = self.store.lock_application(id)?;
        let application = self.require(id)?;
        let deployed: Vec<String> = application
            .instances()
            .values()
            .flat_map(|i| i.deployments().keys().map(move |z| format!("{} in {z}", i.name())))
            .collect();
        if !deployed.is_empty() {
            return Err(ControllerError::IllegalArgument(format!(
                "could not delete application '{id}': it has active deployments: {}",
                deployed.join(", ")
            )));
        }
        self.access_control.delete_application(id, credentials)?;
        for name in application.instances().keys() {
            self.routing
                .remove_rotation_endpoints_from_dns(&application, name)?;
        }
        self.store.remove_application(&lock)?;
        self.notifier
            .remove_all(&NotificationSource::from_application(id))?;
        info!(application = %id, user = %credentials.user, "deleted application");
        Ok(())
    }

    // ── Versions ───────────────────────────────────────────────────

    /// The platform version to compile the application against. Without an
    /// explicit major, the deployment spec's major applies, then the
    /// application's own override.
    pub fn compile_version(
        &self,
        id: &ApplicationId,
        wanted_major: Option<u64>,
    ) -> ControllerResult<Version> {
        let application = self.require(id)?;
        let wanted_major = wanted_major
            .or(application.deployment_spec().major_version())
            .or(application.major_version());
        Ok(self.versions.compile_version(&application, wanted_major)?)
    }

    /// Pin the application to a platform major, or unpin it with `None`.
    pub fn set_major_version(
        &self,
        id: &ApplicationId,
        major: Option<u64>,
    ) -> ControllerResult<()> {
        self.lock_or_throw(id, |application| application.with_major_version(major))?;
        info!(application = %id, ?major, "set major version");
        Ok(())
    }

    // ── Deploy keys ────────────────────────────────────────────────

    /// Allow `key` (PEM) to submit packages for the application.
    pub fn add_deploy_key(&self, id: &ApplicationId, key: String) -> ControllerResult<()> {
        self.lock_or_throw(id, |application| application.with_deploy_key(key))
    }

    pub fn remove_deploy_key(&self, id: &ApplicationId, key: &str) -> ControllerResult<()> {
        self.lock_or_throw(id, |application| application.without_deploy_key(key))
    }

    /// Read the application under its lock, modify and write it back.
    fn lock_or_throw(
        &self,
        id: &ApplicationId,
        modify: impl for<'a> FnOnce(LockedApplication<'a>) -> LockedApplication<'a>,
    ) -> ControllerResult<()> {
        let lock = self.store.lock_application(id)?;
        let application = LockedApplication::new(self.require(id)?, &lock);
        self.store.write_application(&modify(application))?;
        Ok(())
    }

    // ── Notifications ──────────────────────────────────────────────

    /// Drop notifications about instances and deployments the application
    /// no longer has.
    fn remove_orphaned_notifications(&self, application: &Application) -> ControllerResult<()> {
        let id = application.id();
        self.notifier.remove_if(&id.tenant, |n| {
            if n.source.application.as_ref() != Some(&id.application) {
                return false;
            }
            let Some(name) = &n.source.instance else {
                return false;
            };
            match application.instance(name) {
                None => true,
                Some(instance) => n
                    .source
                    .zone
                    .as_ref()
                    .is_some_and(|zone| instance.deployment(zone).is_none()),
            }
        })
    }
}

/// Production deployments of `application` that `spec` no longer declares.
fn removed_production_deployments(application: &Application, spec: &DeploymentSpec) -> Vec<DeploymentId> {
    let mut removed = BTreeSet::new();
    for instance in application.instances().values() {
        let declared = spec.instance(instance.name());
        for deployment in instance.production_deployments() {
            let kept = declared
                .is_some_and(|d| d.deploys_to(Environment::Prod, Some(&deployment.zone.region)));
            if !kept {
                removed.insert(DeploymentId::new(instance.id().clone(), deployment.zone.clone()));
            }
        }
    }
    removed.into_iter().collect()
}

fn cloud_account(spec: &DeploymentSpec, deployment: &DeploymentId) -> CloudAccount {
    spec.instance(&deployment.instance.instance)
        .and_then(|i| i.cloud_account(deployment.zone.environment, &deployment.zone.region))
        .unwrap_or_else(CloudAccount::empty)
}
