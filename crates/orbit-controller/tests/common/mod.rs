//! Shared setup for controller scenarios: an in-memory store, two
//! production zones with exclusive routing, a dev zone and a recording
//! deployer.

#![allow(dead_code)]

use std::sync::Arc;

use orbit_controller::testing::{
    AcceptAll, AllowAll, FixedArtifactRepository, FixedNodeRepository, RecordingDeployer,
};
use orbit_controller::{
    ApplicationController, Collaborators, Credentials, Deployer, TenantController, TenantSpec,
};
use orbit_core::config::{RotationConfig, SystemConfig, ZoneConfig};
use orbit_core::{
    ApplicationId, ApplicationPackage, Clock, ClusterId, ContainerSpec, DeploymentSpec, EndpointId,
    Environment, InstanceId, InstanceName, InstanceSpec, JobId, JobType, ManualClock, OrbitConfig,
    RegionName, RevisionId, RotationId, RoutingMethod, ServicesSpec, Tags, TenantName, Version,
    ZoneId,
};
use orbit_routing::{
    MemoryNameService, NameServiceDispatcher, QueuedNameServiceForwarder, RoutingController,
};
use orbit_state::{
    Confidence, PlatformVersion, Run, RunId, RunStatus, RunVersions, StateStore, VersionStatus,
};
use orbit_version::{VersionCompatibility, VersionSelector};

pub const START: u64 = 1_700_000_000;

pub struct Harness {
    pub store: StateStore,
    pub clock: Arc<ManualClock>,
    pub deployer: Arc<RecordingDeployer>,
    pub tenants: TenantController,
    pub applications: ApplicationController,
    pub dns: Arc<MemoryNameService>,
    pub dispatcher: NameServiceDispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_deployer(RecordingDeployer::new())
    }

    pub fn with_deployer(deployer: RecordingDeployer) -> Self {
        Self::wrapping(deployer, |_, deployer| deployer as Arc<dyn Deployer>)
    }

    /// Deploy through whatever `wrap` builds around the recording deployer.
    pub fn wrapping(
        deployer: RecordingDeployer,
        wrap: impl FnOnce(StateStore, Arc<RecordingDeployer>) -> Arc<dyn Deployer>,
    ) -> Self {
        let store = StateStore::open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::at(START));
        let deployer = Arc::new(deployer);
        let config = config();

        let lock = store.lock_version_status().unwrap();
        let status = VersionStatus::new(vec![
            PlatformVersion::new(platform(), Confidence::High).as_system_version(),
        ]);
        store.write_version_status(&status, &lock).unwrap();
        drop(lock);

        let forwarder = Arc::new(QueuedNameServiceForwarder::new(store.clone(), 1_000));
        let routing = RoutingController::from_config(store.clone(), &config, forwarder);
        let versions = VersionSelector::new(
            store.clone(),
            VersionCompatibility::from_config(&config.versions),
            Arc::new(FixedNodeRepository::default()),
            Arc::new(FixedArtifactRepository::default()),
            config.system.public,
        );
        let applications = ApplicationController::new(
            store.clone(),
            routing,
            versions,
            Collaborators {
                deployer: wrap(store.clone(), deployer.clone()),
                access_control: Arc::new(AllowAll),
                package_validator: Arc::new(AcceptAll),
                clock: clock.clone(),
            },
        );
        let tenants = TenantController::new(store.clone(), Arc::new(AllowAll), clock.clone());
        let dns = Arc::new(MemoryNameService::new());
        let dispatcher = NameServiceDispatcher::new(store.clone(), dns.clone(), 1_000);

        Self {
            store,
            clock,
            deployer,
            tenants,
            applications,
            dns,
            dispatcher,
        }
    }

    /// Tenant `acme` with application `search`, instance `default`
    /// submitted with a spec for `regions`. Returns the revision.
    pub fn setup(&self, regions: &[&str]) -> RevisionId {
        self.tenants
            .create(TenantSpec::Cloud { name: TenantName::new("acme").unwrap() }, &user())
            .unwrap();
        self.applications
            .create_application(&application_id(), &user())
            .unwrap();
        self.applications
            .create_instance(&instance_id(), Tags::parse("beta"))
            .unwrap();
        self.applications
            .submit(&application_id(), package(regions), Some("abc123".to_string()))
            .unwrap()
    }

    /// Start a run of the job deploying `revision` to `zone`.
    pub fn start_run(&self, zone: &ZoneId, revision: RevisionId) -> JobId {
        self.start_run_with(zone, revision, false)
    }

    pub fn start_run_with(&self, zone: &ZoneId, revision: RevisionId, dry_run: bool) -> JobId {
        let job = JobId::new(instance_id(), JobType::of(zone.clone()));
        let number = self.store.read_runs(&job).unwrap().len() as u64 + 1;
        let mut run = Run::started(
            RunId::new(job.clone(), number),
            RunVersions::new(platform(), revision),
            self.clock.now(),
        );
        run.dry_run = dry_run;
        self.store.write_run(&run).unwrap();
        job
    }

    pub fn end_run(&self, job: &JobId) {
        let run = self.store.last_run(job).unwrap().unwrap();
        self.store
            .write_run(&run.finished(RunStatus::Success, self.clock.now()))
            .unwrap();
    }

    /// Start a run for `zone`, deploy it and end the run.
    pub fn deploy(&self, zone: &ZoneId, revision: RevisionId) {
        let job = self.start_run(zone, revision);
        self.applications.deploy(&job, false).unwrap();
        self.end_run(&job);
    }

    /// Apply every queued DNS change.
    pub fn flush_dns(&self) {
        while self.dispatcher.dispatch().unwrap() > 0 {}
    }
}

pub fn config() -> OrbitConfig {
    let zone = |environment, region: &str| ZoneConfig {
        environment,
        region: region.parse().unwrap(),
        routing_methods: vec![RoutingMethod::Exclusive],
        vip_hostname: None,
        cloud_account: None,
    };
    OrbitConfig {
        system: SystemConfig {
            name: "test".to_string(),
            public: false,
            dns_suffix: "o.cloud".to_string(),
        },
        zones: vec![
            zone(Environment::Prod, "us-east"),
            zone(Environment::Prod, "eu-west"),
            zone(Environment::Dev, "us-east"),
        ],
        rotations: (1..=2)
            .map(|i| RotationConfig {
                id: RotationId::new(format!("rotation-{i:02}")),
                name: format!("rotation-fqdn-{i:02}"),
            })
            .collect(),
        ..OrbitConfig::default()
    }
}

pub fn user() -> Credentials {
    Credentials::of("alice")
}

pub fn platform() -> Version {
    Version::new(8, 1, 0)
}

pub fn application_id() -> ApplicationId {
    ApplicationId::from_parts("acme", "search").unwrap()
}

pub fn instance_id() -> InstanceId {
    application_id().default_instance()
}

pub fn prod(region: &str) -> ZoneId {
    ZoneId::prod(region).unwrap()
}

pub fn dev(region: &str) -> ZoneId {
    ZoneId::new(Environment::Dev, region.parse().unwrap())
}

/// A package deploying the default instance to `regions`, with a global
/// endpoint over all of them.
pub fn package(regions: &[&str]) -> ApplicationPackage {
    let regions: Vec<RegionName> = regions.iter().map(|r| r.parse().unwrap()).collect();
    let mut instance = InstanceSpec::new(InstanceName::default_name())
        .with_tags(Tags::parse("beta"))
        .with_prod_regions(&regions);
    if !regions.is_empty() {
        instance = instance.with_endpoint(EndpointId::default_id(), ClusterId::default_id(), &[]);
    }
    let spec = DeploymentSpec::new(vec![instance], vec![], None).unwrap();
    ApplicationPackage::new(
        spec,
        ServicesSpec::with_containers(vec![ContainerSpec::new(ClusterId::default_id())]),
    )
}
