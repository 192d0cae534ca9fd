//! The routing controller: prepares endpoints for a deployment and keeps DNS
//! in line with them.

use std::collections::BTreeMap;
use std::sync::Arc;

use orbit_core::{
    ApplicationId, AuthMethod, ClusterId, DeploymentId, DeploymentSpec, Environment, InstanceName,
    OrbitConfig, RoutingMethod, ServicesSpec,
};
use orbit_state::{
    Application, ApplicationLock, AssignedRotation, GeneratedEndpoint, GeneratedEndpoints,
    LockedApplication, Priority, Record, RecordType, StateStore,
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::certificate;
use crate::computer::EndpointComputer;
use crate::endpoint::{EndpointList, EndpointScope};
use crate::error::{RoutingError, RoutingResult};
use crate::name_service::NameServiceForwarder;
use crate::rotation::RotationAssigner;

/// A load balancer provisioned for one cluster of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    pub cluster: ClusterId,
    pub hostname: String,
}

/// Certificate the deployment serves its endpoints with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCertificate {
    pub key_name: String,
    pub cert_name: String,
    pub dns_names: Vec<String>,
}

/// Everything a deployment needs to know about its routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedEndpoints {
    pub deployment: DeploymentId,
    /// Zone and region endpoints of every container cluster, and the declared
    /// endpoints targeting this deployment.
    pub endpoints: EndpointList,
    pub rotations: Vec<AssignedRotation>,
    pub certificate: Option<EndpointCertificate>,
}

#[derive(Clone)]
pub struct RoutingController {
    store: StateStore,
    computer: EndpointComputer,
    rotations: RotationAssigner,
    forwarder: Arc<dyn NameServiceForwarder>,
    generate_endpoints: bool,
}

impl RoutingController {
    pub fn new(
        store: StateStore,
        computer: EndpointComputer,
        rotations: RotationAssigner,
        forwarder: Arc<dyn NameServiceForwarder>,
        generate_endpoints: bool,
    ) -> Self {
        Self {
            store,
            computer,
            rotations,
            forwarder,
            generate_endpoints,
        }
    }

    pub fn from_config(
        store: StateStore,
        config: &OrbitConfig,
        forwarder: Arc<dyn NameServiceForwarder>,
    ) -> Self {
        Self::new(
            store.clone(),
            EndpointComputer::from_config(config),
            RotationAssigner::from_config(store, config),
            forwarder,
            config.routing.generated_endpoints,
        )
    }

    pub fn computer(&self) -> &EndpointComputer {
        &self.computer
    }

    /// Assign rotations, create generated endpoints and compute the endpoint
    /// set of a deployment. Rotations are persisted right away, so a failing
    /// deployment still keeps what it was assigned. Calling this again with
    /// the same inputs yields the same result.
    pub fn prepare<'a>(
        &self,
        deployment: &DeploymentId,
        services: &ServicesSpec,
        certificate: Option<EndpointCertificate>,
        application: LockedApplication<'a>,
    ) -> RoutingResult<(LockedApplication<'a>, PreparedEndpoints)> {
        let spec = application.get().deployment_spec().clone();
        let mut application = application;

        if deployment.zone.environment.is_production() {
            let lock = self.store.lock_rotations()?;
            for instance_spec in spec.instances() {
                if !instance_spec.concerns(Environment::Prod) {
                    continue;
                }
                if application.get().instance(&instance_spec.name).is_none() {
                    continue;
                }
                let rotations = self.rotations.get_or_assign_rotations(
                    &spec,
                    application.get(),
                    &instance_spec.name,
                    &lock,
                )?;
                application =
                    application.with_instance(&instance_spec.name, |i| i.with_rotations(rotations));
            }
            self.store.write_application(&application)?;
        }

        let generated = self.generated_endpoints(deployment, services, application.lock())?;
        let mut endpoints = EndpointList::default();
        for container in &services.containers {
            let cluster_generated = generated
                .get(&container.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            endpoints = endpoints.and(self.computer.compute_endpoints(
                deployment,
                &container.id,
                cluster_generated,
            ));
        }
        let declared = self
            .computer
            .declared_endpoints_of(application.get().id(), &spec)?
            .targets(deployment);
        endpoints = endpoints.and(declared);

        let rotations = application
            .get()
            .instance(&deployment.instance.instance)
            .map(|i| i.rotations().to_vec())
            .unwrap_or_default();
        debug!(%deployment, endpoints = endpoints.len(), "prepared endpoints");
        let prepared = PreparedEndpoints {
            deployment: deployment.clone(),
            endpoints,
            rotations,
            certificate,
        };
        Ok((application, prepared))
    }

    /// Point global endpoints routed through the shared layer at their
    /// rotations, and shared application endpoints at their zone's VIP.
    pub fn register_rotation_endpoints_in_dns(&self, prepared: &PreparedEndpoints) -> RoutingResult<()> {
        let owner = prepared.deployment.application_id();
        for endpoint in prepared.endpoints.scope(EndpointScope::Global).iter() {
            if !endpoint.requires_rotation() {
                continue;
            }
            let rotation = prepared.rotations.iter().find(|r| {
                Some(&r.endpoint_id) == endpoint.id.as_ref() && r.cluster == endpoint.cluster
            });
            let Some(target) = rotation.and_then(|r| self.rotations.rotation_name(&r.rotation_id)) else {
                warn!(endpoint = %endpoint.dns_name, "no rotation for global endpoint");
                continue;
            };
            self.forwarder.create_record(
                Record::new(RecordType::Cname, &endpoint.dns_name, target),
                Priority::Normal,
                Some(&owner),
            )?;
        }
        for endpoint in prepared.endpoints.scope(EndpointScope::Application).iter() {
            if !endpoint.routing_method.is_shared() {
                continue;
            }
            let Some(target) = endpoint.targets.first() else {
                continue;
            };
            let zone = &target.deployment.zone;
            let vip = self
                .computer
                .zones()
                .vip_hostname(zone)
                .ok_or_else(|| RoutingError::MissingVipConfiguration(zone.clone()))?;
            self.forwarder.create_record(
                Record::new(RecordType::Cname, &endpoint.dns_name, vip),
                Priority::Normal,
                Some(&owner),
            )?;
        }
        Ok(())
    }

    /// Remove the global endpoint records of an instance, recomputed from its
    /// persisted rotation assignments alone.
    pub fn remove_rotation_endpoints_from_dns(
        &self,
        application: &Application,
        instance: &InstanceName,
    ) -> RoutingResult<()> {
        let Some(instance) = application.instance(instance) else {
            return Ok(());
        };
        let owner = application.id();
        for rotation in instance.rotations() {
            let endpoint = self.computer.rotation_endpoint(instance.id(), rotation);
            self.forwarder.remove_records(
                RecordType::Cname,
                &endpoint.dns_name,
                None,
                Priority::Normal,
                Some(owner),
            )?;
        }
        Ok(())
    }

    /// Reconcile DNS with the load balancers a deployment actually got:
    /// records of clusters without a load balancer are removed, records of
    /// the others created according to the zone's routing method.
    pub fn configure(
        &self,
        deployment: &DeploymentId,
        spec: &DeploymentSpec,
        load_balancers: &[LoadBalancer],
    ) -> RoutingResult<()> {
        let owner = deployment.application_id();
        let lock = self.store.lock_application(&owner)?;
        let mut generated = self
            .store
            .read_generated_endpoints(&deployment.instance, &deployment.zone)?;
        let balanced: BTreeMap<&ClusterId, &LoadBalancer> =
            load_balancers.iter().map(|lb| (&lb.cluster, lb)).collect();

        let stale: Vec<ClusterId> = generated
            .keys()
            .filter(|cluster| !balanced.contains_key(cluster))
            .cloned()
            .collect();
        for cluster in &stale {
            let cluster_generated = generated.remove(cluster).unwrap_or_default();
            self.remove_cluster_records(deployment, cluster, &cluster_generated, &owner)?;
            info!(%deployment, %cluster, "removed records of cluster without load balancer");
        }
        if !stale.is_empty() {
            self.store.write_generated_endpoints(
                &deployment.instance,
                &deployment.zone,
                &generated,
                &lock,
            )?;
        }

        let method = self.computer.zones().primary_method(&deployment.zone);
        for lb in load_balancers {
            let target = match method {
                RoutingMethod::Exclusive => lb.hostname.as_str(),
                RoutingMethod::SharedLayer4 => self
                    .computer
                    .zones()
                    .vip_hostname(&deployment.zone)
                    .ok_or_else(|| RoutingError::MissingVipConfiguration(deployment.zone.clone()))?,
                RoutingMethod::Shared => continue,
            };
            let cluster_generated = generated.get(&lb.cluster).map(Vec::as_slice).unwrap_or_default();
            for endpoint in &self.computer.compute_endpoints(deployment, &lb.cluster, cluster_generated) {
                self.forwarder.create_record(
                    Record::new(RecordType::Cname, &endpoint.dns_name, target),
                    Priority::Normal,
                    Some(&owner),
                )?;
            }
        }

        if method == RoutingMethod::Exclusive {
            for (name, (cluster, data)) in self.exclusive_aliases(deployment, spec)? {
                if balanced.contains_key(&cluster) {
                    self.forwarder.create_record(
                        Record::new(RecordType::Alias, name, data),
                        Priority::Normal,
                        Some(&owner),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Remove every zone and region record of a deployment, its share of
    /// exclusively routed declared endpoints, and its generated endpoints.
    pub fn remove_zone_endpoints(
        &self,
        deployment: &DeploymentId,
        spec: &DeploymentSpec,
        lock: &ApplicationLock,
    ) -> RoutingResult<()> {
        let owner = deployment.application_id();
        let generated = self
            .store
            .read_generated_endpoints(&deployment.instance, &deployment.zone)?;
        for (cluster, cluster_generated) in &generated {
            self.remove_cluster_records(deployment, cluster, cluster_generated, &owner)?;
        }
        if self.computer.zones().primary_method(&deployment.zone) == RoutingMethod::Exclusive {
            for (name, (_, data)) in self.exclusive_aliases(deployment, spec)? {
                self.forwarder.remove_records(
                    RecordType::Alias,
                    &name,
                    Some(&data),
                    Priority::Normal,
                    Some(&owner),
                )?;
            }
        }
        self.store
            .remove_generated_endpoints(&deployment.instance, &deployment.zone, lock)?;
        info!(%deployment, "removed zone endpoints");
        Ok(())
    }

    /// Names the deployment's certificate must cover.
    pub fn certificate_dns_names(&self, deployment: &DeploymentId, spec: &DeploymentSpec) -> Vec<String> {
        certificate::dns_names(deployment, spec, self.computer.dns_suffix())
    }

    pub fn certificate_common_name(&self, deployment: &DeploymentId) -> String {
        certificate::common_name(deployment, self.computer.dns_suffix())
    }

    fn remove_cluster_records(
        &self,
        deployment: &DeploymentId,
        cluster: &ClusterId,
        generated: &[GeneratedEndpoint],
        owner: &ApplicationId,
    ) -> RoutingResult<()> {
        for endpoint in &self.computer.compute_endpoints(deployment, cluster, generated) {
            self.forwarder.remove_records(
                RecordType::Cname,
                &endpoint.dns_name,
                None,
                Priority::Normal,
                Some(owner),
            )?;
        }
        Ok(())
    }

    /// Exclusively routed declared endpoints targeting the deployment, each
    /// with the cluster it serves and the name its alias points at: the region
    /// endpoint for global endpoints, the zone endpoint for application ones.
    fn exclusive_aliases(
        &self,
        deployment: &DeploymentId,
        spec: &DeploymentSpec,
    ) -> RoutingResult<Vec<(String, (ClusterId, String))>> {
        let declared = self
            .computer
            .declared_endpoints_of(&deployment.application_id(), spec)?
            .targets(deployment);
        Ok(declared
            .into_iter()
            .filter(|e| e.routing_method == RoutingMethod::Exclusive)
            .map(|e| {
                let data = match e.scope {
                    EndpointScope::Application => self.computer.zone_name(deployment, &e.cluster),
                    _ => self.computer.region_name(deployment, &e.cluster),
                };
                (e.dns_name, (e.cluster, data))
            })
            .collect())
    }

    /// Read the deployment's generated endpoints, adding any its containers
    /// now need, and persist the result. Clusters are recorded even when
    /// endpoint generation is off, so later reconciliation knows them.
    fn generated_endpoints(
        &self,
        deployment: &DeploymentId,
        services: &ServicesSpec,
        lock: &ApplicationLock,
    ) -> RoutingResult<GeneratedEndpoints> {
        let mut generated = self
            .store
            .read_generated_endpoints(&deployment.instance, &deployment.zone)?;
        let application_part = generated
            .values()
            .flatten()
            .map(|g| g.application_part.clone())
            .next()
            .unwrap_or_else(random_label);

        let mut changed = false;
        for container in &services.containers {
            if !generated.contains_key(&container.id) {
                generated.insert(container.id.clone(), Vec::new());
                changed = true;
            }
            if !self.generate_endpoints {
                continue;
            }
            let existing = generated.entry(container.id.clone()).or_default();
            for auth_method in [AuthMethod::Mtls, AuthMethod::Token] {
                if !container.supports(auth_method) || existing.iter().any(|g| g.auth_method == auth_method) {
                    continue;
                }
                existing.push(GeneratedEndpoint {
                    cluster_part: random_label(),
                    application_part: application_part.clone(),
                    auth_method,
                });
                changed = true;
            }
        }
        if changed {
            self.store.write_generated_endpoints(
                &deployment.instance,
                &deployment.zone,
                &generated,
                lock,
            )?;
        }
        Ok(generated)
    }
}

/// Eight random hex characters.
fn random_label() -> String {
    format!("{:08x}", rand::thread_rng().r#gen::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::config::{RotationConfig, ZoneConfig};
    use orbit_core::{
        ContainerSpec, EndpointId, InstanceSpec, RegionName, RotationId, Tags, ZoneId,
    };

    use crate::name_service::{
        MemoryNameService, NameService, NameServiceDispatcher, QueuedNameServiceForwarder,
    };
    use crate::zone::ZoneRouting;

    struct Fixture {
        store: StateStore,
        routing: RoutingController,
        dns: Arc<MemoryNameService>,
        dispatcher: NameServiceDispatcher,
        id: ApplicationId,
    }

    impl Fixture {
        fn new(methods: &[RoutingMethod], generate: bool) -> Self {
            let store = StateStore::open_in_memory().unwrap();
            let zones = ["us-east", "eu-west"].map(|region| ZoneConfig {
                environment: Environment::Prod,
                region: region.parse().unwrap(),
                routing_methods: methods.to_vec(),
                vip_hostname: Some(format!("vip.{region}.o.cloud")),
                cloud_account: None,
            });
            let rotations = vec![RotationConfig {
                id: RotationId::new("rotation-01"),
                name: "rotation-fqdn-01".to_string(),
            }];
            let forwarder = Arc::new(QueuedNameServiceForwarder::new(store.clone(), 1000));
            let routing = RoutingController::new(
                store.clone(),
                EndpointComputer::new(ZoneRouting::new(zones), "o.cloud"),
                RotationAssigner::new(store.clone(), rotations),
                forwarder,
                generate,
            );
            let dns = Arc::new(MemoryNameService::new());
            let dispatcher = NameServiceDispatcher::new(store.clone(), dns.clone(), 1000);
            let id = ApplicationId::from_parts("acme", "search").unwrap();

            let regions: Vec<RegionName> = ["us-east", "eu-west"].map(|r| r.parse().unwrap()).to_vec();
            let spec = DeploymentSpec::new(
                vec![InstanceSpec::new(InstanceName::default_name())
                    .with_prod_regions(&regions)
                    .with_endpoint(EndpointId::default_id(), ClusterId::default_id(), &[])],
                vec![],
                None,
            )
            .unwrap();
            let lock = store.lock_application(&id).unwrap();
            let locked = LockedApplication::new(Application::new(id.clone(), 0), &lock)
                .with_new_instance(InstanceName::default_name(), Tags::empty())
                .with_deployment_spec(spec);
            store.write_application(&locked).unwrap();
            drop(locked);
            drop(lock);

            Self {
                store,
                routing,
                dns,
                dispatcher,
                id,
            }
        }

        fn deployment(&self, region: &str) -> DeploymentId {
            DeploymentId::new(self.id.default_instance(), ZoneId::prod(region).unwrap())
        }

        fn services(&self) -> ServicesSpec {
            ServicesSpec::with_containers(vec![ContainerSpec::new(ClusterId::default_id()).with_token()])
        }

        fn prepare(&self, region: &str) -> PreparedEndpoints {
            let lock = self.store.lock_application(&self.id).unwrap();
            let application = self.store.read_application(&self.id).unwrap().unwrap();
            let locked = LockedApplication::new(application, &lock);
            let (locked, prepared) = self
                .routing
                .prepare(&self.deployment(region), &self.services(), None, locked)
                .unwrap();
            self.store.write_application(&locked).unwrap();
            prepared
        }

        fn spec(&self) -> DeploymentSpec {
            self.store
                .read_application(&self.id)
                .unwrap()
                .unwrap()
                .deployment_spec()
                .clone()
        }

        fn dispatch(&self) {
            while self.dispatcher.dispatch().unwrap() > 0 {}
        }
    }

    #[test]
    fn prepare_is_idempotent() {
        let fixture = Fixture::new(&[RoutingMethod::Exclusive], true);
        let first = fixture.prepare("us-east");
        let second = fixture.prepare("us-east");
        assert_eq!(first, second);
        assert_eq!(first.rotations.len(), 1);
        assert_eq!(first.rotations[0].rotation_id, RotationId::new("rotation-01"));
        // zone, region, generated mtls and token variants of both, and the global endpoint
        assert_eq!(first.endpoints.len(), 7);
        assert_eq!(first.endpoints.generated().len(), 4);
    }

    #[test]
    fn rotations_survive_a_failed_deployment() {
        let fixture = Fixture::new(&[RoutingMethod::Shared], false);
        {
            let lock = fixture.store.lock_application(&fixture.id).unwrap();
            let application = fixture.store.read_application(&fixture.id).unwrap().unwrap();
            let locked = LockedApplication::new(application, &lock);
            // Prepared, then dropped without writing, as a failed deployment would.
            let _ = fixture
                .routing
                .prepare(&fixture.deployment("us-east"), &fixture.services(), None, locked)
                .unwrap();
        }
        let application = fixture.store.read_application(&fixture.id).unwrap().unwrap();
        let instance = application.instance(&InstanceName::default_name()).unwrap();
        assert_eq!(instance.rotations().len(), 1);
    }

    #[test]
    fn instances_of_one_application_get_distinct_rotations() {
        let store = StateStore::open_in_memory().unwrap();
        let zones = vec![ZoneConfig {
            environment: Environment::Prod,
            region: "us-east".parse().unwrap(),
            routing_methods: vec![RoutingMethod::Exclusive],
            vip_hostname: None,
            cloud_account: None,
        }];
        let pool = (1..=2)
            .map(|i| RotationConfig {
                id: RotationId::new(format!("rotation-{i:02}")),
                name: format!("rotation-fqdn-{i:02}"),
            })
            .collect();
        let routing = RoutingController::new(
            store.clone(),
            EndpointComputer::new(ZoneRouting::new(zones), "o.cloud"),
            RotationAssigner::new(store.clone(), pool),
            Arc::new(QueuedNameServiceForwarder::new(store.clone(), 1000)),
            false,
        );

        let region: RegionName = "us-east".parse().unwrap();
        let blue = InstanceName::new("blue").unwrap();
        let green = InstanceName::new("green").unwrap();
        let instance = |name: &InstanceName| {
            InstanceSpec::new(name.clone())
                .with_prod_regions(&[region.clone()])
                .with_endpoint(EndpointId::default_id(), ClusterId::default_id(), &[])
        };
        let spec =
            DeploymentSpec::new(vec![instance(&blue), instance(&green)], vec![], None).unwrap();
        let id = ApplicationId::from_parts("acme", "search").unwrap();
        let lock = store.lock_application(&id).unwrap();
        let locked = LockedApplication::new(Application::new(id.clone(), 0), &lock)
            .with_new_instance(blue.clone(), Tags::empty())
            .with_new_instance(green.clone(), Tags::empty())
            .with_deployment_spec(spec);
        store.write_application(&locked).unwrap();

        let deployment = DeploymentId::new(id.instance(blue.clone()), ZoneId::prod("us-east").unwrap());
        let services = ServicesSpec::with_containers(vec![ContainerSpec::new(ClusterId::default_id())]);
        let (locked, _) = routing.prepare(&deployment, &services, None, locked).unwrap();

        let rotation_of = |name: &InstanceName| {
            locked.get().instance(name).unwrap().rotations()[0].rotation_id.clone()
        };
        assert_eq!(rotation_of(&blue), RotationId::new("rotation-01"));
        assert_eq!(rotation_of(&green), RotationId::new("rotation-02"));

        let stored = store.read_application(&id).unwrap().unwrap();
        assert_ne!(
            stored.instance(&blue).unwrap().rotations(),
            stored.instance(&green).unwrap().rotations()
        );
    }

    #[test]
    fn shared_global_endpoint_points_at_rotation() {
        let fixture = Fixture::new(&[RoutingMethod::Shared], false);
        let prepared = fixture.prepare("us-east");
        fixture.routing.register_rotation_endpoints_in_dns(&prepared).unwrap();
        fixture.dispatch();
        assert_eq!(
            fixture.dns.find_records(RecordType::Cname, "search.acme.g.o.cloud"),
            vec![Record::new(RecordType::Cname, "search.acme.g.o.cloud", "rotation-fqdn-01")]
        );

        let application = fixture.store.read_application(&fixture.id).unwrap().unwrap();
        fixture
            .routing
            .remove_rotation_endpoints_from_dns(&application, &InstanceName::default_name())
            .unwrap();
        fixture.dispatch();
        assert!(fixture.dns.find_records(RecordType::Cname, "search.acme.g.o.cloud").is_empty());
    }

    #[test]
    fn exclusive_configure_points_at_load_balancer_and_aliases_global() {
        let fixture = Fixture::new(&[RoutingMethod::Exclusive], false);
        let deployment = fixture.deployment("us-east");
        fixture.prepare("us-east");
        let lb = LoadBalancer {
            cluster: ClusterId::default_id(),
            hostname: "lb-1.us-east.aws".to_string(),
        };
        fixture.routing.configure(&deployment, &fixture.spec(), &[lb]).unwrap();
        fixture.dispatch();

        let zone = fixture.dns.find_records(RecordType::Cname, "search.acme.us-east.prod.z.o.cloud");
        assert_eq!(zone[0].data, "lb-1.us-east.aws");
        let region = fixture.dns.find_records(RecordType::Cname, "search.acme.us-east.r.o.cloud");
        assert_eq!(region[0].data, "lb-1.us-east.aws");
        let global = fixture.dns.find_records(RecordType::Alias, "search.acme.g.o.cloud");
        assert_eq!(global, vec![Record::new(RecordType::Alias, "search.acme.g.o.cloud", "search.acme.us-east.r.o.cloud")]);
    }

    #[test]
    fn layer4_configure_points_at_vip() {
        let fixture = Fixture::new(&[RoutingMethod::SharedLayer4], false);
        let deployment = fixture.deployment("eu-west");
        fixture.prepare("eu-west");
        let lb = LoadBalancer {
            cluster: ClusterId::default_id(),
            hostname: "lb-2".to_string(),
        };
        fixture.routing.configure(&deployment, &fixture.spec(), &[lb]).unwrap();
        fixture.dispatch();
        let zone = fixture.dns.find_records(RecordType::Cname, "search.acme.eu-west.prod.z.o.cloud");
        assert_eq!(zone[0].data, "vip.eu-west.o.cloud");
    }

    #[test]
    fn clusters_without_load_balancer_lose_their_records() {
        let fixture = Fixture::new(&[RoutingMethod::Exclusive], false);
        let deployment = fixture.deployment("us-east");
        fixture.prepare("us-east");
        let lb = LoadBalancer {
            cluster: ClusterId::default_id(),
            hostname: "lb-1".to_string(),
        };
        fixture.routing.configure(&deployment, &fixture.spec(), &[lb]).unwrap();
        fixture.dispatch();
        assert!(!fixture.dns.records().is_empty());

        fixture.routing.configure(&deployment, &fixture.spec(), &[]).unwrap();
        fixture.dispatch();
        assert!(fixture.dns.find_records(RecordType::Cname, "search.acme.us-east.prod.z.o.cloud").is_empty());
        assert!(fixture
            .store
            .read_generated_endpoints(&deployment.instance, &deployment.zone)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn remove_zone_endpoints_clears_records_and_generated_names() {
        let fixture = Fixture::new(&[RoutingMethod::Exclusive], true);
        let deployment = fixture.deployment("us-east");
        fixture.prepare("us-east");
        let lb = LoadBalancer {
            cluster: ClusterId::default_id(),
            hostname: "lb-1".to_string(),
        };
        fixture.routing.configure(&deployment, &fixture.spec(), &[lb]).unwrap();
        fixture.dispatch();
        assert_eq!(fixture.dns.records().len(), 7);

        let lock = fixture.store.lock_application(&fixture.id).unwrap();
        fixture
            .routing
            .remove_zone_endpoints(&deployment, &fixture.spec(), &lock)
            .unwrap();
        drop(lock);
        fixture.dispatch();
        assert!(fixture.dns.records().is_empty());
        assert!(fixture
            .store
            .read_generated_endpoints(&deployment.instance, &deployment.zone)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn missing_vip_is_reported() {
        let store = StateStore::open_in_memory().unwrap();
        let zones = [ZoneConfig {
            environment: Environment::Prod,
            region: "us-east".parse().unwrap(),
            routing_methods: vec![RoutingMethod::SharedLayer4],
            vip_hostname: None,
            cloud_account: None,
        }];
        let routing = RoutingController::new(
            store.clone(),
            EndpointComputer::new(ZoneRouting::new(zones), "o.cloud"),
            RotationAssigner::new(store.clone(), vec![]),
            Arc::new(QueuedNameServiceForwarder::new(store, 10)),
            false,
        );
        let deployment = DeploymentId::new(
            ApplicationId::from_parts("acme", "search").unwrap().default_instance(),
            ZoneId::prod("us-east").unwrap(),
        );
        let lb = LoadBalancer {
            cluster: ClusterId::default_id(),
            hostname: "lb".to_string(),
        };
        let err = routing
            .configure(&deployment, &DeploymentSpec::empty(), &[lb])
            .unwrap_err();
        assert!(matches!(err, RoutingError::MissingVipConfiguration(_)));
    }
}
