//! Computes endpoints from deployments, declared endpoint specs and zone
//! routing configuration.

use std::collections::BTreeSet;

use orbit_core::{
    ApplicationId, AuthMethod, ClusterId, DeploymentId, DeploymentSpec, EndpointSpec, Environment,
    InstanceId, OrbitConfig, RoutingMethod, ZoneId,
};
use orbit_state::{AssignedRotation, GeneratedEndpoint};

use crate::endpoint::{self, Endpoint, EndpointList, EndpointScope, WeightedDeployment};
use crate::error::{RoutingError, RoutingResult};
use crate::zone::ZoneRouting;

#[derive(Debug, Clone)]
pub struct EndpointComputer {
    zones: ZoneRouting,
    dns_suffix: String,
}

impl EndpointComputer {
    pub fn new(zones: ZoneRouting, dns_suffix: impl Into<String>) -> Self {
        Self {
            zones,
            dns_suffix: dns_suffix.into(),
        }
    }

    pub fn from_config(config: &OrbitConfig) -> Self {
        Self::new(ZoneRouting::from_config(config), config.system.dns_suffix.clone())
    }

    pub fn zones(&self) -> &ZoneRouting {
        &self.zones
    }

    pub fn dns_suffix(&self) -> &str {
        &self.dns_suffix
    }

    /// Zone endpoints of one cluster of a deployment, plus region endpoints
    /// in production, each with a generated variant per generated endpoint.
    pub fn compute_endpoints(
        &self,
        deployment: &DeploymentId,
        cluster: &ClusterId,
        generated: &[GeneratedEndpoint],
    ) -> EndpointList {
        let routing_method = self.zones.primary_method(&deployment.zone);
        let single = |dns_name: String, scope, auth_method, generated| Endpoint {
            dns_name,
            scope,
            cluster: cluster.clone(),
            id: None,
            routing_method,
            auth_method,
            targets: vec![WeightedDeployment::new(deployment.clone(), 1)],
            generated,
        };

        let suffix = self.dns_suffix.as_str();
        let mut endpoints = vec![single(
            endpoint::zone_name(deployment, cluster, suffix),
            EndpointScope::Zone,
            AuthMethod::Mtls,
            false,
        )];
        for g in generated {
            endpoints.push(single(
                endpoint::generated_zone_name(g, suffix),
                EndpointScope::Zone,
                g.auth_method,
                true,
            ));
        }
        if deployment.zone.environment.is_production() {
            endpoints.push(single(
                endpoint::region_name(deployment, cluster, suffix),
                EndpointScope::Region,
                AuthMethod::Mtls,
                false,
            ));
            for g in generated {
                endpoints.push(single(
                    endpoint::generated_region_name(g, deployment, suffix),
                    EndpointScope::Region,
                    g.auth_method,
                    true,
                ));
            }
        }
        EndpointList::new(endpoints)
    }

    /// Global endpoints of every instance and the application endpoints of
    /// `spec`. Endpoints without targets are left out.
    pub fn declared_endpoints_of(
        &self,
        application: &ApplicationId,
        spec: &DeploymentSpec,
    ) -> RoutingResult<EndpointList> {
        let mut endpoints = Vec::new();
        for instance in spec.instances() {
            let instance_id = application.instance(instance.name.clone());
            for declared in &instance.endpoints {
                let targets = self.targets_of(application, declared);
                let Some(routing_method) = self.global_routing_method(declared, &targets)? else {
                    continue;
                };
                endpoints.push(Endpoint {
                    dns_name: endpoint::global_name(
                        &instance_id,
                        &declared.endpoint_id,
                        &self.dns_suffix,
                    ),
                    scope: EndpointScope::Global,
                    cluster: declared.container_id.clone(),
                    id: Some(declared.endpoint_id.clone()),
                    routing_method,
                    auth_method: AuthMethod::Mtls,
                    targets,
                    generated: false,
                });
            }
        }
        for declared in spec.endpoints() {
            let targets = self.targets_of(application, declared);
            let Some(routing_method) = self.application_routing_method(declared, &targets)? else {
                continue;
            };
            endpoints.push(Endpoint {
                dns_name: endpoint::application_name(
                    application,
                    &declared.endpoint_id,
                    &self.dns_suffix,
                ),
                scope: EndpointScope::Application,
                cluster: declared.container_id.clone(),
                id: Some(declared.endpoint_id.clone()),
                routing_method,
                auth_method: AuthMethod::Mtls,
                targets,
                generated: false,
            });
        }
        Ok(EndpointList::new(endpoints))
    }

    /// The global endpoint a rotation was assigned to, rebuilt from the
    /// persisted assignment alone.
    pub fn rotation_endpoint(&self, instance: &InstanceId, rotation: &AssignedRotation) -> Endpoint {
        let targets = rotation
            .regions
            .iter()
            .map(|region| {
                let zone = ZoneId::new(Environment::Prod, region.clone());
                WeightedDeployment::new(DeploymentId::new(instance.clone(), zone), 1)
            })
            .collect();
        Endpoint {
            dns_name: endpoint::global_name(instance, &rotation.endpoint_id, &self.dns_suffix),
            scope: EndpointScope::Global,
            cluster: rotation.cluster.clone(),
            id: Some(rotation.endpoint_id.clone()),
            routing_method: RoutingMethod::Shared,
            auth_method: AuthMethod::Mtls,
            targets,
            generated: false,
        }
    }

    /// Zone endpoint name of a deployment's cluster, without generated variants.
    pub fn zone_name(&self, deployment: &DeploymentId, cluster: &ClusterId) -> String {
        endpoint::zone_name(deployment, cluster, &self.dns_suffix)
    }

    pub fn region_name(&self, deployment: &DeploymentId, cluster: &ClusterId) -> String {
        endpoint::region_name(deployment, cluster, &self.dns_suffix)
    }

    fn targets_of(&self, application: &ApplicationId, declared: &EndpointSpec) -> Vec<WeightedDeployment> {
        let mut targets: Vec<WeightedDeployment> = declared
            .targets
            .iter()
            .map(|target| {
                let instance = application.instance(target.instance.clone());
                let zone = ZoneId::new(Environment::Prod, target.region.clone());
                WeightedDeployment::new(DeploymentId::new(instance, zone), target.weight)
            })
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// The single direct method any target zone offers, or the shared layer
    /// when none offers one.
    fn global_routing_method(
        &self,
        declared: &EndpointSpec,
        targets: &[WeightedDeployment],
    ) -> RoutingResult<Option<RoutingMethod>> {
        let available: BTreeSet<RoutingMethod> = targets
            .iter()
            .flat_map(|t| self.zones.routing_methods(&t.deployment.zone))
            .collect();
        let direct: Vec<RoutingMethod> = available.iter().copied().filter(|m| m.is_direct()).collect();
        match direct.as_slice() {
            [] => Ok(available
                .contains(&RoutingMethod::Shared)
                .then_some(RoutingMethod::Shared)),
            [method] => Ok(Some(*method)),
            many => Err(RoutingError::AmbiguousRoutingMethod(format!(
                "targets of global endpoint '{}' offer direct routing through {many:?}; \
                 at most one direct method is allowed per endpoint",
                declared.endpoint_id
            ))),
        }
    }

    /// Application endpoints span instances and need every target zone to
    /// route the same way.
    fn application_routing_method(
        &self,
        declared: &EndpointSpec,
        targets: &[WeightedDeployment],
    ) -> RoutingResult<Option<RoutingMethod>> {
        let methods: BTreeSet<RoutingMethod> = targets
            .iter()
            .map(|t| self.zones.primary_method(&t.deployment.zone))
            .collect();
        let mut methods = methods.into_iter();
        match (methods.next(), methods.next()) {
            (None, _) => Ok(None),
            (Some(method), None) => Ok(Some(method)),
            (Some(first), Some(second)) => Err(RoutingError::AmbiguousRoutingMethod(format!(
                "targets of application endpoint '{}' route through both {first} and {second}",
                declared.endpoint_id
            ))),
        }
    }
}
