//! Endpoints and their DNS names.
//!
//! Names are built from the most specific part to the least specific, with
//! default clusters, instances and endpoint ids left out:
//!
//! | scope       | name                                                     |
//! |-------------|----------------------------------------------------------|
//! | zone        | `cluster.instance.app.tenant.region.env.z.suffix`        |
//! | region      | `cluster.instance.app.tenant.region.r.suffix`            |
//! | global      | `endpoint.instance.app.tenant.g.suffix`                  |
//! | application | `endpoint.app.tenant.a.suffix`                           |
//! | generated   | `cluster-part.application-part[.region].z\|r.suffix`     |

use std::collections::BTreeSet;
use std::fmt;

use orbit_core::{
    ApplicationId, AuthMethod, ClusterId, DeploymentId, EndpointId, InstanceId, InstanceName,
    RoutingMethod,
};
use orbit_state::GeneratedEndpoint;

/// Reach of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EndpointScope {
    /// One deployment.
    Zone,
    /// All production deployments of an instance in one region.
    Region,
    /// An instance across regions.
    Global,
    /// Deployments of several instances.
    Application,
}

impl EndpointScope {
    pub fn is_multi_deployment(self) -> bool {
        !matches!(self, EndpointScope::Zone)
    }
}

impl fmt::Display for EndpointScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EndpointScope::Zone => "zone",
            EndpointScope::Region => "region",
            EndpointScope::Global => "global",
            EndpointScope::Application => "application",
        })
    }
}

/// A deployment an endpoint routes to, with its share of traffic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeightedDeployment {
    pub deployment: DeploymentId,
    pub weight: u32,
}

impl WeightedDeployment {
    pub fn new(deployment: DeploymentId, weight: u32) -> Self {
        Self { deployment, weight }
    }
}

/// A DNS name routing to one or more deployments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    pub dns_name: String,
    pub scope: EndpointScope,
    pub cluster: ClusterId,
    /// Declared id, for global and application endpoints.
    pub id: Option<EndpointId>,
    pub routing_method: RoutingMethod,
    pub auth_method: AuthMethod,
    /// Sorted.
    pub targets: Vec<WeightedDeployment>,
    /// Whether the name is a randomized variant.
    pub generated: bool,
}

impl Endpoint {
    pub fn targets_deployment(&self, deployment: &DeploymentId) -> bool {
        self.targets.iter().any(|t| &t.deployment == deployment)
    }

    /// Endpoints that need a rotation to route: global endpoints through the
    /// legacy shared layer.
    pub fn requires_rotation(&self) -> bool {
        self.scope == EndpointScope::Global && self.routing_method == RoutingMethod::Shared
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} endpoint {} ({}, {})",
            self.scope, self.dns_name, self.routing_method, self.auth_method
        )
    }
}

/// A sorted, duplicate free set of endpoints with filters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointList(Vec<Endpoint>);

impl EndpointList {
    pub fn new(mut endpoints: Vec<Endpoint>) -> Self {
        endpoints.sort();
        endpoints.dedup();
        Self(endpoints)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Endpoint> {
        self.0.first()
    }

    pub fn dns_names(&self) -> BTreeSet<&str> {
        self.0.iter().map(|e| e.dns_name.as_str()).collect()
    }

    pub fn scope(&self, scope: EndpointScope) -> Self {
        self.filter(|e| e.scope == scope)
    }

    pub fn cluster(&self, cluster: &ClusterId) -> Self {
        self.filter(|e| &e.cluster == cluster)
    }

    pub fn named(&self, id: &EndpointId) -> Self {
        self.filter(|e| e.id.as_ref() == Some(id))
    }

    pub fn targets(&self, deployment: &DeploymentId) -> Self {
        self.filter(|e| e.targets_deployment(deployment))
    }

    pub fn generated(&self) -> Self {
        self.filter(|e| e.generated)
    }

    pub fn not_generated(&self) -> Self {
        self.filter(|e| !e.generated)
    }

    pub fn and(mut self, other: EndpointList) -> Self {
        self.0.extend(other.0);
        Self::new(self.0)
    }

    fn filter(&self, predicate: impl Fn(&Endpoint) -> bool) -> Self {
        Self(self.0.iter().filter(|e| predicate(e)).cloned().collect())
    }
}

impl<'a> IntoIterator for &'a EndpointList {
    type Item = &'a Endpoint;
    type IntoIter = std::slice::Iter<'a, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for EndpointList {
    type Item = Endpoint;
    type IntoIter = std::vec::IntoIter<Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ── Names ──────────────────────────────────────────────────────────

/// Join non-empty labels with dots. Underscores are not valid in hostnames
/// and become dashes.
fn dns_name<'a>(labels: impl IntoIterator<Item = Option<&'a str>>) -> String {
    labels
        .into_iter()
        .flatten()
        .filter(|label| !label.is_empty())
        .map(|label| label.replace('_', "-"))
        .collect::<Vec<_>>()
        .join(".")
}

fn non_default_cluster(cluster: &ClusterId) -> Option<&str> {
    (!cluster.is_default()).then(|| cluster.as_str())
}

fn non_default_instance(instance: &InstanceName) -> Option<&str> {
    (*instance != InstanceName::default_name()).then(|| instance.as_str())
}

fn non_default_endpoint(id: &EndpointId) -> Option<&str> {
    (!id.is_default()).then(|| id.as_str())
}

pub(crate) fn zone_name(deployment: &DeploymentId, cluster: &ClusterId, suffix: &str) -> String {
    let instance = &deployment.instance;
    dns_name([
        non_default_cluster(cluster),
        non_default_instance(&instance.instance),
        Some(instance.application.as_str()),
        Some(instance.tenant.as_str()),
        Some(deployment.zone.region.as_str()),
        Some(deployment.zone.environment.as_str()),
        Some("z"),
        Some(suffix),
    ])
}

pub(crate) fn region_name(deployment: &DeploymentId, cluster: &ClusterId, suffix: &str) -> String {
    let instance = &deployment.instance;
    dns_name([
        non_default_cluster(cluster),
        non_default_instance(&instance.instance),
        Some(instance.application.as_str()),
        Some(instance.tenant.as_str()),
        Some(deployment.zone.region.as_str()),
        Some("r"),
        Some(suffix),
    ])
}

pub(crate) fn global_name(instance: &InstanceId, endpoint: &EndpointId, suffix: &str) -> String {
    dns_name([
        non_default_endpoint(endpoint),
        non_default_instance(&instance.instance),
        Some(instance.application.as_str()),
        Some(instance.tenant.as_str()),
        Some("g"),
        Some(suffix),
    ])
}

pub(crate) fn application_name(
    application: &ApplicationId,
    endpoint: &EndpointId,
    suffix: &str,
) -> String {
    dns_name([
        Some(endpoint.as_str()),
        Some(application.application.as_str()),
        Some(application.tenant.as_str()),
        Some("a"),
        Some(suffix),
    ])
}

pub(crate) fn generated_zone_name(generated: &GeneratedEndpoint, suffix: &str) -> String {
    dns_name([
        Some(generated.cluster_part.as_str()),
        Some(generated.application_part.as_str()),
        Some("z"),
        Some(suffix),
    ])
}

pub(crate) fn generated_region_name(
    generated: &GeneratedEndpoint,
    deployment: &DeploymentId,
    suffix: &str,
) -> String {
    dns_name([
        Some(generated.cluster_part.as_str()),
        Some(generated.application_part.as_str()),
        Some(deployment.zone.region.as_str()),
        Some("r"),
        Some(suffix),
    ])
}
