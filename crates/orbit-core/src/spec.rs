//! The declarative deployment spec and its companions.
//!
//! A `DeploymentSpec` says which instances exist, which zones each instance
//! deploys to and which global or application endpoints are wanted. The
//! `ServicesSpec` lists the container clusters of the package, and
//! `ValidationOverrides` carries time-limited permissions for otherwise
//! rejected changes.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::{ClusterId, EndpointId, InstanceName};
use crate::routing::AuthMethod;
use crate::zone::{CloudAccount, Environment, RegionName};

/// How eagerly an application follows new platform versions, most eager first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradePolicy {
    Canary,
    #[default]
    Default,
    Conservative,
}

/// Free-form labels attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a whitespace separated tag list.
    pub fn parse(value: &str) -> Self {
        Self(value.split_whitespace().map(str::to_string).collect())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.0.iter().map(String::as_str).collect();
        f.write_str(&tags.join(" "))
    }
}

/// A zone an instance deploys to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredZone {
    pub environment: Environment,
    /// Absent for the test environments, which are region-agnostic.
    #[serde(default)]
    pub region: Option<RegionName>,
    /// Whether the zone receives traffic through global endpoints.
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub cloud_account: Option<CloudAccount>,
}

fn default_true() -> bool {
    true
}

impl DeclaredZone {
    pub fn prod(region: RegionName) -> Self {
        Self {
            environment: Environment::Prod,
            region: Some(region),
            active: true,
            cloud_account: None,
        }
    }

    pub fn matches(&self, environment: Environment, region: Option<&RegionName>) -> bool {
        self.environment == environment
            && match (region, &self.region) {
                (Some(wanted), Some(declared)) => wanted == declared,
                (None, _) => true,
                (Some(_), None) => false,
            }
    }
}

/// Scope of a declared endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointLevel {
    /// A global endpoint of one instance, across its regions.
    Instance,
    /// An endpoint spanning instances of the application.
    Application,
}

/// One weighted target of a declared endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTarget {
    pub region: RegionName,
    pub instance: InstanceName,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// A declared global or application endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub endpoint_id: EndpointId,
    pub container_id: ClusterId,
    pub level: EndpointLevel,
    pub targets: Vec<EndpointTarget>,
}

impl EndpointSpec {
    /// An instance-level endpoint of `instance` targeting `regions`.
    pub fn instance_level(
        endpoint_id: EndpointId,
        container_id: ClusterId,
        instance: &InstanceName,
        regions: &[RegionName],
    ) -> Self {
        Self {
            endpoint_id,
            container_id,
            level: EndpointLevel::Instance,
            targets: regions
                .iter()
                .map(|region| EndpointTarget {
                    region: region.clone(),
                    instance: instance.clone(),
                    weight: 1,
                })
                .collect(),
        }
    }

    pub fn application_level(
        endpoint_id: EndpointId,
        container_id: ClusterId,
        targets: Vec<EndpointTarget>,
    ) -> Self {
        Self {
            endpoint_id,
            container_id,
            level: EndpointLevel::Application,
            targets,
        }
    }

    /// Distinct target regions, in declaration order.
    pub fn regions(&self) -> Vec<RegionName> {
        let mut seen = HashSet::new();
        self.targets
            .iter()
            .filter(|t| seen.insert(t.region.clone()))
            .map(|t| t.region.clone())
            .collect()
    }
}

/// Deployment declarations for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: InstanceName,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub upgrade_policy: UpgradePolicy,
    #[serde(default)]
    pub zones: Vec<DeclaredZone>,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

impl InstanceSpec {
    pub fn new(name: InstanceName) -> Self {
        Self {
            name,
            tags: Tags::empty(),
            upgrade_policy: UpgradePolicy::Default,
            zones: Vec::new(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_upgrade_policy(mut self, policy: UpgradePolicy) -> Self {
        self.upgrade_policy = policy;
        self
    }

    pub fn with_zone(mut self, zone: DeclaredZone) -> Self {
        self.zones.push(zone);
        self
    }

    pub fn with_prod_regions(mut self, regions: &[RegionName]) -> Self {
        self.zones
            .extend(regions.iter().cloned().map(DeclaredZone::prod));
        self
    }

    /// Add a global endpoint over `regions`, or over every production region
    /// when `regions` is empty.
    pub fn with_endpoint(mut self, id: EndpointId, container: ClusterId, regions: &[RegionName]) -> Self {
        let regions = if regions.is_empty() {
            self.prod_regions()
        } else {
            regions.to_vec()
        };
        let endpoint = EndpointSpec::instance_level(id, container, &self.name, &regions);
        self.endpoints.push(endpoint);
        self
    }

    /// Whether this instance has any zone in `environment`.
    pub fn concerns(&self, environment: Environment) -> bool {
        self.zones.iter().any(|z| z.environment == environment)
    }

    /// Whether this instance deploys to the given zone. Test environments are
    /// implied by any production zone.
    pub fn deploys_to(&self, environment: Environment, region: Option<&RegionName>) -> bool {
        if environment.is_test() && self.concerns(Environment::Prod) {
            return true;
        }
        self.zones.iter().any(|z| z.matches(environment, region))
    }

    pub fn prod_regions(&self) -> Vec<RegionName> {
        self.zones
            .iter()
            .filter(|z| z.environment.is_production())
            .filter_map(|z| z.region.clone())
            .collect()
    }

    pub fn cloud_account(&self, environment: Environment, region: &RegionName) -> Option<CloudAccount> {
        self.zones
            .iter()
            .find(|z| z.matches(environment, Some(region)))
            .and_then(|z| z.cloud_account.clone())
    }
}

#[derive(Deserialize)]
struct RawDeploymentSpec {
    #[serde(default)]
    instances: Vec<InstanceSpec>,
    #[serde(default)]
    endpoints: Vec<EndpointSpec>,
    #[serde(default)]
    major_version: Option<u64>,
}

impl TryFrom<RawDeploymentSpec> for DeploymentSpec {
    type Error = CoreError;

    fn try_from(raw: RawDeploymentSpec) -> CoreResult<Self> {
        DeploymentSpec::new(raw.instances, raw.endpoints, raw.major_version)
    }
}

/// Which instances deploy where, and what endpoints they expose.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawDeploymentSpec")]
pub struct DeploymentSpec {
    instances: Vec<InstanceSpec>,
    /// Application-level endpoints.
    endpoints: Vec<EndpointSpec>,
    major_version: Option<u64>,
}

impl DeploymentSpec {
    pub fn new(
        instances: Vec<InstanceSpec>,
        endpoints: Vec<EndpointSpec>,
        major_version: Option<u64>,
    ) -> CoreResult<Self> {
        let mut names = HashSet::new();
        for instance in &instances {
            if !names.insert(instance.name.clone()) {
                return Err(CoreError::DuplicateInstance(instance.name.to_string()));
            }
        }
        Ok(Self {
            instances,
            endpoints,
            major_version,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.endpoints.is_empty()
    }

    pub fn instances(&self) -> &[InstanceSpec] {
        &self.instances
    }

    pub fn instance(&self, name: &InstanceName) -> Option<&InstanceSpec> {
        self.instances.iter().find(|i| &i.name == name)
    }

    pub fn instance_names(&self) -> Vec<InstanceName> {
        self.instances.iter().map(|i| i.name.clone()).collect()
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    pub fn major_version(&self) -> Option<u64> {
        self.major_version
    }

    /// The most conservative upgrade policy of any instance, or the default.
    pub fn effective_upgrade_policy(&self) -> UpgradePolicy {
        self.instances
            .iter()
            .map(|i| i.upgrade_policy)
            .max()
            .unwrap_or_default()
    }
}

/// A container cluster declared by the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub id: ClusterId,
    #[serde(default = "default_auth_methods")]
    pub auth_methods: BTreeSet<AuthMethod>,
}

fn default_auth_methods() -> BTreeSet<AuthMethod> {
    BTreeSet::from([AuthMethod::Mtls])
}

impl ContainerSpec {
    pub fn new(id: ClusterId) -> Self {
        Self {
            id,
            auth_methods: default_auth_methods(),
        }
    }

    pub fn with_token(mut self) -> Self {
        self.auth_methods.insert(AuthMethod::Token);
        self
    }

    pub fn supports(&self, method: AuthMethod) -> bool {
        self.auth_methods.contains(&method)
    }
}

/// The container clusters of an application package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServicesSpec {
    pub containers: Vec<ContainerSpec>,
}

impl ServicesSpec {
    pub fn with_containers(containers: Vec<ContainerSpec>) -> Self {
        Self { containers }
    }
}

/// Changes that are rejected unless explicitly allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationId {
    DeploymentRemoval,
    GlobalEndpointChange,
    CertificateRemoval,
}

impl ValidationId {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationId::DeploymentRemoval => "deployment-removal",
            ValidationId::GlobalEndpointChange => "global-endpoint-change",
            ValidationId::CertificateRemoval => "certificate-removal",
        }
    }
}

impl fmt::Display for ValidationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A permission for `id` that expires at `until` (epoch seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOverride {
    pub id: ValidationId,
    pub until: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationOverrides {
    pub overrides: Vec<ValidationOverride>,
}

impl ValidationOverrides {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn allowing(id: ValidationId, until: u64) -> Self {
        Self {
            overrides: vec![ValidationOverride { id, until }],
        }
    }

    pub fn allows(&self, id: ValidationId, now: u64) -> bool {
        self.overrides.iter().any(|o| o.id == id && now < o.until)
    }

    /// The hint appended to rejections so operators can self-correct.
    pub fn allow_message(id: ValidationId) -> String {
        format!(
            "To allow this add an `allow` override for '{id}' to the validation overrides of the package"
        )
    }
}
