//! Persisted application model: applications, their instances and the
//! deployments of each instance.
//!
//! Values are immutable from the outside. Instances are transformed with
//! consuming `with_*` methods; applications are only changed through
//! [`LockedApplication`](crate::LockedApplication), which requires the
//! application lock.

use std::collections::{BTreeMap, BTreeSet};

use orbit_core::{
    ApplicationId, CloudAccount, CoreError, CoreResult, DeploymentSpec, InstanceId, InstanceName,
    JobType, RevisionId, RotationId, Tags, ValidationOverrides, Version, ZoneId,
};
use orbit_core::{ClusterId, EndpointId, RegionName};
use serde::{Deserialize, Serialize};

use crate::serde_maps::pairs;

// ── Deployment ─────────────────────────────────────────────────────

/// Traffic and feed metrics last reported for a deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentMetrics {
    pub queries_per_second: f64,
    pub writes_per_second: f64,
    pub document_count: f64,
    pub query_latency_millis: f64,
    pub write_latency_millis: f64,
    pub at: Option<u64>,
}

/// When a deployment last served queries or took writes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentActivity {
    pub last_queried: Option<u64>,
    pub last_written: Option<u64>,
    pub last_queries_per_second: Option<f64>,
    pub last_writes_per_second: Option<f64>,
}

/// Share of the tenant quota used by a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub rate: f64,
}

/// What is running in one zone for one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub zone: ZoneId,
    #[serde(default)]
    pub cloud_account: CloudAccount,
    pub revision: RevisionId,
    pub version: Version,
    /// Epoch seconds of the deployment.
    pub at: u64,
    #[serde(default)]
    pub metrics: DeploymentMetrics,
    #[serde(default)]
    pub activity: DeploymentActivity,
    #[serde(default)]
    pub quota: QuotaUsage,
    #[serde(default)]
    pub cost: Option<f64>,
}

impl Deployment {
    pub fn new(
        zone: ZoneId,
        cloud_account: CloudAccount,
        revision: RevisionId,
        version: Version,
        at: u64,
    ) -> Self {
        Self {
            zone,
            cloud_account,
            revision,
            version,
            at,
            metrics: DeploymentMetrics::default(),
            activity: DeploymentActivity::default(),
            quota: QuotaUsage::default(),
            cost: None,
        }
    }

    pub fn with_quota(mut self, quota: QuotaUsage) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_metrics(mut self, metrics: DeploymentMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_activity(mut self, activity: DeploymentActivity) -> Self {
        self.activity = activity;
        self
    }
}

// ── Rotations ──────────────────────────────────────────────────────

/// A global rotation bound to one endpoint of one container cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedRotation {
    pub cluster: ClusterId,
    pub endpoint_id: EndpointId,
    pub rotation_id: RotationId,
    pub regions: BTreeSet<RegionName>,
}

impl AssignedRotation {
    pub fn new(
        cluster: ClusterId,
        endpoint_id: EndpointId,
        rotation_id: RotationId,
        regions: BTreeSet<RegionName>,
    ) -> Self {
        Self {
            cluster,
            endpoint_id,
            rotation_id,
            regions,
        }
    }
}

/// Whether a zone is in or out of a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationState {
    In,
    Out,
    #[default]
    Unknown,
}

/// Per-zone states of one rotation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RotationTargets {
    pub last_updated: u64,
    #[serde(with = "pairs")]
    pub targets: BTreeMap<ZoneId, RotationState>,
}

/// Last known rotation states of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RotationStatus(BTreeMap<RotationId, RotationTargets>);

impl RotationStatus {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_targets(targets: BTreeMap<RotationId, RotationTargets>) -> Self {
        Self(targets)
    }

    pub fn of(&self, rotation: &RotationId) -> Option<&RotationTargets> {
        self.0.get(rotation)
    }

    pub fn state(&self, rotation: &RotationId, zone: &ZoneId) -> RotationState {
        self.0
            .get(rotation)
            .and_then(|targets| targets.targets.get(zone).copied())
            .unwrap_or_default()
    }
}

// ── Instance ───────────────────────────────────────────────────────

/// The change an instance is currently rolling out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Change {
    pub platform: Option<Version>,
    pub revision: Option<RevisionId>,
    #[serde(default)]
    pub pinned: bool,
}

impl Change {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of_platform(version: Version) -> Self {
        Self {
            platform: Some(version),
            ..Self::default()
        }
    }

    pub fn of_revision(revision: RevisionId) -> Self {
        Self {
            revision: Some(revision),
            ..Self::default()
        }
    }

    pub fn has_targets(&self) -> bool {
        self.platform.is_some() || self.revision.is_some()
    }
}

/// One named instance of an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    id: InstanceId,
    #[serde(default)]
    tags: Tags,
    #[serde(default, with = "deployment_list")]
    deployments: BTreeMap<ZoneId, Deployment>,
    #[serde(default)]
    rotations: Vec<AssignedRotation>,
    #[serde(default)]
    rotation_status: RotationStatus,
    #[serde(default, with = "pairs")]
    job_pauses: BTreeMap<JobType, u64>,
    #[serde(default)]
    change: Change,
}

impl Instance {
    pub fn new(id: InstanceId) -> Self {
        Self {
            id,
            tags: Tags::empty(),
            deployments: BTreeMap::new(),
            rotations: Vec::new(),
            rotation_status: RotationStatus::empty(),
            job_pauses: BTreeMap::new(),
            change: Change::empty(),
        }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn name(&self) -> &InstanceName {
        &self.id.instance
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn deployments(&self) -> &BTreeMap<ZoneId, Deployment> {
        &self.deployments
    }

    pub fn deployment(&self, zone: &ZoneId) -> Option<&Deployment> {
        self.deployments.get(zone)
    }

    pub fn production_deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments
            .values()
            .filter(|d| d.zone.environment.is_production())
    }

    pub fn rotations(&self) -> &[AssignedRotation] {
        &self.rotations
    }

    pub fn rotation_status(&self) -> &RotationStatus {
        &self.rotation_status
    }

    pub fn job_pause(&self, job: &JobType) -> Option<u64> {
        self.job_pauses.get(job).copied()
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Record a new deployment, keeping the metrics and activity of any
    /// earlier deployment to the same zone.
    pub fn with_new_deployment(
        mut self,
        zone: ZoneId,
        cloud_account: CloudAccount,
        revision: RevisionId,
        version: Version,
        at: u64,
        quota: QuotaUsage,
    ) -> Self {
        let previous = self.deployments.remove(&zone);
        let mut deployment =
            Deployment::new(zone.clone(), cloud_account, revision, version, at).with_quota(quota);
        if let Some(previous) = previous {
            deployment.metrics = previous.metrics;
            deployment.activity = previous.activity;
            deployment.cost = previous.cost;
        }
        self.deployments.insert(zone, deployment);
        self
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployments.insert(deployment.zone.clone(), deployment);
        self
    }

    pub fn without_deployment_in(mut self, zone: &ZoneId) -> Self {
        self.deployments.remove(zone);
        self
    }

    pub fn with_rotations(mut self, rotations: Vec<AssignedRotation>) -> Self {
        self.rotations = rotations;
        self
    }

    pub fn with_rotation_status(mut self, status: RotationStatus) -> Self {
        self.rotation_status = status;
        self
    }

    /// Pause a job until the given time, or lift the pause with `None`.
    pub fn with_job_pause(mut self, job: JobType, until: Option<u64>) -> Self {
        match until {
            Some(until) => self.job_pauses.insert(job, until),
            None => self.job_pauses.remove(&job),
        };
        self
    }

    pub fn with_change(mut self, change: Change) -> Self {
        self.change = change;
        self
    }
}

// ── Application ────────────────────────────────────────────────────

/// A submitted application revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationVersion {
    pub id: RevisionId,
    pub compile_version: Option<Version>,
    pub source_commit: Option<String>,
    pub submitted_at: Option<u64>,
    /// Deployed directly to a manual zone, outside the submission pipeline.
    #[serde(default)]
    pub deployed_directly: bool,
}

impl ApplicationVersion {
    pub fn submitted(
        id: RevisionId,
        compile_version: Option<Version>,
        source_commit: Option<String>,
        at: u64,
    ) -> Self {
        Self {
            id,
            compile_version,
            source_commit,
            submitted_at: Some(at),
            deployed_directly: false,
        }
    }

    pub fn deployed_directly(id: RevisionId, compile_version: Option<Version>) -> Self {
        Self {
            id,
            compile_version,
            source_commit: None,
            submitted_at: None,
            deployed_directly: true,
        }
    }
}

/// Issue tracker references for an application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IssueIds {
    pub deployment: Option<String>,
    pub ownership: Option<String>,
}

/// Service quality aggregated over all deployments.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplicationMetrics {
    pub query_service_quality: f64,
    pub write_service_quality: f64,
}

/// An application with its instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub(crate) id: ApplicationId,
    pub(crate) created_at: u64,
    #[serde(default)]
    pub(crate) deployment_spec: DeploymentSpec,
    #[serde(default)]
    pub(crate) validation_overrides: ValidationOverrides,
    #[serde(default)]
    pub(crate) revisions: Vec<ApplicationVersion>,
    #[serde(default)]
    pub(crate) project_id: Option<u64>,
    #[serde(default)]
    pub(crate) issue_ids: IssueIds,
    #[serde(default)]
    pub(crate) owner: Option<String>,
    #[serde(default)]
    pub(crate) major_version: Option<u64>,
    #[serde(default)]
    pub(crate) metrics: ApplicationMetrics,
    #[serde(default)]
    pub(crate) deploy_keys: BTreeSet<String>,
    #[serde(default, with = "instance_list")]
    pub(crate) instances: BTreeMap<InstanceName, Instance>,
}

impl Application {
    pub fn new(id: ApplicationId, created_at: u64) -> Self {
        Self {
            id,
            created_at,
            deployment_spec: DeploymentSpec::empty(),
            validation_overrides: ValidationOverrides::empty(),
            revisions: Vec::new(),
            project_id: None,
            issue_ids: IssueIds::default(),
            owner: None,
            major_version: None,
            metrics: ApplicationMetrics::default(),
            deploy_keys: BTreeSet::new(),
            instances: BTreeMap::new(),
        }
    }

    /// Build an application from a list of instances. Fails on duplicate names.
    pub fn with_instances(
        id: ApplicationId,
        created_at: u64,
        instances: Vec<Instance>,
    ) -> CoreResult<Self> {
        let mut application = Self::new(id, created_at);
        application.instances = index_instances(instances)?;
        Ok(application)
    }

    pub fn id(&self) -> &ApplicationId {
        &self.id
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn deployment_spec(&self) -> &DeploymentSpec {
        &self.deployment_spec
    }

    pub fn validation_overrides(&self) -> &ValidationOverrides {
        &self.validation_overrides
    }

    pub fn revisions(&self) -> &[ApplicationVersion] {
        &self.revisions
    }

    pub fn revision(&self, id: RevisionId) -> Option<&ApplicationVersion> {
        self.revisions.iter().find(|r| r.id == id)
    }

    /// The newest revision that went through submission.
    pub fn latest_submitted(&self) -> Option<&ApplicationVersion> {
        self.revisions
            .iter()
            .filter(|r| !r.deployed_directly)
            .max_by_key(|r| r.id)
    }

    pub fn project_id(&self) -> Option<u64> {
        self.project_id
    }

    pub fn issue_ids(&self) -> &IssueIds {
        &self.issue_ids
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn major_version(&self) -> Option<u64> {
        self.major_version
    }

    pub fn metrics(&self) -> &ApplicationMetrics {
        &self.metrics
    }

    pub fn deploy_keys(&self) -> &BTreeSet<String> {
        &self.deploy_keys
    }

    pub fn instances(&self) -> &BTreeMap<InstanceName, Instance> {
        &self.instances
    }

    pub fn instance(&self, name: &InstanceName) -> Option<&Instance> {
        self.instances.get(name)
    }

    /// All production deployments across instances.
    pub fn production_deployments(&self) -> impl Iterator<Item = (&Instance, &Deployment)> {
        self.instances
            .values()
            .flat_map(|i| i.production_deployments().map(move |d| (i, d)))
    }
}

fn index_instances(instances: Vec<Instance>) -> CoreResult<BTreeMap<InstanceName, Instance>> {
    let mut indexed = BTreeMap::new();
    for instance in instances {
        let name = instance.name().clone();
        if indexed.insert(name.clone(), instance).is_some() {
            return Err(CoreError::DuplicateInstance(name.to_string()));
        }
    }
    Ok(indexed)
}

/// Instances are written as a list and re-keyed by name on read.
mod instance_list {
    use super::*;
    use serde::{Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<InstanceName, Instance>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<InstanceName, Instance>, D::Error> {
        let list = Vec::<Instance>::deserialize(deserializer)?;
        index_instances(list).map_err(D::Error::custom)
    }
}

/// Deployments are written as a list and re-keyed by zone on read.
mod deployment_list {
    use super::*;
    use serde::{Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<ZoneId, Deployment>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ZoneId, Deployment>, D::Error> {
        let list = Vec::<Deployment>::deserialize(deserializer)?;
        let mut indexed = BTreeMap::new();
        for deployment in list {
            let zone = deployment.zone.clone();
            if indexed.insert(zone.clone(), deployment).is_some() {
                return Err(D::Error::custom(format!("duplicate deployment in {zone}")));
            }
        }
        Ok(indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str) -> Instance {
        Instance::new(InstanceId::from_parts("acme", "search", name).unwrap())
    }

    fn app_id() -> ApplicationId {
        ApplicationId::from_parts("acme", "search").unwrap()
    }

    #[test]
    fn duplicate_instances_are_rejected() {
        let err = Application::with_instances(app_id(), 0, vec![instance("a"), instance("a")])
            .unwrap_err();
        assert_eq!(err, CoreError::DuplicateInstance("a".into()));
    }

    #[test]
    fn json_round_trip_keeps_instances_and_deployments() {
        let zone = ZoneId::prod("us-east").unwrap();
        let i = instance("default").with_new_deployment(
            zone.clone(),
            CloudAccount::empty(),
            RevisionId(3),
            Version::new(8, 1, 0),
            100,
            QuotaUsage { rate: 0.5 },
        );
        let app = Application::with_instances(app_id(), 10, vec![i]).unwrap();
        let json = serde_json::to_string(&app).unwrap();
        let back: Application = serde_json::from_str(&json).unwrap();
        assert_eq!(back, app);
        let deployment = back.instance(&InstanceName::default_name()).unwrap().deployment(&zone);
        assert_eq!(deployment.unwrap().revision, RevisionId(3));
    }

    #[test]
    fn duplicate_instances_in_json_fail_to_load() {
        let app = Application::with_instances(app_id(), 0, vec![instance("a")]).unwrap();
        let mut value = serde_json::to_value(&app).unwrap();
        let list = value["instances"].as_array().unwrap().clone();
        value["instances"] = serde_json::Value::Array([list.clone(), list].concat());
        assert!(serde_json::from_value::<Application>(value).is_err());
    }

    #[test]
    fn redeploy_keeps_metrics() {
        let zone = ZoneId::prod("us-east").unwrap();
        let metrics = DeploymentMetrics {
            queries_per_second: 12.0,
            ..DeploymentMetrics::default()
        };
        let first = Deployment::new(
            zone.clone(),
            CloudAccount::empty(),
            RevisionId(1),
            Version::new(8, 0, 0),
            1,
        )
        .with_metrics(metrics.clone());
        let i = instance("a").with_deployment(first).with_new_deployment(
            zone.clone(),
            CloudAccount::empty(),
            RevisionId(2),
            Version::new(8, 1, 0),
            2,
            QuotaUsage::default(),
        );
        let d = i.deployment(&zone).unwrap();
        assert_eq!(d.revision, RevisionId(2));
        assert_eq!(d.metrics, metrics);
    }

    #[test]
    fn job_pause_is_set_and_lifted() {
        let job = JobType::of(ZoneId::prod("us-east").unwrap());
        let i = instance("a").with_job_pause(job.clone(), Some(50));
        assert_eq!(i.job_pause(&job), Some(50));
        assert_eq!(i.with_job_pause(job.clone(), None).job_pause(&job), None);
    }
}
