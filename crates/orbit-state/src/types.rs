//! Persisted records other than applications and tenants.

use std::collections::{BTreeMap, VecDeque};

use orbit_core::{
    ApplicationId, ApplicationName, AuthMethod, ClusterId, InstanceId, InstanceName,
    JobId, JobType, RevisionId, TenantName, Version, ZoneId,
};
use serde::{Deserialize, Serialize};

// ── Runs ───────────────────────────────────────────────────────────

/// Identifies one run of a deployment job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub job: JobId,
    pub number: u64,
}

impl RunId {
    pub fn new(job: JobId, number: u64) -> Self {
        Self { job, number }
    }

    /// Zero-padded so keys of one job sort by run number.
    pub fn table_key(&self) -> String {
        format!("{}/{:010}", self.job.table_key(), self.number)
    }
}

/// Outcome of a run, `Running` until it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    DeploymentFailed,
    InstallationFailed,
    TestFailure,
    Error,
    Aborted,
}

/// Source and target of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunVersions {
    pub target_platform: Version,
    pub target_revision: RevisionId,
    pub source_platform: Option<Version>,
    pub source_revision: Option<RevisionId>,
}

impl RunVersions {
    pub fn new(target_platform: Version, target_revision: RevisionId) -> Self {
        Self {
            target_platform,
            target_revision,
            source_platform: None,
            source_revision: None,
        }
    }

    pub fn with_source(mut self, platform: Version, revision: RevisionId) -> Self {
        self.source_platform = Some(platform);
        self.source_revision = Some(revision);
        self
    }
}

/// One run of a deployment job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub versions: RunVersions,
    pub status: RunStatus,
    pub start: u64,
    pub end: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
}

impl Run {
    pub fn started(id: RunId, versions: RunVersions, start: u64) -> Self {
        Self {
            id,
            versions,
            status: RunStatus::Running,
            start,
            end: None,
            dry_run: false,
        }
    }

    pub fn finished(mut self, status: RunStatus, end: u64) -> Self {
        self.status = status;
        self.end = Some(end);
        self
    }

    pub fn has_ended(&self) -> bool {
        self.end.is_some()
    }

    pub fn has_succeeded(&self) -> bool {
        self.has_ended() && self.status == RunStatus::Success
    }
}

// ── Version status ─────────────────────────────────────────────────

/// How trustworthy a platform version has proven itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Broken,
    Low,
    Normal,
    High,
}

impl Confidence {
    pub fn equal_or_higher_than(self, other: Confidence) -> bool {
        self >= other
    }
}

/// A platform version known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVersion {
    pub version: Version,
    pub confidence: Confidence,
    #[serde(default)]
    pub committed_at: u64,
    #[serde(default)]
    pub is_system_version: bool,
    #[serde(default)]
    pub is_released: bool,
}

impl PlatformVersion {
    pub fn new(version: Version, confidence: Confidence) -> Self {
        Self {
            version,
            confidence,
            committed_at: 0,
            is_system_version: false,
            is_released: true,
        }
    }

    pub fn as_system_version(mut self) -> Self {
        self.is_system_version = true;
        self
    }
}

/// Platform versions currently deployable, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionStatus {
    versions: Vec<PlatformVersion>,
}

impl VersionStatus {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(mut versions: Vec<PlatformVersion>) -> Self {
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        versions.dedup_by(|a, b| a.version == b.version);
        Self { versions }
    }

    pub fn versions(&self) -> &[PlatformVersion] {
        &self.versions
    }

    pub fn version(&self, version: &Version) -> Option<&PlatformVersion> {
        self.versions.iter().find(|v| &v.version == version)
    }

    pub fn system_version(&self) -> Option<&PlatformVersion> {
        self.versions.iter().find(|v| v.is_system_version)
    }

    pub fn without(mut self, version: &Version) -> Self {
        self.versions.retain(|v| &v.version != version);
        self
    }
}

/// An OS version certified to run a platform version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifiedOsVersion {
    pub os_version: Version,
    pub platform_version: Version,
}

// ── Generated endpoints ────────────────────────────────────────────

/// A random endpoint name issued for one cluster of one deployment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneratedEndpoint {
    /// Random label identifying the cluster part of the name.
    pub cluster_part: String,
    /// Random label identifying the application, stable across clusters.
    pub application_part: String,
    pub auth_method: AuthMethod,
}

/// Generated endpoints of one deployment, per cluster.
pub type GeneratedEndpoints = BTreeMap<ClusterId, Vec<GeneratedEndpoint>>;

// ── Notifications ──────────────────────────────────────────────────

/// What a notification is about. Each populated field narrows the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSource {
    pub tenant: TenantName,
    #[serde(default)]
    pub application: Option<ApplicationName>,
    #[serde(default)]
    pub instance: Option<InstanceName>,
    #[serde(default)]
    pub zone: Option<ZoneId>,
    #[serde(default)]
    pub cluster: Option<ClusterId>,
    #[serde(default)]
    pub job: Option<JobType>,
}

impl NotificationSource {
    pub fn from_tenant(tenant: TenantName) -> Self {
        Self {
            tenant,
            application: None,
            instance: None,
            zone: None,
            cluster: None,
            job: None,
        }
    }

    pub fn from_application(id: &ApplicationId) -> Self {
        Self {
            application: Some(id.application.clone()),
            ..Self::from_tenant(id.tenant.clone())
        }
    }

    pub fn from_instance(id: &InstanceId) -> Self {
        Self {
            application: Some(id.application.clone()),
            instance: Some(id.instance.clone()),
            ..Self::from_tenant(id.tenant.clone())
        }
    }

    pub fn from_deployment(id: &InstanceId, zone: ZoneId) -> Self {
        Self {
            zone: Some(zone),
            ..Self::from_instance(id)
        }
    }

    /// Whether `other` is this source or one of its sub-sources.
    pub fn contains(&self, other: &NotificationSource) -> bool {
        fn covers<T: PartialEq>(mine: &Option<T>, theirs: &Option<T>) -> bool {
            mine.is_none() || mine == theirs
        }
        self.tenant == other.tenant
            && covers(&self.application, &other.application)
            && covers(&self.instance, &other.instance)
            && covers(&self.zone, &other.zone)
            && covers(&self.cluster, &other.cluster)
            && covers(&self.job, &other.job)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ApplicationPackage,
    Submission,
    Deployment,
    Feed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A message shown to a tenant's users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub at: u64,
    pub kind: NotificationType,
    pub level: NotificationLevel,
    pub source: NotificationSource,
    pub messages: Vec<String>,
}

// ── Name service ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Alias,
    Txt,
}

/// A DNS record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Record {
    pub record_type: RecordType,
    pub name: String,
    pub data: String,
}

impl Record {
    pub fn new(record_type: RecordType, name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            record_type,
            name: name.into(),
            data: data.into(),
        }
    }
}

/// A change to apply to the name service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum NameServiceRequest {
    /// Create the record. A CNAME replaces any other CNAME of the same name;
    /// other types are added next to existing records.
    CreateRecord { record: Record },
    /// Remove records of the given type and name, optionally only those
    /// with the given data.
    RemoveRecords {
        record_type: RecordType,
        name: String,
        data: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub request: NameServiceRequest,
    pub priority: Priority,
    pub owner: Option<ApplicationId>,
}

/// Pending name-service requests, dispatched in order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameServiceQueue {
    requests: VecDeque<QueuedRequest>,
}

impl NameServiceQueue {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &VecDeque<QueuedRequest> {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Enqueue a request. High priority requests go ahead of normal ones.
    pub fn with(mut self, request: QueuedRequest) -> Self {
        match request.priority {
            Priority::Normal => self.requests.push_back(request),
            Priority::High => {
                let at = self
                    .requests
                    .iter()
                    .position(|r| r.priority != Priority::High)
                    .unwrap_or(self.requests.len());
                self.requests.insert(at, request);
            }
        }
        self
    }

    /// Keep only the newest `n` requests.
    pub fn last(mut self, n: usize) -> Self {
        let excess = self.requests.len().saturating_sub(n);
        self.requests.drain(..excess);
        self
    }

    /// Drop the first `n` requests.
    pub fn without_first(mut self, n: usize) -> Self {
        let n = n.min(self.requests.len());
        self.requests.drain(..n);
        self
    }
}

// ── Meta ───────────────────────────────────────────────────────────

/// When a deployment was last made, kept for manually deployed zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMeta {
    pub instance: InstanceId,
    pub zone: ZoneId,
    pub at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: &str, priority: Priority) -> QueuedRequest {
        QueuedRequest {
            request: NameServiceRequest::CreateRecord {
                record: Record::new(RecordType::Cname, name, "lb.example"),
            },
            priority,
            owner: None,
        }
    }

    #[test]
    fn high_priority_requests_jump_the_queue() {
        let queue = NameServiceQueue::empty()
            .with(create("a", Priority::Normal))
            .with(create("b", Priority::High))
            .with(create("c", Priority::High));
        let names: Vec<_> = queue
            .requests()
            .iter()
            .map(|r| match &r.request {
                NameServiceRequest::CreateRecord { record } => record.name.clone(),
                NameServiceRequest::RemoveRecords { name, .. } => name.clone(),
            })
            .collect();
        assert_eq!(names, ["b", "c", "a"]);
    }

    #[test]
    fn last_keeps_newest() {
        let queue = NameServiceQueue::empty()
            .with(create("a", Priority::Normal))
            .with(create("b", Priority::Normal))
            .with(create("c", Priority::Normal))
            .last(2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.requests()[0], create("b", Priority::Normal));
        assert_eq!(queue.without_first(5).len(), 0);
    }

    #[test]
    fn notification_source_containment() {
        let instance = InstanceId::from_parts("acme", "search", "default").unwrap();
        let zone = ZoneId::prod("us-east").unwrap();
        let app = NotificationSource::from_application(&instance.application_id());
        let deployment = NotificationSource::from_deployment(&instance, zone);
        assert!(app.contains(&deployment));
        assert!(!deployment.contains(&app));
        let other = NotificationSource::from_tenant(TenantName::new("other").unwrap());
        assert!(!other.contains(&deployment));
    }

    #[test]
    fn confidence_ordering() {
        assert!(Confidence::High.equal_or_higher_than(Confidence::Normal));
        assert!(!Confidence::Broken.equal_or_higher_than(Confidence::Low));
    }

    #[test]
    fn version_status_is_sorted() {
        let status = VersionStatus::new(vec![
            PlatformVersion::new(Version::new(8, 2, 0), Confidence::Normal),
            PlatformVersion::new(Version::new(8, 1, 0), Confidence::High).as_system_version(),
        ]);
        assert_eq!(status.versions()[0].version, Version::new(8, 1, 0));
        assert_eq!(status.system_version().unwrap().version, Version::new(8, 1, 0));
        assert_eq!(status.without(&Version::new(8, 1, 0)).versions().len(), 1);
    }
}
