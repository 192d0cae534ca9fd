//! Compile-version selection.
//!
//! The compile version is the newest platform version an application may be
//! built against such that the result runs on the platforms it is about to be
//! deployed on. Targets are the versions the application may upgrade to given
//! its upgrade policy, never below what it already runs unless a new major is
//! requested explicitly.

use std::collections::BTreeSet;
use std::sync::Arc;

use orbit_core::{Environment, JobId, JobType, UpgradePolicy, Version, ZoneId};
use orbit_state::{Application, Confidence, StateStore};
use tracing::debug;

use crate::compatibility::VersionCompatibility;
use crate::error::{VersionError, VersionResult};
use crate::repository::{ArtifactRepository, NodeRepository};

/// Picks platform versions to compile applications against.
#[derive(Clone)]
pub struct VersionSelector {
    store: StateStore,
    compatibility: VersionCompatibility,
    nodes: Arc<dyn NodeRepository>,
    artifacts: Arc<dyn ArtifactRepository>,
    /// Whether published but unknown versions are trusted over known ones.
    public: bool,
}

impl VersionSelector {
    pub fn new(
        store: StateStore,
        compatibility: VersionCompatibility,
        nodes: Arc<dyn NodeRepository>,
        artifacts: Arc<dyn ArtifactRepository>,
        public: bool,
    ) -> Self {
        Self {
            store,
            compatibility,
            nodes,
            artifacts,
            public,
        }
    }

    pub fn compatibility(&self) -> &VersionCompatibility {
        &self.compatibility
    }

    /// The platform version to compile `application` against, optionally
    /// forcing a major version.
    pub fn compile_version(
        &self,
        application: &Application,
        wanted_major: Option<u64>,
    ) -> VersionResult<Version> {
        let oldest_installed = self.oldest_installed_platform(application)?;
        let status = self.store.read_version_status()?;
        let target_confidence =
            target_confidence(application.deployment_spec().effective_upgrade_policy());

        // Don't downgrade installed platforms, unless forcing a different major.
        let floor = match (wanted_major, &oldest_installed) {
            (None, None) => None,
            (None, Some(installed)) => Some(installed.clone()),
            (Some(major), Some(installed)) if major == installed.major() => Some(installed.clone()),
            (Some(major), _) => Some(Version::new(major, 0, 0)),
        };
        let mut targets: BTreeSet<Version> = status
            .versions()
            .iter()
            .filter(|v| v.confidence.equal_or_higher_than(target_confidence))
            .map(|v| v.version.clone())
            .filter(|v| floor.as_ref().is_none_or(|floor| !v.is_before(floor)))
            .collect();
        if let Some(installed) = &oldest_installed {
            if wanted_major.is_none_or(|major| major == installed.major()) {
                targets.insert(installed.clone());
            }
        }
        let (Some(oldest_target), Some(newest_target)) = (targets.first(), targets.last()) else {
            return Err(VersionError::NoSuitableVersion(match wanted_major {
                Some(major) => format!("this system has no available versions on major {major}"),
                None => "this system has no available versions".to_string(),
            }));
        };

        // Never compile against anything newer than the oldest platform the
        // application will run on.
        let newest_version = match &oldest_installed {
            None => newest_target.clone(),
            Some(installed)
                if self.compatibility.accept(installed, oldest_target)
                    && installed.is_before(oldest_target) =>
            {
                installed.clone()
            }
            Some(_) => oldest_target.clone(),
        };
        let eligible = |version: &Version| {
            !version.is_after(&newest_version)
                && targets
                    .iter()
                    .any(|target| self.compatibility.accept(version, target))
        };

        let known = status
            .versions()
            .iter()
            .filter(|v| v.confidence.equal_or_higher_than(Confidence::Low) && v.is_released)
            .map(|v| &v.version)
            .filter(|&v| eligible(v))
            .max()
            .cloned();
        let unknown = || {
            self.artifacts
                .published_versions()
                .into_iter()
                .filter(|v| status.version(v).is_none())
                .filter(|v| eligible(v))
                .max()
        };

        let selected = match known {
            Some(known) if self.public => match unknown() {
                Some(unknown) if unknown.is_after(&known) => unknown,
                _ => known,
            },
            Some(known) => known,
            None => unknown().ok_or_else(|| {
                VersionError::NoSuitableVersion(format!(
                    "no known or published platform version compatible with {newest_version} or older"
                ))
            })?,
        };
        debug!(
            application = %application.id(),
            %selected,
            %newest_version,
            "selected compile version"
        );
        Ok(selected)
    }

    /// The oldest platform any production deployment of the application runs
    /// on. Per job, walks runs newest first until a success, falling back to
    /// node state and then the system version.
    pub fn oldest_installed_platform(
        &self,
        application: &Application,
    ) -> VersionResult<Option<Version>> {
        let mut oldest: Option<Version> = None;
        for instance in application.deployment_spec().instances() {
            let instance_id = application.id().instance(instance.name.clone());
            for region in instance.prod_regions() {
                let zone = ZoneId::new(Environment::Prod, region);
                let job = JobId::new(instance_id.clone(), JobType::of(zone));
                if let Some(version) = self.oldest_installed_for(&job)? {
                    oldest = Some(match oldest {
                        Some(current) if current <= version => current,
                        _ => version,
                    });
                }
            }
        }
        Ok(oldest)
    }

    fn oldest_installed_for(&self, job: &JobId) -> VersionResult<Option<Version>> {
        let mut oldest: Option<Version> = None;
        for run in self.store.read_runs(job)?.iter().rev() {
            let version = &run.versions.target_platform;
            if oldest.as_ref().is_none_or(|o| version.is_before(o)) {
                oldest = Some(version.clone());
            }
            if run.has_succeeded() {
                return Ok(oldest);
            }
        }

        // No successful run; ask the zone.
        let from_nodes = self
            .nodes
            .platform_versions(&job.instance, job.zone())
            .into_iter()
            .min();
        if from_nodes.is_some() {
            return Ok(from_nodes);
        }
        Ok(self
            .store
            .read_version_status()?
            .system_version()
            .map(|v| v.version.clone()))
    }
}

fn target_confidence(policy: UpgradePolicy) -> Confidence {
    match policy {
        UpgradePolicy::Canary => Confidence::Broken,
        UpgradePolicy::Default => Confidence::Normal,
        UpgradePolicy::Conservative => Confidence::High,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use orbit_core::{
        ApplicationId, DeploymentSpec, InstanceId, InstanceName, InstanceSpec, RegionName,
        RevisionId,
    };
    use orbit_state::{
        LockedApplication, PlatformVersion, Run, RunId, RunStatus, RunVersions, VersionStatus,
    };

    #[derive(Default)]
    struct Nodes(Mutex<HashMap<(InstanceId, ZoneId), Vec<Version>>>);

    impl NodeRepository for Nodes {
        fn platform_versions(&self, instance: &InstanceId, zone: &ZoneId) -> Vec<Version> {
            let nodes = self.0.lock().unwrap();
            nodes
                .get(&(instance.clone(), zone.clone()))
                .cloned()
                .unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct Artifacts(Vec<Version>);

    impl ArtifactRepository for Artifacts {
        fn published_versions(&self) -> Vec<Version> {
            self.0.clone()
        }
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    struct Fixture {
        store: StateStore,
        nodes: Arc<Nodes>,
        id: ApplicationId,
    }

    impl Fixture {
        fn new(policy: UpgradePolicy) -> Self {
            let store = StateStore::open_in_memory().unwrap();
            let id = ApplicationId::from_parts("acme", "search").unwrap();
            let spec = DeploymentSpec::new(
                vec![InstanceSpec::new(InstanceName::default_name())
                    .with_upgrade_policy(policy)
                    .with_prod_regions(&["us-east".parse::<RegionName>().unwrap()])],
                vec![],
                None,
            )
            .unwrap();
            let lock = store.lock_application(&id).unwrap();
            let locked =
                LockedApplication::new(Application::new(id.clone(), 0), &lock).with_deployment_spec(spec);
            store.write_application(&locked).unwrap();
            drop(locked);
            drop(lock);
            Self {
                store,
                nodes: Arc::new(Nodes::default()),
                id,
            }
        }

        fn status(&self, versions: &[(&str, Confidence)]) {
            let lock = self.store.lock_version_status().unwrap();
            let status = VersionStatus::new(
                versions
                    .iter()
                    .map(|(version, confidence)| PlatformVersion::new(v(version), *confidence))
                    .collect(),
            );
            self.store.write_version_status(&status, &lock).unwrap();
        }

        fn run(&self, number: u64, platform: &str, status: RunStatus) {
            let job = JobId::new(
                self.id.default_instance(),
                JobType::of(ZoneId::prod("us-east").unwrap()),
            );
            let run = Run::started(
                RunId::new(job, number),
                RunVersions::new(v(platform), RevisionId(number)),
                number,
            );
            let run = match status {
                RunStatus::Running => run,
                status => run.finished(status, number + 1),
            };
            self.store.write_run(&run).unwrap();
        }

        fn selector(&self, published: &[&str], public: bool) -> VersionSelector {
            VersionSelector::new(
                self.store.clone(),
                VersionCompatibility::default(),
                self.nodes.clone(),
                Arc::new(Artifacts(published.iter().map(|s| v(s)).collect())),
                public,
            )
        }

        fn compile(&self, selector: &VersionSelector, major: Option<u64>) -> VersionResult<Version> {
            let application = self.store.read_application(&self.id).unwrap().unwrap();
            selector.compile_version(&application, major)
        }
    }

    #[test]
    fn fresh_application_gets_newest_confident_version() {
        let f = Fixture::new(UpgradePolicy::Default);
        f.status(&[
            ("8.1", Confidence::High),
            ("8.2", Confidence::Normal),
            ("8.3", Confidence::Low),
        ]);
        let selector = f.selector(&[], false);
        assert_eq!(f.compile(&selector, None).unwrap(), v("8.2"));
    }

    #[test]
    fn canary_accepts_low_confidence() {
        let f = Fixture::new(UpgradePolicy::Canary);
        f.status(&[("8.1", Confidence::High), ("8.3", Confidence::Low)]);
        assert_eq!(f.compile(&f.selector(&[], false), None).unwrap(), v("8.3"));
    }

    #[test]
    fn never_compiles_newer_than_installed() {
        let f = Fixture::new(UpgradePolicy::Default);
        f.status(&[
            ("7.0", Confidence::High),
            ("7.1", Confidence::High),
            ("7.2", Confidence::High),
        ]);
        f.run(1, "7.1", RunStatus::Success);
        let selector = f.selector(&[], false);
        assert_eq!(f.compile(&selector, None).unwrap(), v("7.1"));
        let application = f.store.read_application(&f.id).unwrap().unwrap();
        assert_eq!(selector.oldest_installed_platform(&application).unwrap(), Some(v("7.1")));
    }

    #[test]
    fn failed_runs_lower_the_installed_floor() {
        let f = Fixture::new(UpgradePolicy::Default);
        f.status(&[
            ("7.0", Confidence::High),
            ("7.1", Confidence::High),
            ("7.2", Confidence::High),
        ]);
        f.run(1, "7.1", RunStatus::Success);
        f.run(2, "7.0", RunStatus::DeploymentFailed);
        f.run(3, "7.2", RunStatus::DeploymentFailed);
        let selector = f.selector(&[], false);
        let application = f.store.read_application(&f.id).unwrap().unwrap();
        assert_eq!(selector.oldest_installed_platform(&application).unwrap(), Some(v("7.0")));
    }

    #[test]
    fn falls_back_to_nodes_then_system_version() {
        let f = Fixture::new(UpgradePolicy::Default);
        let lock = f.store.lock_version_status().unwrap();
        f.store
            .write_version_status(
                &VersionStatus::new(vec![
                    PlatformVersion::new(v("8.0"), Confidence::High).as_system_version(),
                    PlatformVersion::new(v("8.5"), Confidence::High),
                ]),
                &lock,
            )
            .unwrap();
        drop(lock);
        let selector = f.selector(&[], false);
        let application = f.store.read_application(&f.id).unwrap().unwrap();
        assert_eq!(selector.oldest_installed_platform(&application).unwrap(), Some(v("8.0")));

        f.nodes.0.lock().unwrap().insert(
            (f.id.default_instance(), ZoneId::prod("us-east").unwrap()),
            vec![v("8.4"), v("8.3")],
        );
        assert_eq!(selector.oldest_installed_platform(&application).unwrap(), Some(v("8.3")));
    }

    #[test]
    fn wanted_major_allows_leaving_the_installed_major() {
        let f = Fixture::new(UpgradePolicy::Default);
        f.status(&[
            ("7.5", Confidence::High),
            ("8.0", Confidence::High),
            ("8.1", Confidence::Normal),
        ]);
        f.run(1, "7.5", RunStatus::Success);
        let selector = f.selector(&[], false);
        assert_eq!(f.compile(&selector, None).unwrap(), v("7.5"));
        assert_eq!(f.compile(&selector, Some(8)).unwrap(), v("8.0"));
    }

    #[test]
    fn empty_system_has_no_suitable_version() {
        let f = Fixture::new(UpgradePolicy::Default);
        let err = f.compile(&f.selector(&[], false), Some(9)).unwrap_err();
        assert!(matches!(err, VersionError::NoSuitableVersion(ref m) if m.contains("major 9")));
    }

    #[test]
    fn unknown_versions_are_a_fallback() {
        let f = Fixture::new(UpgradePolicy::Default);
        f.status(&[("8.2", Confidence::Normal)]);
        f.run(1, "8.2", RunStatus::Success);
        let lock = f.store.lock_version_status().unwrap();
        let mut status = f.store.read_version_status().unwrap();
        status = VersionStatus::new(
            status
                .versions()
                .iter()
                .cloned()
                .map(|mut pv| {
                    pv.is_released = false;
                    pv
                })
                .collect(),
        );
        f.store.write_version_status(&status, &lock).unwrap();
        drop(lock);

        let selector = f.selector(&["8.1", "8.2", "8.9"], false);
        assert_eq!(f.compile(&selector, None).unwrap(), v("8.1"));
    }

    #[test]
    fn public_systems_prefer_newer_unknown_versions() {
        let f = Fixture::new(UpgradePolicy::Default);
        f.status(&[("8.1", Confidence::Low), ("8.3", Confidence::Normal)]);
        f.run(1, "8.3", RunStatus::Success);
        let published = ["8.1", "8.2", "8.3", "8.4"];
        assert_eq!(f.compile(&f.selector(&published, false), None).unwrap(), v("8.3"));

        // 8.2 is published but unknown, and not newer than the known 8.3.
        assert_eq!(f.compile(&f.selector(&published, true), None).unwrap(), v("8.3"));

        f.status(&[("8.1", Confidence::Normal), ("8.3", Confidence::Normal)]);
        f.run(2, "8.1", RunStatus::Success);
        let selector = f.selector(&["8.2"], true);
        assert_eq!(f.compile(&selector, None).unwrap(), v("8.1"));
    }

    #[test]
    fn result_never_exceeds_the_ceiling() {
        let confidences = [Confidence::Broken, Confidence::Low, Confidence::Normal, Confidence::High];
        for policy in [UpgradePolicy::Canary, UpgradePolicy::Default, UpgradePolicy::Conservative] {
            for (i, installed) in ["7.1", "7.3", "8.0"].iter().enumerate() {
                let f = Fixture::new(policy);
                f.status(&[
                    ("7.0", confidences[i]),
                    ("7.1", confidences[(i + 1) % 4]),
                    ("7.2", confidences[(i + 2) % 4]),
                    ("7.3", confidences[(i + 3) % 4]),
                    ("8.0", Confidence::High),
                ]);
                f.run(1, installed, RunStatus::Success);
                let selector = f.selector(&["7.4", "8.1"], true);
                if let Ok(version) = f.compile(&selector, None) {
                    assert!(!version.is_after(&v(installed)), "{policy:?} {installed} -> {version}");
                }
            }
        }
    }
}
