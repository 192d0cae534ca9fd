//! Deployment jobs: one job per instance and zone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::InstanceId;
use crate::zone::{Environment, ZoneId};

/// The kind of a deployment job, identified by the zone it deploys to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobType {
    zone: ZoneId,
}

impl JobType {
    pub fn of(zone: ZoneId) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &ZoneId {
        &self.zone
    }

    pub fn is_production(&self) -> bool {
        self.zone.environment.is_production()
    }

    pub fn job_name(&self) -> String {
        match self.zone.environment {
            Environment::Test => "system-test".to_string(),
            Environment::Staging => "staging-test".to_string(),
            Environment::Prod => format!("production-{}", self.zone.region),
            Environment::Dev => format!("dev-{}", self.zone.region),
            Environment::Perf => format!("perf-{}", self.zone.region),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_name())
    }
}

/// A job of a specific instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub instance: InstanceId,
    pub job_type: JobType,
}

impl JobId {
    pub fn new(instance: InstanceId, job_type: JobType) -> Self {
        Self { instance, job_type }
    }

    pub fn zone(&self) -> &ZoneId {
        self.job_type.zone()
    }

    pub fn table_key(&self) -> String {
        format!("{}/{}", self.instance.serialized_form(), self.job_type.job_name())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.job_type, self.instance)
    }
}
