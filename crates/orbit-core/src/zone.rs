//! Zones: an environment plus a region.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Deployment environment of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Perf,
    Test,
    Staging,
    Prod,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Prod
    }

    /// Environments deployed to directly by users, outside the pipeline.
    pub fn is_manually_deployed(self) -> bool {
        matches!(self, Environment::Dev | Environment::Perf)
    }

    pub fn is_test(self) -> bool {
        matches!(self, Environment::Test | Environment::Staging)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Perf => "perf",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "dev" => Ok(Environment::Dev),
            "perf" => Ok(Environment::Perf),
            "test" => Ok(Environment::Test),
            "staging" => Ok(Environment::Staging),
            "prod" => Ok(Environment::Prod),
            other => Err(CoreError::InvalidZone(other.to_string())),
        }
    }
}

/// Name of a region, e.g. `us-east`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionName(String);

impl RegionName {
    pub fn new(value: impl Into<String>) -> CoreResult<Self> {
        let value = value.into();
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(CoreError::InvalidName {
                kind: "region",
                value,
                reason: "must be non-empty lowercase letters, digits and dashes".to_string(),
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RegionName {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for RegionName {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        Self::new(value)
    }
}

impl From<RegionName> for String {
    fn from(region: RegionName) -> String {
        region.0
    }
}

/// A deployable location, written `environment.region`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId {
    pub environment: Environment,
    pub region: RegionName,
}

impl ZoneId {
    pub fn new(environment: Environment, region: RegionName) -> Self {
        Self {
            environment,
            region,
        }
    }

    pub fn prod(region: &str) -> CoreResult<Self> {
        Ok(Self::new(Environment::Prod, region.parse()?))
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.environment, self.region)
    }
}

impl FromStr for ZoneId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let (environment, region) = s
            .split_once('.')
            .ok_or_else(|| CoreError::InvalidZone(s.to_string()))?;
        Ok(Self::new(environment.parse()?, region.parse()?))
    }
}

/// Cloud account a deployment's resources are provisioned in. Empty means
/// the system's own account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloudAccount(pub String);

impl CloudAccount {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_unspecified(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CloudAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_round_trips_through_display() {
        let zone: ZoneId = "prod.us-east".parse().unwrap();
        assert_eq!(zone.environment, Environment::Prod);
        assert_eq!(zone.region.as_str(), "us-east");
        assert_eq!(zone.to_string(), "prod.us-east");
    }

    #[test]
    fn malformed_zones_are_rejected() {
        assert!("prod".parse::<ZoneId>().is_err());
        assert!("moon.us-east".parse::<ZoneId>().is_err());
        assert!("prod.US".parse::<ZoneId>().is_err());
    }

    #[test]
    fn environment_classification() {
        assert!(Environment::Prod.is_production());
        assert!(Environment::Dev.is_manually_deployed());
        assert!(Environment::Perf.is_manually_deployed());
        assert!(!Environment::Staging.is_manually_deployed());
        assert!(Environment::Test.is_test());
    }
}
