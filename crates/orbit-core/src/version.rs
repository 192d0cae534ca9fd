//! Platform versions and application revisions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A platform version, `major.minor.micro`, ordered numerically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(semver::Version);

impl Version {
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self(semver::Version::new(major, minor, micro))
    }

    /// Parse `8`, `8.1` or `8.1.2`; missing parts are zero.
    pub fn parse(value: &str) -> CoreResult<Self> {
        let mut parts = [0u64; 3];
        let pieces: Vec<&str> = value.split('.').collect();
        if pieces.is_empty() || pieces.len() > 3 {
            return Err(CoreError::InvalidVersion(value.to_string()));
        }
        for (slot, piece) in parts.iter_mut().zip(&pieces) {
            *slot = piece
                .parse()
                .map_err(|_| CoreError::InvalidVersion(value.to_string()))?;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn micro(&self) -> u64 {
        self.0.patch
    }

    pub fn is_before(&self, other: &Version) -> bool {
        self < other
    }

    pub fn is_after(&self, other: &Version) -> bool {
        self > other
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0.major, self.0.minor, self.0.patch)
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> String {
        version.to_string()
    }
}

/// Build number of a submitted application package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub u64);

impl RevisionId {
    pub fn number(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "build {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_forms() {
        assert_eq!(Version::parse("8").unwrap(), Version::new(8, 0, 0));
        assert_eq!(Version::parse("8.2").unwrap(), Version::new(8, 2, 0));
        assert_eq!(Version::parse("8.2.11").unwrap().to_string(), "8.2.11");
        assert!(Version::parse("8.x").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
    }

    #[test]
    fn orders_numerically_not_lexically() {
        let a = Version::parse("7.9.0").unwrap();
        let b = Version::parse("7.10.0").unwrap();
        assert!(a.is_before(&b));
        assert!(b.is_after(&a));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Version::new(8, 1, 2)).unwrap();
        assert_eq!(json, "\"8.1.2\"");
    }
}
