//! orbit.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::routing::{RotationId, RoutingMethod};
use crate::version::Version;
use crate::zone::{CloudAccount, Environment, RegionName, ZoneId};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrbitConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub rotations: Vec<RotationConfig>,
    #[serde(default)]
    pub versions: VersionsConfig,
    #[serde(default)]
    pub locks: LocksConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub name: String,
    /// Public systems trust platform versions that are published but not yet
    /// rated by the fleet.
    #[serde(default)]
    pub public: bool,
    pub dns_suffix: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            public: false,
            dns_suffix: "orbit.example".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub environment: Environment,
    pub region: RegionName,
    #[serde(default = "default_routing_methods")]
    pub routing_methods: Vec<RoutingMethod>,
    pub vip_hostname: Option<String>,
    pub cloud_account: Option<CloudAccount>,
}

fn default_routing_methods() -> Vec<RoutingMethod> {
    vec![RoutingMethod::Exclusive]
}

impl ZoneConfig {
    pub fn id(&self) -> ZoneId {
        ZoneId::new(self.environment, self.region.clone())
    }
}

/// One entry of the global rotation pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationConfig {
    pub id: RotationId,
    /// Canonical hostname global endpoints are pointed at.
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VersionsConfig {
    /// Versions at which compatibility breaks within a major.
    #[serde(default)]
    pub incompatible: Vec<Version>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocksConfig {
    pub timeout_secs: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Whether deployments get randomized endpoint names in addition to the
    /// predictable ones.
    #[serde(default)]
    pub generated_endpoints: bool,
    pub name_service_queue_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            generated_endpoints: false,
            name_service_queue_capacity: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/orbit/orbit.redb"),
        }
    }
}

/// Longest DNS suffix that leaves room for a certificate common name of
/// `v<hash>.<suffix>` with at least one hash character in 64 characters.
pub const MAX_DNS_SUFFIX_LENGTH: usize = 61;

impl OrbitConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: OrbitConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let suffix = &self.system.dns_suffix;
        anyhow::ensure!(!suffix.is_empty(), "system.dns_suffix must not be empty");
        anyhow::ensure!(
            suffix.len() <= MAX_DNS_SUFFIX_LENGTH,
            "system.dns_suffix '{suffix}' is {} characters, longer than {MAX_DNS_SUFFIX_LENGTH}",
            suffix.len()
        );
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn zone(&self, id: &ZoneId) -> Option<&ZoneConfig> {
        self.zones.iter().find(|z| &z.id() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[system]
name = "public"
public = true
dns_suffix = "orbit.cloud"

[[zones]]
environment = "prod"
region = "us-east"
routing_methods = ["exclusive"]

[[zones]]
environment = "prod"
region = "eu-west"
routing_methods = ["shared_layer4"]
vip_hostname = "vip.eu-west.orbit.cloud"

[[rotations]]
id = "rotation-01"
name = "rotation-fqdn-01"

[versions]
incompatible = ["8.100"]

[locks]
timeout_secs = 5
"#;
        let config: OrbitConfig = toml::from_str(toml_str).unwrap();
        assert!(config.system.public);
        assert_eq!(config.zones.len(), 2);
        assert_eq!(config.zones[1].routing_methods, vec![RoutingMethod::SharedLayer4]);
        assert_eq!(config.rotations[0].id, RotationId::new("rotation-01"));
        assert_eq!(config.versions.incompatible, vec![Version::new(8, 100, 0)]);
        assert_eq!(config.locks.timeout_secs, 5);
        assert_eq!(config.routing.name_service_queue_capacity, 300);

        let zone = config.zone(&ZoneId::prod("eu-west").unwrap()).unwrap();
        assert_eq!(zone.vip_hostname.as_deref(), Some("vip.eu-west.orbit.cloud"));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: OrbitConfig = toml::from_str("").unwrap();
        assert_eq!(config.system.dns_suffix, "orbit.example");
        assert!(config.zones.is_empty());
        assert_eq!(config.locks.timeout_secs, 60);
    }

    #[test]
    fn overlong_dns_suffix_is_rejected() {
        let with_suffix = |suffix: &str| {
            format!("[system]\nname = \"x\"\npublic = false\ndns_suffix = \"{suffix}\"\n")
        };
        let longest = format!("{}.cloud", "a".repeat(MAX_DNS_SUFFIX_LENGTH - 6));
        assert_eq!(longest.len(), MAX_DNS_SUFFIX_LENGTH);
        let config = OrbitConfig::from_toml_str(&with_suffix(&longest)).unwrap();
        assert_eq!(config.system.dns_suffix, longest);

        let err = OrbitConfig::from_toml_str(&with_suffix(&format!("a{longest}"))).unwrap_err();
        assert!(err.to_string().contains("longer than 61"));
        assert!(OrbitConfig::from_toml_str(&with_suffix("")).is_err());
    }
}
