//! Hierarchical identifiers: tenant → application → instance.
//!
//! Names are accepted leniently when read back from storage (existing
//! tenants may carry underscores) and checked strictly with
//! `validate_new` before anything new is created.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::zone::ZoneId;

static LENIENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]{1,256}$").expect("valid regex"));

static STRICT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z](-?[a-z0-9]+)*$").expect("valid regex"));

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $max_len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> CoreResult<Self> {
                let value = value.into();
                if !LENIENT_NAME.is_match(&value) {
                    return Err(CoreError::InvalidName {
                        kind: $kind,
                        value,
                        reason: "must match [a-z0-9_-]{1,256}".to_string(),
                    });
                }
                Ok(Self(value))
            }

            /// Stricter rules applied when a new entity is created.
            pub fn validate_new(&self) -> CoreResult<()> {
                if self.0.len() > $max_len || !STRICT_NAME.is_match(&self.0) {
                    return Err(CoreError::InvalidName {
                        kind: $kind,
                        value: self.0.clone(),
                        reason: format!(
                            "must be at most {} characters of lowercase letters, digits \
                             and single dashes, starting with a letter",
                            $max_len
                        ),
                    });
                }
                Ok(())
            }

            /// The alias under which dash and underscore variants collide.
            pub fn dash_to_underscore(&self) -> Self {
                Self(self.0.replace('-', "_"))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> CoreResult<Self> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> CoreResult<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> String {
                name.0
            }
        }
    };
}

name_type!(
    /// Name of a tenant, the top of the ownership hierarchy.
    TenantName,
    "tenant name",
    20
);

name_type!(
    /// Name of an application within a tenant.
    ApplicationName,
    "application name",
    40
);

name_type!(
    /// Name of an instance of an application.
    InstanceName,
    "instance name",
    40
);

impl InstanceName {
    pub fn default_name() -> Self {
        Self("default".to_string())
    }

    /// Tester instances are reserved for the deployment pipeline.
    pub fn is_tester(&self) -> bool {
        self.0.ends_with("-t")
    }
}

/// A tenant-scoped application: `tenant:application`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId {
    pub tenant: TenantName,
    pub application: ApplicationName,
}

impl ApplicationId {
    pub fn new(tenant: TenantName, application: ApplicationName) -> Self {
        Self {
            tenant,
            application,
        }
    }

    /// Convenience constructor for literals, mostly used by tests.
    pub fn from_parts(tenant: &str, application: &str) -> CoreResult<Self> {
        Ok(Self::new(tenant.parse()?, application.parse()?))
    }

    pub fn instance(&self, name: InstanceName) -> InstanceId {
        InstanceId::new(self.tenant.clone(), self.application.clone(), name)
    }

    pub fn default_instance(&self) -> InstanceId {
        self.instance(InstanceName::default_name())
    }

    pub fn serialized_form(&self) -> String {
        format!("{}:{}", self.tenant, self.application)
    }

    /// Same id with dashes replaced by underscores in every part.
    pub fn dash_to_underscore(&self) -> Self {
        Self::new(
            self.tenant.dash_to_underscore(),
            self.application.dash_to_underscore(),
        )
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.tenant, self.application)
    }
}

impl FromStr for ApplicationId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.split(':').collect::<Vec<_>>().as_slice() {
            [tenant, application] => Self::from_parts(tenant, application),
            _ => Err(CoreError::InvalidId(s.to_string())),
        }
    }
}

impl Ord for ApplicationId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serialized_form().cmp(&other.serialized_form())
    }
}

impl PartialOrd for ApplicationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single instance of an application: `tenant:application:instance`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId {
    pub tenant: TenantName,
    pub application: ApplicationName,
    pub instance: InstanceName,
}

impl InstanceId {
    pub fn new(tenant: TenantName, application: ApplicationName, instance: InstanceName) -> Self {
        Self {
            tenant,
            application,
            instance,
        }
    }

    pub fn from_parts(tenant: &str, application: &str, instance: &str) -> CoreResult<Self> {
        Ok(Self::new(tenant.parse()?, application.parse()?, instance.parse()?))
    }

    pub fn application_id(&self) -> ApplicationId {
        ApplicationId::new(self.tenant.clone(), self.application.clone())
    }

    pub fn serialized_form(&self) -> String {
        format!("{}:{}:{}", self.tenant, self.application, self.instance)
    }

    pub fn dash_to_underscore(&self) -> Self {
        Self::new(
            self.tenant.dash_to_underscore(),
            self.application.dash_to_underscore(),
            self.instance.dash_to_underscore(),
        )
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.tenant, self.application, self.instance)
    }
}

impl FromStr for InstanceId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.split(':').collect::<Vec<_>>().as_slice() {
            [tenant, application, instance] => Self::from_parts(tenant, application, instance),
            _ => Err(CoreError::InvalidId(s.to_string())),
        }
    }
}

impl Ord for InstanceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.serialized_form().cmp(&other.serialized_form())
    }
}

impl PartialOrd for InstanceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Name of a container cluster inside a deployment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub String);

impl ClusterId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn default_id() -> Self {
        Self("default".to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == "default"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a declared global or application endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn default_id() -> Self {
        Self("default".to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == "default"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One instance's presence in one zone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    pub instance: InstanceId,
    pub zone: ZoneId,
}

impl DeploymentId {
    pub fn new(instance: InstanceId, zone: ZoneId) -> Self {
        Self { instance, zone }
    }

    pub fn application_id(&self) -> ApplicationId {
        self.instance.application_id()
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.instance, self.zone)
    }
}
