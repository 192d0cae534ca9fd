//! A submitted application package, already parsed and validated upstream.

use serde::{Deserialize, Serialize};

use crate::spec::{DeploymentSpec, ServicesSpec, ValidationOverrides};
use crate::version::Version;

/// The deployable artifact together with the specs extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApplicationPackage {
    pub deployment_spec: DeploymentSpec,
    pub services: ServicesSpec,
    pub validation_overrides: ValidationOverrides,
    /// Platform version the package was compiled against, if known.
    #[serde(default)]
    pub compile_version: Option<Version>,
    /// Opaque package content handed to the deployer.
    #[serde(default)]
    pub content: Vec<u8>,
}

impl ApplicationPackage {
    pub fn new(deployment_spec: DeploymentSpec, services: ServicesSpec) -> Self {
        Self {
            deployment_spec,
            services,
            ..Self::default()
        }
    }

    pub fn with_validation_overrides(mut self, overrides: ValidationOverrides) -> Self {
        self.validation_overrides = overrides;
        self
    }

    pub fn with_content(mut self, content: Vec<u8>) -> Self {
        self.content = content;
        self
    }
}
