//! Routing vocabulary shared by configuration and the routing layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How traffic reaches a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    /// Legacy shared routing layer, reached through rotations only.
    Shared,
    /// Shared layer-4 routing behind the zone VIP.
    SharedLayer4,
    /// A dedicated load balancer per deployment.
    Exclusive,
}

impl RoutingMethod {
    /// Direct methods route straight to the deployment without a shared proxy layer.
    pub fn is_direct(self) -> bool {
        matches!(self, RoutingMethod::SharedLayer4 | RoutingMethod::Exclusive)
    }

    pub fn is_shared(self) -> bool {
        matches!(self, RoutingMethod::Shared | RoutingMethod::SharedLayer4)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoutingMethod::Shared => "shared",
            RoutingMethod::SharedLayer4 => "shared_layer4",
            RoutingMethod::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for RoutingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How clients authenticate against an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Mtls,
    Token,
    None,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthMethod::Mtls => "mtls",
            AuthMethod::Token => "token",
            AuthMethod::None => "none",
        })
    }
}

/// Identifier of a rotation in the global pool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RotationId(pub String);

impl RotationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for RotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
