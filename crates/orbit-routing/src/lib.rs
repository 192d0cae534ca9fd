//! orbit-routing: how traffic reaches deployments.
//!
//! Endpoints are never stored. They are recomputed from the deployment spec,
//! the zone routing configuration, assigned rotations and generated endpoint
//! names every time routing is touched; the only durable output is the DNS
//! records sent through the [`NameServiceForwarder`].

pub mod certificate;
pub mod computer;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod name_service;
pub mod rotation;
pub mod zone;

pub use computer::EndpointComputer;
pub use controller::{EndpointCertificate, LoadBalancer, PreparedEndpoints, RoutingController};
pub use endpoint::{Endpoint, EndpointList, EndpointScope, WeightedDeployment};
pub use error::{RoutingError, RoutingResult};
pub use name_service::{
    MemoryNameService, NameService, NameServiceDispatcher, NameServiceForwarder,
    QueuedNameServiceForwarder,
};
pub use rotation::RotationAssigner;
pub use zone::ZoneRouting;
