//! orbit-controller: the entry points that change applications and tenants.
//!
//! [`ApplicationController`] owns the application lifecycle: creation,
//! package submission, deployment through the external [`Deployer`] and
//! teardown. [`TenantController`] does the same for tenants.
//!
//! # Locking
//!
//! ```text
//! deploy(job)
//!   ├── deployment lock            held for the whole call
//!   │     ├── application lock     snapshot + routing preparation
//!   │     ├── Deployer::deploy     no application lock held
//!   │     ├── routing reconfigure  always, also on failure
//!   │     └── application lock     re-read, record the deployment
//! ```
//!
//! Everything else that reads and then writes an application holds its lock
//! for the whole span.

pub mod application;
pub mod collaborators;
pub mod error;
pub mod notifications;
pub mod tenant;
pub mod testing;

pub use application::ApplicationController;
pub use collaborators::{
    AccessControl, Collaborators, Credentials, Deployer, DeploymentRequest, DeploymentResult,
    PackageValidator,
};
pub use error::{ControllerError, ControllerResult};
pub use notifications::Notifier;
pub use tenant::{TenantController, TenantSpec};
