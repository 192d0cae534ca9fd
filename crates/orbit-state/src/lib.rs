//! orbit-state: persistent state and entity locks for Orbit.
//!
//! Backed by [redb](https://docs.rs/redb), stores applications, tenants,
//! version status, job runs, generated endpoints, notifications, packages
//! and the name-service queue.
//!
//! # Locking
//!
//! Every write goes through a lock guard obtained from the same store. Reads
//! take no lock. Writers follow "lock, read, modify, write" and hold the
//! guard across the whole span; `LockedApplication` and `LockedTenant` can
//! only be built from a guard, so a value that was modified without the
//! lock can't be persisted.
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.

pub mod application;
pub mod error;
pub mod lock;
pub mod locked;
pub mod store;
pub mod tables;
pub mod tenant;
pub mod types;

mod serde_maps;

pub use application::*;
pub use error::{StateError, StateResult};
pub use lock::{
    ApplicationLock, Lock, LockRegistry, NameServiceQueueLock, NotificationsLock, OsVersionLock,
    RotationLock, TenantLock, VersionStatusLock,
};
pub use locked::{
    LockedApplication, LockedAthenzTenant, LockedCloudTenant, LockedDeletedTenant, LockedTenant,
    LockedVariant,
};
pub use store::StateStore;
pub use tenant::*;
pub use types::*;
