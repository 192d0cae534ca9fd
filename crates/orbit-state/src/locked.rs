//! Lock-carrying wrappers around applications and tenants.
//!
//! These are the only way to obtain a modified application or tenant that the
//! store will persist. Each wrapper borrows the guard it was built from, so it
//! can't outlive the lock.

use orbit_core::{DeploymentSpec, InstanceName, Tags, ValidationOverrides};

use crate::application::{Application, ApplicationVersion, Instance};
use crate::error::{StateError, StateResult};
use crate::lock::{ApplicationLock, TenantLock};
use crate::tenant::{
    ArchiveAccess, AthenzTenant, CloudTenant, DeletedTenant, SecretStore, Tenant, UserLevel,
};

// ── Applications ───────────────────────────────────────────────────

/// An application read under its lock, modified by consuming `with_*` calls.
#[derive(Debug)]
pub struct LockedApplication<'a> {
    application: Application,
    lock: &'a ApplicationLock,
}

impl<'a> LockedApplication<'a> {
    /// Wrap `application`, which must be the one `lock` guards.
    pub fn new(application: Application, lock: &'a ApplicationLock) -> Self {
        debug_assert_eq!(application.id(), lock.application());
        Self { application, lock }
    }

    pub fn get(&self) -> &Application {
        &self.application
    }

    pub fn lock(&self) -> &'a ApplicationLock {
        self.lock
    }

    pub fn with_new_instance(mut self, name: InstanceName, tags: Tags) -> Self {
        let id = self.application.id.instance(name.clone());
        self.application
            .instances
            .insert(name, Instance::new(id).with_tags(tags));
        self
    }

    /// Apply `modification` to the named instance. No-op if it doesn't exist.
    pub fn with_instance(
        mut self,
        name: &InstanceName,
        modification: impl FnOnce(Instance) -> Instance,
    ) -> Self {
        if let Some(instance) = self.application.instances.remove(name) {
            self.application
                .instances
                .insert(name.clone(), modification(instance));
        }
        self
    }

    pub fn without(mut self, name: &InstanceName) -> Self {
        self.application.instances.remove(name);
        self
    }

    pub fn with_deployment_spec(mut self, spec: DeploymentSpec) -> Self {
        self.application.deployment_spec = spec;
        self
    }

    pub fn with_validation_overrides(mut self, overrides: ValidationOverrides) -> Self {
        self.application.validation_overrides = overrides;
        self
    }

    /// Add or replace a revision.
    pub fn with_revision(mut self, revision: ApplicationVersion) -> Self {
        let revisions = &mut self.application.revisions;
        revisions.retain(|r| r.id != revision.id);
        revisions.push(revision);
        revisions.sort_by_key(|r| r.id);
        self
    }

    pub fn with_major_version(mut self, major_version: Option<u64>) -> Self {
        self.application.major_version = major_version;
        self
    }

    pub fn with_deploy_key(mut self, key: String) -> Self {
        self.application.deploy_keys.insert(key);
        self
    }

    pub fn without_deploy_key(mut self, key: &str) -> Self {
        self.application.deploy_keys.remove(key);
        self
    }
}

// ── Tenants ────────────────────────────────────────────────────────

/// A tenant read under its lock.
#[derive(Debug)]
pub enum LockedTenant<'a> {
    Athenz(LockedAthenzTenant<'a>),
    Cloud(LockedCloudTenant<'a>),
    Deleted(LockedDeletedTenant<'a>),
}

impl<'a> LockedTenant<'a> {
    /// Wrap `tenant`, which must be the one `lock` guards.
    pub fn of(tenant: Tenant, lock: &'a TenantLock) -> Self {
        debug_assert_eq!(tenant.name(), lock.tenant());
        match tenant {
            Tenant::Athenz(tenant) => LockedTenant::Athenz(LockedAthenzTenant { tenant, lock }),
            Tenant::Cloud(tenant) => LockedTenant::Cloud(LockedCloudTenant { tenant, lock }),
            Tenant::Deleted(tenant) => LockedTenant::Deleted(LockedDeletedTenant { tenant, lock }),
        }
    }

    pub fn get(&self) -> Tenant {
        match self {
            LockedTenant::Athenz(t) => Tenant::Athenz(t.tenant.clone()),
            LockedTenant::Cloud(t) => Tenant::Cloud(t.tenant.clone()),
            LockedTenant::Deleted(t) => Tenant::Deleted(t.tenant.clone()),
        }
    }

    pub fn lock(&self) -> &'a TenantLock {
        match self {
            LockedTenant::Athenz(t) => t.lock,
            LockedTenant::Cloud(t) => t.lock,
            LockedTenant::Deleted(t) => t.lock,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            LockedTenant::Athenz(_) => "athenz",
            LockedTenant::Cloud(_) => "cloud",
            LockedTenant::Deleted(_) => "deleted",
        }
    }

    /// Record a login, for any tenant that isn't deleted.
    pub fn with_last_login(self, level: UserLevel, at: u64) -> Self {
        match self {
            LockedTenant::Athenz(t) => LockedTenant::Athenz(t.with_last_login(level, at)),
            LockedTenant::Cloud(t) => LockedTenant::Cloud(t.with_last_login(level, at)),
            deleted @ LockedTenant::Deleted(_) => deleted,
        }
    }
}

/// A tenant type whose locked form can be narrowed from a [`LockedTenant`].
pub trait LockedVariant {
    type Locked<'a>: Into<LockedTenant<'a>>;

    /// Fails with [`StateError::TenantType`] if `locked` is another variant.
    fn narrow(locked: LockedTenant<'_>) -> StateResult<Self::Locked<'_>>;
}

impl LockedVariant for Tenant {
    type Locked<'a> = LockedTenant<'a>;

    fn narrow(locked: LockedTenant<'_>) -> StateResult<LockedTenant<'_>> {
        Ok(locked)
    }
}

/// Wraps a tenant type with its lock and implements the conversions to and
/// from [`LockedTenant`].
macro_rules! locked_variant {
    ($locked:ident, $inner:ident, $variant:ident, $type_name:literal) => {
        #[derive(Debug)]
        pub struct $locked<'a> {
            tenant: $inner,
            lock: &'a TenantLock,
        }

        impl<'a> $locked<'a> {
            pub fn get(&self) -> &$inner {
                &self.tenant
            }

            pub fn lock(&self) -> &'a TenantLock {
                self.lock
            }
        }

        impl<'a> From<$locked<'a>> for LockedTenant<'a> {
            fn from(locked: $locked<'a>) -> Self {
                LockedTenant::$variant(locked)
            }
        }

        impl<'a> TryFrom<LockedTenant<'a>> for $locked<'a> {
            type Error = StateError;

            fn try_from(locked: LockedTenant<'a>) -> Result<Self, StateError> {
                match locked {
                    LockedTenant::$variant(inner) => Ok(inner),
                    other => Err(StateError::TenantType {
                        name: other.lock().tenant().to_string(),
                        expected: $type_name,
                        actual: other.type_name(),
                    }),
                }
            }
        }

        impl LockedVariant for $inner {
            type Locked<'a> = $locked<'a>;

            fn narrow(locked: LockedTenant<'_>) -> StateResult<$locked<'_>> {
                $locked::try_from(locked)
            }
        }
    };
}

locked_variant!(LockedAthenzTenant, AthenzTenant, Athenz, "athenz");
locked_variant!(LockedCloudTenant, CloudTenant, Cloud, "cloud");
locked_variant!(LockedDeletedTenant, DeletedTenant, Deleted, "deleted");

impl LockedAthenzTenant<'_> {
    pub fn with_domain(mut self, domain: String) -> Self {
        self.tenant.domain = domain;
        self
    }

    pub fn with_property(mut self, property: String, property_id: Option<String>) -> Self {
        self.tenant.property = property;
        self.tenant.property_id = property_id;
        self
    }

    pub fn with_last_login(mut self, level: UserLevel, at: u64) -> Self {
        let info = std::mem::take(&mut self.tenant.last_login);
        self.tenant.last_login = info.with_login(level, at);
        self
    }
}

impl LockedCloudTenant<'_> {
    pub fn with_developer_key(mut self, key: String, user: String) -> Self {
        self.tenant.developer_keys.insert(key, user);
        self
    }

    pub fn without_developer_key(mut self, key: &str) -> Self {
        self.tenant.developer_keys.remove(key);
        self
    }

    pub fn with_secret_store(mut self, store: SecretStore) -> Self {
        self.tenant.secret_stores.retain(|s| s.name != store.name);
        self.tenant.secret_stores.push(store);
        self
    }

    pub fn without_secret_store(mut self, name: &str) -> Self {
        self.tenant.secret_stores.retain(|s| s.name != name);
        self
    }

    pub fn with_archive_access(mut self, access: ArchiveAccess) -> Self {
        self.tenant.archive_access = access;
        self
    }

    pub fn with_last_login(mut self, level: UserLevel, at: u64) -> Self {
        let info = std::mem::take(&mut self.tenant.last_login);
        self.tenant.last_login = info.with_login(level, at);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StateStore;
    use orbit_core::TenantName;

    #[test]
    fn narrowing_checks_the_variant() {
        let store = StateStore::open_in_memory().unwrap();
        let name = TenantName::new("acme").unwrap();
        let lock = store.lock_tenant(&name).unwrap();
        let tenant = Tenant::Cloud(CloudTenant::create(name.clone(), 1, None));

        let cloud = CloudTenant::narrow(LockedTenant::of(tenant.clone(), &lock)).unwrap();
        assert_eq!(cloud.get().name, name);

        let err = AthenzTenant::narrow(LockedTenant::of(tenant, &lock)).unwrap_err();
        assert!(matches!(
            err,
            StateError::TenantType { expected: "athenz", actual: "cloud", .. }
        ));
    }
}
