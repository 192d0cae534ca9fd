//! Tenant lifecycle.

use std::sync::Arc;

use orbit_core::{Clock, TenantName};
use orbit_state::{
    ArchiveAccess, AthenzTenant, CloudTenant, DeletedTenant, LastLoginInfo, LockedTenant,
    LockedVariant, SecretStore, StateStore, Tenant, TenantLock, UserLevel,
};
use tracing::info;

use crate::collaborators::{AccessControl, Credentials};
use crate::error::{ControllerError, ControllerResult};

/// A request to create or update a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantSpec {
    Athenz {
        name: TenantName,
        domain: String,
        property: String,
        property_id: Option<String>,
    },
    Cloud {
        name: TenantName,
    },
}

impl TenantSpec {
    pub fn name(&self) -> &TenantName {
        match self {
            TenantSpec::Athenz { name, .. } | TenantSpec::Cloud { name } => name,
        }
    }
}

/// Creates, updates and deletes tenants.
#[derive(Clone)]
pub struct TenantController {
    store: StateStore,
    access_control: Arc<dyn AccessControl>,
    clock: Arc<dyn Clock>,
}

impl TenantController {
    pub fn new(
        store: StateStore,
        access_control: Arc<dyn AccessControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            access_control,
            clock,
        }
    }

    pub fn get(&self, name: &TenantName) -> ControllerResult<Option<Tenant>> {
        Ok(self.store.read_tenant(name)?)
    }

    /// Tenants that aren't deleted.
    pub fn list(&self) -> ControllerResult<Vec<Tenant>> {
        Ok(self
            .store
            .read_tenants()?
            .into_iter()
            .filter(|t| !t.is_deleted())
            .collect())
    }

    /// Create a tenant. Names of deleted tenants stay taken, and so do names
    /// differing from an existing one only in dashes and underscores.
    pub fn create(&self, spec: TenantSpec, credentials: &Credentials) -> ControllerResult<Tenant> {
        let name = spec.name().clone();
        let lock = self.store.lock_tenant(&name)?;
        if let Some(existing) = self.store.read_tenant(&name)? {
            let what = if existing.is_deleted() { "deleted tenant" } else { "tenant" };
            return Err(ControllerError::AlreadyExists(format!("{what} '{name}'")));
        }
        let normalized = name.dash_to_underscore();
        if let Some(alias) = self
            .store
            .read_tenants()?
            .into_iter()
            .find(|t| t.name().dash_to_underscore() == normalized)
        {
            return Err(ControllerError::AlreadyExists(format!(
                "tenant '{}', which conflicts with '{name}'",
                alias.name()
            )));
        }
        name.validate_new()?;

        self.access_control.create_tenant(&spec, credentials)?;
        let now = self.clock.now();
        let tenant = match spec {
            TenantSpec::Athenz {
                name,
                domain,
                property,
                property_id,
            } => Tenant::Athenz(AthenzTenant {
                name,
                created_at: now,
                last_login: LastLoginInfo::empty(),
                domain,
                property,
                property_id,
            }),
            TenantSpec::Cloud { name } => {
                Tenant::Cloud(CloudTenant::create(name, now, Some(credentials.user.clone())))
            }
        };
        self.store.write_tenant(&LockedTenant::of(tenant.clone(), &lock))?;
        info!(tenant = %name, kind = tenant.type_name(), "created tenant");
        Ok(tenant)
    }

    /// Update the identity domain and property of an Athenz tenant. Cloud
    /// tenants have nothing to update here, but must exist.
    pub fn update(&self, spec: TenantSpec, credentials: &Credentials) -> ControllerResult<()> {
        let lock = self.store.lock_tenant(spec.name())?;
        self.access_control.update_tenant(&spec, credentials)?;
        match spec {
            TenantSpec::Athenz {
                domain,
                property,
                property_id,
                ..
            } => self.lock_or_throw::<AthenzTenant>(&lock, |tenant| {
                tenant.with_domain(domain).with_property(property, property_id)
            }),
            TenantSpec::Cloud { .. } => self.lock_or_throw::<CloudTenant>(&lock, |tenant| tenant),
        }
    }

    /// Delete a tenant without applications. The tenant is kept as deleted,
    /// reserving its name, unless `forget` is set.
    pub fn delete(
        &self,
        name: &TenantName,
        credentials: &Credentials,
        forget: bool,
    ) -> ControllerResult<()> {
        let lock = self.store.lock_tenant(name)?;
        let tenant = self
            .store
            .read_tenant(name)?
            .ok_or_else(|| ControllerError::NotExists(format!("tenant '{name}'")))?;
        let applications = self.store.read_applications_of(name)?;
        if !applications.is_empty() {
            let ids: Vec<String> = applications.iter().map(|a| a.id().to_string()).collect();
            return Err(ControllerError::IllegalArgument(format!(
                "could not delete tenant '{name}': it has applications {}",
                ids.join(", ")
            )));
        }
        if tenant.is_deleted() && !forget {
            return Err(ControllerError::NotExists(format!("tenant '{name}', already deleted")));
        }
        if !tenant.is_deleted() {
            self.access_control.delete_tenant(name, credentials)?;
        }

        if forget {
            self.store.remove_tenant(&lock)?;
        } else {
            let deleted = Tenant::Deleted(DeletedTenant {
                name: name.clone(),
                created_at: tenant.created_at(),
                deleted_at: self.clock.now(),
            });
            self.store.write_tenant(&LockedTenant::of(deleted, &lock))?;
        }
        let notifications = self.store.lock_notifications(name)?;
        self.store.write_notifications(name, &[], &notifications)?;
        info!(tenant = %name, forget, "deleted tenant");
        Ok(())
    }

    /// Record a login. Returns whether the tenant exists.
    pub fn update_last_login(
        &self,
        name: &TenantName,
        level: UserLevel,
        at: u64,
    ) -> ControllerResult<bool> {
        let lock = self.store.lock_tenant(name)?;
        self.lock_if_present::<Tenant>(&lock, |tenant| tenant.with_last_login(level, at))
    }

    // ── Cloud tenant settings ──────────────────────────────────────

    /// Register `key` (PEM) as a developer key belonging to `user`.
    pub fn add_developer_key(
        &self,
        name: &TenantName,
        key: String,
        user: String,
    ) -> ControllerResult<()> {
        let lock = self.store.lock_tenant(name)?;
        self.lock_or_throw::<CloudTenant>(&lock, |tenant| tenant.with_developer_key(key, user))
    }

    pub fn remove_developer_key(&self, name: &TenantName, key: &str) -> ControllerResult<()> {
        let lock = self.store.lock_tenant(name)?;
        self.lock_or_throw::<CloudTenant>(&lock, |tenant| tenant.without_developer_key(key))
    }

    /// Add a secret store, replacing any other with the same name.
    pub fn add_secret_store(&self, name: &TenantName, store: SecretStore) -> ControllerResult<()> {
        let lock = self.store.lock_tenant(name)?;
        let store_name = store.name.clone();
        self.lock_or_throw::<CloudTenant>(&lock, |tenant| tenant.with_secret_store(store))?;
        info!(tenant = %name, store = %store_name, "added secret store");
        Ok(())
    }

    pub fn remove_secret_store(&self, name: &TenantName, store: &str) -> ControllerResult<()> {
        let lock = self.store.lock_tenant(name)?;
        self.lock_or_throw::<CloudTenant>(&lock, |tenant| tenant.without_secret_store(store))
    }

    pub fn set_archive_access(
        &self,
        name: &TenantName,
        access: ArchiveAccess,
    ) -> ControllerResult<()> {
        let lock = self.store.lock_tenant(name)?;
        self.lock_or_throw::<CloudTenant>(&lock, |tenant| tenant.with_archive_access(access))
    }

    /// Read the tenant `lock` guards as a `T`, modify and write it back.
    /// Fails if it doesn't exist or is another kind of tenant.
    pub fn lock_or_throw<'a, T: LockedVariant>(
        &self,
        lock: &'a TenantLock,
        modify: impl FnOnce(T::Locked<'a>) -> T::Locked<'a>,
    ) -> ControllerResult<()> {
        if self.lock_if_present::<T>(lock, modify)? {
            Ok(())
        } else {
            Err(ControllerError::NotExists(format!("tenant '{}'", lock.tenant())))
        }
    }

    /// Like [`lock_or_throw`](Self::lock_or_throw), but a missing tenant is
    /// left alone and reported as `false`.
    pub fn lock_if_present<'a, T: LockedVariant>(
        &self,
        lock: &'a TenantLock,
        modify: impl FnOnce(T::Locked<'a>) -> T::Locked<'a>,
    ) -> ControllerResult<bool> {
        let Some(tenant) = self.store.read_tenant(lock.tenant())? else {
            return Ok(false);
        };
        let locked = T::narrow(LockedTenant::of(tenant, lock))?;
        let modified: LockedTenant<'a> = modify(locked).into();
        self.store.write_tenant(&modified)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::AllowAll;
    use orbit_core::ManualClock;
    use orbit_state::StateError;

    fn controller() -> TenantController {
        TenantController::new(
            StateStore::open_in_memory().unwrap(),
            Arc::new(AllowAll),
            Arc::new(ManualClock::at(1_000)),
        )
    }

    fn name(value: &str) -> TenantName {
        TenantName::new(value).unwrap()
    }

    fn cloud(value: &str) -> TenantSpec {
        TenantSpec::Cloud { name: name(value) }
    }

    fn athenz(value: &str) -> TenantSpec {
        TenantSpec::Athenz {
            name: name(value),
            domain: "acme.domain".to_string(),
            property: "acme-property".to_string(),
            property_id: None,
        }
    }

    fn alice() -> Credentials {
        Credentials::of("alice")
    }

    #[test]
    fn create_rejects_duplicates_aliases_and_deleted_names() {
        let tenants = controller();
        let created = tenants.create(cloud("my-corp"), &alice()).unwrap();
        assert_eq!(created.created_at(), 1_000);

        assert!(matches!(
            tenants.create(cloud("my-corp"), &alice()),
            Err(ControllerError::AlreadyExists(_))
        ));
        assert!(matches!(
            tenants.create(athenz("my_corp"), &alice()),
            Err(ControllerError::AlreadyExists(_))
        ));

        tenants.delete(&name("my-corp"), &alice(), false).unwrap();
        assert!(tenants.get(&name("my-corp")).unwrap().unwrap().is_deleted());
        assert!(tenants.list().unwrap().is_empty());
        let err = tenants.create(cloud("my-corp"), &alice()).unwrap_err();
        assert!(err.to_string().contains("deleted tenant"));

        tenants.delete(&name("my-corp"), &alice(), true).unwrap();
        assert!(tenants.get(&name("my-corp")).unwrap().is_none());
        tenants.create(cloud("my-corp"), &alice()).unwrap();
    }

    #[test]
    fn create_validates_new_names() {
        let tenants = controller();
        assert!(matches!(
            tenants.create(cloud("9lives"), &alice()),
            Err(ControllerError::IllegalArgument(_))
        ));
    }

    #[test]
    fn update_requires_matching_variant() {
        let tenants = controller();
        tenants.create(athenz("acme"), &alice()).unwrap();
        tenants
            .update(
                TenantSpec::Athenz {
                    name: name("acme"),
                    domain: "other.domain".to_string(),
                    property: "p".to_string(),
                    property_id: Some("42".to_string()),
                },
                &alice(),
            )
            .unwrap();
        match tenants.get(&name("acme")).unwrap().unwrap() {
            Tenant::Athenz(tenant) => {
                assert_eq!(tenant.domain, "other.domain");
                assert_eq!(tenant.property_id.as_deref(), Some("42"));
            }
            other => panic!("unexpected tenant {other:?}"),
        }

        let err = tenants.update(cloud("acme"), &alice()).unwrap_err();
        assert!(matches!(err, ControllerError::State(StateError::TenantType { .. })));

        let err = tenants.update(cloud("nobody"), &alice()).unwrap_err();
        assert!(matches!(err, ControllerError::NotExists(_)));
    }

    #[test]
    fn last_login_is_recorded_when_present() {
        let tenants = controller();
        tenants.create(cloud("acme"), &alice()).unwrap();
        assert!(tenants.update_last_login(&name("acme"), UserLevel::Developer, 1_500).unwrap());
        assert!(!tenants.update_last_login(&name("nobody"), UserLevel::Developer, 1_500).unwrap());
        let tenant = tenants.get(&name("acme")).unwrap().unwrap();
        assert_eq!(tenant.last_login().get(UserLevel::Developer), Some(1_500));
    }

    #[test]
    fn delete_of_missing_tenant_fails() {
        let tenants = controller();
        assert!(matches!(
            tenants.delete(&name("ghost"), &alice(), false),
            Err(ControllerError::NotExists(_))
        ));
    }

    #[test]
    fn cloud_settings_apply_only_to_cloud_tenants() {
        let tenants = controller();
        tenants.create(cloud("acme"), &alice()).unwrap();
        tenants.create(athenz("legacy"), &alice()).unwrap();

        tenants
            .add_developer_key(&name("acme"), "pem-1".to_string(), "alice".to_string())
            .unwrap();
        tenants
            .add_developer_key(&name("acme"), "pem-2".to_string(), "bob".to_string())
            .unwrap();
        tenants.remove_developer_key(&name("acme"), "pem-1").unwrap();

        let store = |id: &str, role: &str| SecretStore {
            name: "vault".to_string(),
            aws_id: id.to_string(),
            role: role.to_string(),
        };
        tenants.add_secret_store(&name("acme"), store("123", "reader")).unwrap();
        tenants.add_secret_store(&name("acme"), store("456", "writer")).unwrap();
        tenants
            .set_archive_access(
                &name("acme"),
                ArchiveAccess {
                    aws_role: Some("arn:aws:iam::456:role/archive".to_string()),
                    gcp_member: None,
                },
            )
            .unwrap();

        let Some(Tenant::Cloud(acme)) = tenants.get(&name("acme")).unwrap() else {
            panic!("expected a cloud tenant");
        };
        assert_eq!(acme.developer_keys.len(), 1);
        assert_eq!(acme.developer_keys.get("pem-2").map(String::as_str), Some("bob"));
        assert_eq!(acme.secret_stores, vec![store("456", "writer")]);
        assert!(acme.archive_access.aws_role.is_some());

        tenants.remove_secret_store(&name("acme"), "vault").unwrap();
        let Some(Tenant::Cloud(acme)) = tenants.get(&name("acme")).unwrap() else {
            panic!("expected a cloud tenant");
        };
        assert!(acme.secret_stores.is_empty());

        assert!(matches!(
            tenants.add_developer_key(&name("legacy"), "pem".to_string(), "alice".to_string()),
            Err(ControllerError::State(StateError::TenantType { .. }))
        ));
        assert!(matches!(
            tenants.remove_secret_store(&name("ghost"), "vault"),
            Err(ControllerError::NotExists(_))
        ));
    }
}
