//! StateStore: redb-backed state persistence for Orbit.
//!
//! Provides typed reads and lock-guarded writes over applications, tenants,
//! version status, runs, generated endpoints, notifications, packages and
//! the name-service queue. Values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use orbit_core::{
    ApplicationId, ApplicationPackage, InstanceId, JobId, RevisionId, TenantName, ZoneId,
};
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::Application;
use crate::error::{StateError, StateResult};
use crate::lock::*;
use crate::locked::{LockedApplication, LockedTenant};
use crate::tables::*;
use crate::tenant::Tenant;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    locks: Arc<LockRegistry>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> StateResult<Self> {
        let store = Self {
            db: Arc::new(db),
            locks: Arc::new(LockRegistry::new(DEFAULT_LOCK_TIMEOUT)),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Replace the lock registry with one using `timeout`. Call before
    /// cloning the store or taking any lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.locks = Arc::new(LockRegistry::new(timeout));
        self
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            APPLICATIONS,
            TENANTS,
            SYSTEM,
            RUNS,
            GENERATED_ENDPOINTS,
            NOTIFICATIONS,
            PACKAGES,
            DEPLOYMENT_META,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    // ── Locks ──────────────────────────────────────────────────────

    pub fn lock_tenant(&self, tenant: &TenantName) -> StateResult<TenantLock> {
        let lock = self.locks.acquire(&format!("/tenants/{tenant}"))?;
        Ok(TenantLock::new(tenant.clone(), lock))
    }

    pub fn lock_application(&self, id: &ApplicationId) -> StateResult<ApplicationLock> {
        let lock = self
            .locks
            .acquire(&format!("/applications/{}", id.serialized_form()))?;
        Ok(ApplicationLock::new(id.clone(), lock))
    }

    /// Serializes deployments of one instance to one zone.
    pub fn lock_deployment(&self, instance: &InstanceId, zone: &ZoneId) -> StateResult<Lock> {
        self.locks
            .acquire(&format!("/deployments/{}/{zone}", instance.serialized_form()))
    }

    pub fn lock_rotations(&self) -> StateResult<RotationLock> {
        Ok(RotationLock::new(self.locks.acquire("/rotations")?))
    }

    pub fn lock_version_status(&self) -> StateResult<VersionStatusLock> {
        Ok(VersionStatusLock::new(self.locks.acquire("/version-status")?))
    }

    pub fn lock_os_versions(&self) -> StateResult<OsVersionLock> {
        Ok(OsVersionLock::new(self.locks.acquire("/os-versions")?))
    }

    pub fn lock_name_service_queue(&self) -> StateResult<NameServiceQueueLock> {
        Ok(NameServiceQueueLock::new(
            self.locks.acquire("/name-service-queue")?,
        ))
    }

    pub fn lock_notifications(&self, tenant: &TenantName) -> StateResult<NotificationsLock> {
        Ok(NotificationsLock::new(
            self.locks.acquire(&format!("/notifications/{tenant}"))?,
        ))
    }

    // ── Applications ───────────────────────────────────────────────

    pub fn read_application(&self, id: &ApplicationId) -> StateResult<Option<Application>> {
        self.get(APPLICATIONS, &id.serialized_form())
    }

    pub fn read_applications(&self) -> StateResult<Vec<Application>> {
        self.scan(APPLICATIONS, "")
    }

    pub fn read_applications_of(&self, tenant: &TenantName) -> StateResult<Vec<Application>> {
        self.scan(APPLICATIONS, &format!("{tenant}:"))
    }

    pub fn write_application(&self, application: &LockedApplication<'_>) -> StateResult<()> {
        let key = application.get().id().serialized_form();
        self.put(APPLICATIONS, &key, application.get())?;
        debug!(%key, "application stored");
        Ok(())
    }

    /// Remove the application and its submitted packages.
    pub fn remove_application(&self, lock: &ApplicationLock) -> StateResult<bool> {
        let id = lock.application();
        let existed = self.remove(APPLICATIONS, &id.serialized_form())?;
        self.remove_prefix(PACKAGES, &format!("{}/", id.serialized_form()))?;
        debug!(application = %id, existed, "application removed");
        Ok(existed)
    }

    // ── Tenants ────────────────────────────────────────────────────

    pub fn read_tenant(&self, name: &TenantName) -> StateResult<Option<Tenant>> {
        self.get(TENANTS, name.as_str())
    }

    pub fn read_tenants(&self) -> StateResult<Vec<Tenant>> {
        self.scan(TENANTS, "")
    }

    pub fn write_tenant(&self, tenant: &LockedTenant<'_>) -> StateResult<()> {
        let tenant = tenant.get();
        self.put(TENANTS, tenant.name().as_str(), &tenant)?;
        debug!(tenant = %tenant.name(), kind = tenant.type_name(), "tenant stored");
        Ok(())
    }

    pub fn remove_tenant(&self, lock: &TenantLock) -> StateResult<bool> {
        let existed = self.remove(TENANTS, lock.tenant().as_str())?;
        debug!(tenant = %lock.tenant(), existed, "tenant removed");
        Ok(existed)
    }

    // ── Versions ───────────────────────────────────────────────────

    pub fn read_version_status(&self) -> StateResult<VersionStatus> {
        Ok(self.get(SYSTEM, VERSION_STATUS_KEY)?.unwrap_or_default())
    }

    pub fn write_version_status(
        &self,
        status: &VersionStatus,
        _lock: &VersionStatusLock,
    ) -> StateResult<()> {
        self.put(SYSTEM, VERSION_STATUS_KEY, status)
    }

    pub fn read_certified_os_versions(&self) -> StateResult<Vec<CertifiedOsVersion>> {
        Ok(self.get(SYSTEM, CERTIFIED_OS_VERSIONS_KEY)?.unwrap_or_default())
    }

    pub fn write_certified_os_versions(
        &self,
        versions: &[CertifiedOsVersion],
        _lock: &OsVersionLock,
    ) -> StateResult<()> {
        self.put(SYSTEM, CERTIFIED_OS_VERSIONS_KEY, &versions)
    }

    // ── Runs ───────────────────────────────────────────────────────

    pub fn write_run(&self, run: &Run) -> StateResult<()> {
        self.put(RUNS, &run.id.table_key(), run)
    }

    /// All runs of a job, oldest first.
    pub fn read_runs(&self, job: &JobId) -> StateResult<Vec<Run>> {
        self.scan(RUNS, &format!("{}/", job.table_key()))
    }

    pub fn last_run(&self, job: &JobId) -> StateResult<Option<Run>> {
        Ok(self.read_runs(job)?.pop())
    }

    // ── Generated endpoints ────────────────────────────────────────

    pub fn read_generated_endpoints(
        &self,
        instance: &InstanceId,
        zone: &ZoneId,
    ) -> StateResult<GeneratedEndpoints> {
        Ok(self
            .get(GENERATED_ENDPOINTS, &deployment_key(instance, zone))?
            .unwrap_or_default())
    }

    pub fn write_generated_endpoints(
        &self,
        instance: &InstanceId,
        zone: &ZoneId,
        endpoints: &GeneratedEndpoints,
        _lock: &ApplicationLock,
    ) -> StateResult<()> {
        self.put(GENERATED_ENDPOINTS, &deployment_key(instance, zone), endpoints)
    }

    pub fn remove_generated_endpoints(
        &self,
        instance: &InstanceId,
        zone: &ZoneId,
        _lock: &ApplicationLock,
    ) -> StateResult<bool> {
        self.remove(GENERATED_ENDPOINTS, &deployment_key(instance, zone))
    }

    // ── Notifications ──────────────────────────────────────────────

    pub fn read_notifications(&self, tenant: &TenantName) -> StateResult<Vec<Notification>> {
        Ok(self.get(NOTIFICATIONS, tenant.as_str())?.unwrap_or_default())
    }

    pub fn write_notifications(
        &self,
        tenant: &TenantName,
        notifications: &[Notification],
        _lock: &NotificationsLock,
    ) -> StateResult<()> {
        if notifications.is_empty() {
            self.remove(NOTIFICATIONS, tenant.as_str())?;
            return Ok(());
        }
        self.put(NOTIFICATIONS, tenant.as_str(), &notifications)
    }

    // ── Packages ───────────────────────────────────────────────────

    pub fn write_package(
        &self,
        application: &ApplicationId,
        revision: RevisionId,
        package: &ApplicationPackage,
    ) -> StateResult<()> {
        self.put(PACKAGES, &package_key(application, revision), package)
    }

    pub fn read_package(
        &self,
        application: &ApplicationId,
        revision: RevisionId,
    ) -> StateResult<Option<ApplicationPackage>> {
        self.get(PACKAGES, &package_key(application, revision))
    }

    // ── Deployment meta ────────────────────────────────────────────

    pub fn write_deployment_meta(&self, meta: &DeploymentMeta) -> StateResult<()> {
        self.put(DEPLOYMENT_META, &deployment_key(&meta.instance, &meta.zone), meta)
    }

    pub fn read_deployment_meta(
        &self,
        instance: &InstanceId,
        zone: &ZoneId,
    ) -> StateResult<Option<DeploymentMeta>> {
        self.get(DEPLOYMENT_META, &deployment_key(instance, zone))
    }

    // ── Name-service queue ─────────────────────────────────────────

    pub fn read_name_service_queue(&self) -> StateResult<NameServiceQueue> {
        Ok(self.get(SYSTEM, NAME_SERVICE_QUEUE_KEY)?.unwrap_or_default())
    }

    pub fn write_name_service_queue(
        &self,
        queue: &NameServiceQueue,
        _lock: &NameServiceQueueLock,
    ) -> StateResult<()> {
        self.put(SYSTEM, NAME_SERVICE_QUEUE_KEY, queue)
    }

    // ── Table access ───────────────────────────────────────────────

    fn put<T: Serialize + ?Sized>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let value = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Values whose keys start with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let value =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(value);
            }
        }
        Ok(results)
    }

    fn remove(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    fn remove_prefix(&self, table: Table, prefix: &str) -> StateResult<u32> {
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(table).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(prefix) {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0u32;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            for key in &keys {
                if table.remove(key.as_str()).map_err(map_err!(Write))?.is_some() {
                    count += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(count)
    }
}

fn deployment_key(instance: &InstanceId, zone: &ZoneId) -> String {
    format!("{}/{zone}", instance.serialized_form())
}

fn package_key(application: &ApplicationId, revision: RevisionId) -> String {
    format!("{}/{:010}", application.serialized_form(), revision.number())
}
