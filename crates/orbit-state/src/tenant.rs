//! Tenants: the owners of applications.
//!
//! A tenant is either authorized through an external identity domain
//! (`Athenz`), self-managed in the cloud (`Cloud`), or soft-deleted
//! (`Deleted`). Deleted tenants keep their name reserved.

use std::collections::BTreeMap;

use orbit_core::TenantName;
use serde::{Deserialize, Serialize};

/// Role of a user whose logins are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserLevel {
    User,
    Developer,
    Administrator,
}

/// Latest login per user level, in epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LastLoginInfo {
    last_logins: BTreeMap<UserLevel, u64>,
}

impl LastLoginInfo {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, level: UserLevel) -> Option<u64> {
        self.last_logins.get(&level).copied()
    }

    /// Record a login. Earlier times than the recorded one are ignored.
    pub fn with_login(mut self, level: UserLevel, at: u64) -> Self {
        let entry = self.last_logins.entry(level).or_insert(at);
        *entry = (*entry).max(at);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthenzTenant {
    pub name: TenantName,
    pub created_at: u64,
    #[serde(default)]
    pub last_login: LastLoginInfo,
    /// Identity domain the tenant's users are authorized through.
    pub domain: String,
    pub property: String,
    #[serde(default)]
    pub property_id: Option<String>,
}

/// Credentials for a tenant-owned secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretStore {
    pub name: String,
    pub aws_id: String,
    pub role: String,
}

/// Who may read the tenant's log archive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveAccess {
    pub aws_role: Option<String>,
    pub gcp_member: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudTenant {
    pub name: TenantName,
    pub created_at: u64,
    #[serde(default)]
    pub last_login: LastLoginInfo,
    #[serde(default)]
    pub creator: Option<String>,
    /// Developer public keys (PEM) and the user each belongs to.
    #[serde(default)]
    pub developer_keys: BTreeMap<String, String>,
    #[serde(default)]
    pub secret_stores: Vec<SecretStore>,
    #[serde(default)]
    pub archive_access: ArchiveAccess,
}

impl CloudTenant {
    pub fn create(name: TenantName, created_at: u64, creator: Option<String>) -> Self {
        Self {
            name,
            created_at,
            last_login: LastLoginInfo::empty(),
            creator,
            developer_keys: BTreeMap::new(),
            secret_stores: Vec::new(),
            archive_access: ArchiveAccess::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedTenant {
    pub name: TenantName,
    pub created_at: u64,
    pub deleted_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tenant {
    Athenz(AthenzTenant),
    Cloud(CloudTenant),
    Deleted(DeletedTenant),
}

impl Tenant {
    pub fn name(&self) -> &TenantName {
        match self {
            Tenant::Athenz(t) => &t.name,
            Tenant::Cloud(t) => &t.name,
            Tenant::Deleted(t) => &t.name,
        }
    }

    pub fn created_at(&self) -> u64 {
        match self {
            Tenant::Athenz(t) => t.created_at,
            Tenant::Cloud(t) => t.created_at,
            Tenant::Deleted(t) => t.created_at,
        }
    }

    /// Deleted tenants report no logins.
    pub fn last_login(&self) -> LastLoginInfo {
        match self {
            Tenant::Athenz(t) => t.last_login.clone(),
            Tenant::Cloud(t) => t.last_login.clone(),
            Tenant::Deleted(_) => LastLoginInfo::empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Tenant::Athenz(_) => "athenz",
            Tenant::Cloud(_) => "cloud",
            Tenant::Deleted(_) => "deleted",
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Tenant::Deleted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_json_is_tagged() {
        let tenant = Tenant::Cloud(CloudTenant::create(TenantName::new("acme").unwrap(), 5, None));
        let json = serde_json::to_value(&tenant).unwrap();
        assert_eq!(json["type"], "cloud");
        assert_eq!(serde_json::from_value::<Tenant>(json).unwrap(), tenant);
    }

    #[test]
    fn last_login_only_moves_forward() {
        let info = LastLoginInfo::empty()
            .with_login(UserLevel::User, 10)
            .with_login(UserLevel::User, 5)
            .with_login(UserLevel::Developer, 7);
        assert_eq!(info.get(UserLevel::User), Some(10));
        assert_eq!(info.get(UserLevel::Developer), Some(7));
        assert_eq!(info.get(UserLevel::Administrator), None);
    }
}
