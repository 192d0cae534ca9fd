//! redb table definitions for the Orbit state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

pub(crate) type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Applications keyed by `{tenant}:{application}`.
pub const APPLICATIONS: Table = TableDefinition::new("applications");

/// Tenants, including soft-deleted ones, keyed by `{tenant}`.
pub const TENANTS: Table = TableDefinition::new("tenants");

/// Singleton records keyed by name: version status and certified OS versions.
pub const SYSTEM: Table = TableDefinition::new("system");

/// Job runs keyed by `{tenant}:{application}:{instance}/{job}/{number:010}`.
pub const RUNS: Table = TableDefinition::new("runs");

/// Generated endpoints keyed by `{tenant}:{application}:{instance}/{zone}`.
pub const GENERATED_ENDPOINTS: Table = TableDefinition::new("generated_endpoints");

/// Notifications keyed by `{tenant}`.
pub const NOTIFICATIONS: Table = TableDefinition::new("notifications");

/// Submitted packages keyed by `{tenant}:{application}/{revision:010}`.
pub const PACKAGES: Table = TableDefinition::new("packages");

/// Deployment meta keyed by `{tenant}:{application}:{instance}/{zone}`.
pub const DEPLOYMENT_META: Table = TableDefinition::new("deployment_meta");

pub(crate) const VERSION_STATUS_KEY: &str = "version-status";
pub(crate) const CERTIFIED_OS_VERSIONS_KEY: &str = "certified-os-versions";
pub(crate) const NAME_SERVICE_QUEUE_KEY: &str = "name-service-queue";
