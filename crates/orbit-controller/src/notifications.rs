//! Per-tenant notifications.

use std::sync::Arc;

use orbit_core::{Clock, TenantName};
use orbit_state::{
    Notification, NotificationLevel, NotificationSource, NotificationType, StateStore,
};
use tracing::debug;

use crate::error::ControllerResult;

/// Keeps the notification list of each tenant, one notification per source
/// and type.
#[derive(Clone)]
pub struct Notifier {
    store: StateStore,
    clock: Arc<dyn Clock>,
}

impl Notifier {
    pub fn new(store: StateStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Notifications of `source` and everything below it.
    pub fn list(&self, source: &NotificationSource) -> ControllerResult<Vec<Notification>> {
        Ok(self
            .store
            .read_notifications(&source.tenant)?
            .into_iter()
            .filter(|n| source.contains(&n.source))
            .collect())
    }

    /// Replace the notification of this exact source and type.
    pub fn set(
        &self,
        source: NotificationSource,
        kind: NotificationType,
        level: NotificationLevel,
        messages: Vec<String>,
    ) -> ControllerResult<()> {
        let tenant = source.tenant.clone();
        let lock = self.store.lock_notifications(&tenant)?;
        let mut notifications = self.store.read_notifications(&tenant)?;
        notifications.retain(|n| !(n.source == source && n.kind == kind));
        debug!(%tenant, ?kind, ?level, "setting notification");
        notifications.push(Notification {
            at: self.clock.now(),
            kind,
            level,
            source,
            messages,
        });
        self.store.write_notifications(&tenant, &notifications, &lock)?;
        Ok(())
    }

    /// Remove the notification of this exact source and type, if any.
    pub fn remove(&self, source: &NotificationSource, kind: NotificationType) -> ControllerResult<()> {
        self.remove_if(&source.tenant, |n| &n.source == source && n.kind == kind)
    }

    /// Remove every notification of `source` and its sub-sources.
    pub fn remove_all(&self, source: &NotificationSource) -> ControllerResult<()> {
        self.remove_if(&source.tenant, |n| source.contains(&n.source))
    }

    pub fn remove_if(
        &self,
        tenant: &TenantName,
        predicate: impl Fn(&Notification) -> bool,
    ) -> ControllerResult<()> {
        let lock = self.store.lock_notifications(tenant)?;
        let mut notifications = self.store.read_notifications(tenant)?;
        let before = notifications.len();
        notifications.retain(|n| !predicate(n));
        if notifications.len() != before {
            debug!(%tenant, removed = before - notifications.len(), "removed notifications");
            self.store.write_notifications(tenant, &notifications, &lock)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_core::{InstanceId, ManualClock, ZoneId};

    fn notifier() -> Notifier {
        Notifier::new(StateStore::open_in_memory().unwrap(), Arc::new(ManualClock::at(100)))
    }

    #[test]
    fn set_replaces_same_source_and_type() {
        let notifier = notifier();
        let instance = InstanceId::from_parts("acme", "search", "default").unwrap();
        let source = NotificationSource::from_deployment(&instance, ZoneId::prod("us-east").unwrap());
        let warn = |m: &str| {
            notifier.set(
                source.clone(),
                NotificationType::ApplicationPackage,
                NotificationLevel::Warning,
                vec![m.to_string()],
            )
        };
        warn("old").unwrap();
        warn("new").unwrap();

        let listed = notifier
            .list(&NotificationSource::from_application(&instance.application_id()))
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].messages, vec!["new".to_string()]);
        assert_eq!(listed[0].at, 100);

        notifier.remove(&source, NotificationType::Deployment).unwrap();
        assert_eq!(notifier.list(&source).unwrap().len(), 1);
        notifier.remove(&source, NotificationType::ApplicationPackage).unwrap();
        assert!(notifier.list(&source).unwrap().is_empty());
    }

    #[test]
    fn remove_all_covers_sub_sources() {
        let notifier = notifier();
        let search = InstanceId::from_parts("acme", "search", "default").unwrap();
        let feed = InstanceId::from_parts("acme", "feed", "default").unwrap();
        for (instance, zone) in [(&search, "us-east"), (&search, "eu-west"), (&feed, "us-east")] {
            notifier
                .set(
                    NotificationSource::from_deployment(instance, ZoneId::prod(zone).unwrap()),
                    NotificationType::Deployment,
                    NotificationLevel::Error,
                    vec!["failed".to_string()],
                )
                .unwrap();
        }

        notifier
            .remove_all(&NotificationSource::from_instance(&search))
            .unwrap();
        let left = notifier
            .list(&NotificationSource::from_tenant(search.tenant.clone()))
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].source.application, Some(feed.application.clone()));
    }
}
