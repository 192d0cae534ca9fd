//! Periodic background jobs.
//!
//! Maintainers do blocking work against the state store, so each pass runs
//! on the blocking pool. A failed pass is logged and retried on the next
//! tick.

use std::sync::Arc;
use std::time::Duration;

use orbit_routing::NameServiceDispatcher;
use orbit_version::VersionStatusMaintainer;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// One unit of periodic upkeep.
pub trait Maintainer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Run one pass.
    fn maintain(&self) -> anyhow::Result<()>;
}

impl Maintainer for NameServiceDispatcher {
    fn name(&self) -> &'static str {
        "name-service-dispatcher"
    }

    fn maintain(&self) -> anyhow::Result<()> {
        // Drain everything queued so far, one batch at a time.
        loop {
            let executed = self.dispatch()?;
            if executed == 0 {
                return Ok(());
            }
            debug!(executed, "name service batch dispatched");
        }
    }
}

impl Maintainer for VersionStatusMaintainer {
    fn name(&self) -> &'static str {
        "version-status-maintainer"
    }

    fn maintain(&self) -> anyhow::Result<()> {
        let removed = self.remove_obsolete()?;
        if !removed.is_empty() {
            info!(count = removed.len(), "removed obsolete platform versions");
        }
        Ok(())
    }
}

/// Run `maintainer` every `interval` until `shutdown` flips.
pub async fn run(
    maintainer: Arc<dyn Maintainer>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = maintainer.name();
    info!(maintainer = name, interval_secs = interval.as_secs(), "maintainer started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let pass = Arc::clone(&maintainer);
                match tokio::task::spawn_blocking(move || pass.maintain()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(maintainer = name, error = %e, "maintenance pass failed"),
                    Err(e) => error!(maintainer = name, error = %e, "maintenance pass panicked"),
                }
            }
            _ = shutdown.changed() => {
                info!(maintainer = name, "maintainer shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_routing::{MemoryNameService, NameServiceForwarder, QueuedNameServiceForwarder};
    use orbit_state::{Priority, Record, RecordType, StateStore};

    #[tokio::test]
    async fn dispatcher_drains_the_queue_until_shutdown() {
        let store = StateStore::open_in_memory().unwrap();
        let forwarder = QueuedNameServiceForwarder::new(store.clone(), 100);
        for i in 0..5 {
            forwarder
                .create_record(
                    Record::new(RecordType::Cname, format!("app{i}.o.cloud"), "lb.o.cloud"),
                    Priority::Normal,
                    None,
                )
                .unwrap();
        }

        let dns = Arc::new(MemoryNameService::new());
        let dispatcher = NameServiceDispatcher::new(store.clone(), dns.clone(), 2);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            Arc::new(dispatcher),
            Duration::from_millis(10),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(dns.records().len(), 5);
        assert!(store.read_name_service_queue().unwrap().is_empty());
    }

    #[tokio::test]
    async fn version_maintainer_tolerates_an_empty_store() {
        let store = StateStore::open_in_memory().unwrap();
        let maintainer = VersionStatusMaintainer::new(store);
        maintainer.maintain().unwrap();
        assert_eq!(maintainer.name(), "version-status-maintainer");
    }
}
