//! DNS changes, queued durably and dispatched to the name service.
//!
//! Routing code never talks to DNS directly. It enqueues requests through a
//! [`NameServiceForwarder`]; a [`NameServiceDispatcher`] drains the queue into
//! the [`NameService`] in the background.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use orbit_core::ApplicationId;
use orbit_state::{
    NameServiceRequest, Priority, QueuedRequest, Record, RecordType, StateStore,
};
use tracing::{debug, warn};

use crate::error::{RoutingError, RoutingResult};

// ── Name service ───────────────────────────────────────────────────

/// An authoritative DNS service.
pub trait NameService: Send + Sync {
    fn create_record(&self, record: &Record) -> RoutingResult<()>;

    /// Remove records of a type and name, only those with `data` if given.
    fn remove_records(&self, record_type: RecordType, name: &str, data: Option<&str>) -> RoutingResult<()>;

    fn find_records(&self, record_type: RecordType, name: &str) -> Vec<Record>;
}

/// In-memory name service for tests and single-node setups.
#[derive(Debug, Default)]
pub struct MemoryNameService {
    records: RwLock<BTreeSet<Record>>,
}

impl MemoryNameService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        self.records
            .read()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn poisoned() -> RoutingError {
        RoutingError::NameService("record set lock poisoned".to_string())
    }
}

impl NameService for MemoryNameService {
    fn create_record(&self, record: &Record) -> RoutingResult<()> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        if record.record_type == RecordType::Cname {
            records.retain(|r| !(r.record_type == RecordType::Cname && r.name == record.name));
        }
        records.insert(record.clone());
        Ok(())
    }

    fn remove_records(&self, record_type: RecordType, name: &str, data: Option<&str>) -> RoutingResult<()> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        records.retain(|r| {
            !(r.record_type == record_type
                && r.name == name
                && data.is_none_or(|data| r.data == data))
        });
        Ok(())
    }

    fn find_records(&self, record_type: RecordType, name: &str) -> Vec<Record> {
        self.records
            .read()
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.record_type == record_type && r.name == name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── Forwarding ─────────────────────────────────────────────────────

/// Accepts DNS changes on behalf of the name service.
pub trait NameServiceForwarder: Send + Sync {
    fn create_record(
        &self,
        record: Record,
        priority: Priority,
        owner: Option<&ApplicationId>,
    ) -> RoutingResult<()>;

    fn remove_records(
        &self,
        record_type: RecordType,
        name: &str,
        data: Option<&str>,
        priority: Priority,
        owner: Option<&ApplicationId>,
    ) -> RoutingResult<()>;
}

/// Appends requests to the persisted queue. When the queue is over capacity
/// the oldest requests are dropped.
#[derive(Clone)]
pub struct QueuedNameServiceForwarder {
    store: StateStore,
    capacity: usize,
}

impl QueuedNameServiceForwarder {
    pub fn new(store: StateStore, capacity: usize) -> Self {
        Self { store, capacity }
    }

    fn enqueue(
        &self,
        request: NameServiceRequest,
        priority: Priority,
        owner: Option<&ApplicationId>,
    ) -> RoutingResult<()> {
        let lock = self.store.lock_name_service_queue()?;
        let queue = self.store.read_name_service_queue()?.with(QueuedRequest {
            request,
            priority,
            owner: owner.cloned(),
        });
        let queue = if queue.len() > self.capacity {
            warn!(
                capacity = self.capacity,
                dropped = queue.len() - self.capacity,
                "name service queue over capacity, dropping oldest requests"
            );
            queue.last(self.capacity)
        } else {
            queue
        };
        self.store.write_name_service_queue(&queue, &lock)?;
        Ok(())
    }
}

impl NameServiceForwarder for QueuedNameServiceForwarder {
    fn create_record(
        &self,
        record: Record,
        priority: Priority,
        owner: Option<&ApplicationId>,
    ) -> RoutingResult<()> {
        debug!(name = %record.name, data = %record.data, "queueing record creation");
        self.enqueue(NameServiceRequest::CreateRecord { record }, priority, owner)
    }

    fn remove_records(
        &self,
        record_type: RecordType,
        name: &str,
        data: Option<&str>,
        priority: Priority,
        owner: Option<&ApplicationId>,
    ) -> RoutingResult<()> {
        debug!(name, ?record_type, "queueing record removal");
        let request = NameServiceRequest::RemoveRecords {
            record_type,
            name: name.to_string(),
            data: data.map(str::to_string),
        };
        self.enqueue(request, priority, owner)
    }
}

// ── Dispatch ───────────────────────────────────────────────────────

/// Drains the persisted queue into a name service, in order.
pub struct NameServiceDispatcher {
    store: StateStore,
    name_service: Arc<dyn NameService>,
    batch_size: usize,
}

impl NameServiceDispatcher {
    pub fn new(
        store: StateStore,
        name_service: Arc<dyn NameService>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            name_service,
            batch_size,
        }
    }

    /// Execute up to one batch of queued requests. Stops at the first
    /// failing request, which stays at the head of the queue. Returns the
    /// number of requests executed.
    pub fn dispatch(&self) -> RoutingResult<usize> {
        let lock = self.store.lock_name_service_queue()?;
        let queue = self.store.read_name_service_queue()?;
        let mut executed = 0;
        for queued in queue.requests().iter().take(self.batch_size) {
            if let Err(e) = self.execute(&queued.request) {
                warn!(error = %e, request = ?queued.request, "name service request failed");
                break;
            }
            executed += 1;
        }
        if executed > 0 {
            self.store
                .write_name_service_queue(&queue.without_first(executed), &lock)?;
            debug!(executed, "dispatched name service requests");
        }
        Ok(executed)
    }

    fn execute(&self, request: &NameServiceRequest) -> RoutingResult<()> {
        match request {
            NameServiceRequest::CreateRecord { record } => self.name_service.create_record(record),
            NameServiceRequest::RemoveRecords {
                record_type,
                name,
                data,
            } => self
                .name_service
                .remove_records(*record_type, name, data.as_deref()),
        }
    }
}
