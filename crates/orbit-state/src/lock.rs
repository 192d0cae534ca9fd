//! Named, re-entrant, per-thread locks with a bounded wait.
//!
//! A lock is identified by a path such as `/applications/acme:search`. The
//! thread holding a path may acquire it again; other threads block until the
//! holder releases every nested guard, or fail with
//! [`StateError::LockTimeout`] once the wait exceeds the registry timeout.
//!
//! Guards are `!Send`: ownership is tracked per thread, so a guard must be
//! dropped on the thread that acquired it. A path's slot is dropped from the
//! registry once nobody holds or waits for it.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use orbit_core::{ApplicationId, TenantName};
use tracing::{debug, warn};

use crate::error::{StateError, StateResult};

#[derive(Debug, Default)]
struct Holder {
    owner: Option<ThreadId>,
    depth: u32,
}

#[derive(Debug, Default)]
struct Slot {
    holder: Mutex<Holder>,
    released: Condvar,
}

impl Slot {
    fn holder(&self) -> MutexGuard<'_, Holder> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Slots = Arc<Mutex<HashMap<String, Arc<Slot>>>>;

fn lock_slots(slots: &Slots) -> MutexGuard<'_, HashMap<String, Arc<Slot>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of named locks.
#[derive(Debug)]
pub struct LockRegistry {
    slots: Slots,
    timeout: Duration,
}

impl LockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the lock at `path`, waiting at most the registry timeout.
    pub fn acquire(&self, path: &str) -> StateResult<Lock> {
        self.acquire_within(path, self.timeout)
    }

    /// Acquire the lock at `path`, waiting at most `timeout`.
    pub fn acquire_within(&self, path: &str, timeout: Duration) -> StateResult<Lock> {
        let slot = Arc::clone(lock_slots(&self.slots).entry(path.to_string()).or_default());

        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut holder = slot.holder();
        loop {
            match holder.owner {
                None => {
                    holder.owner = Some(me);
                    holder.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    holder.depth += 1;
                    break;
                }
                Some(_) => {}
            }
            let now = Instant::now();
            if now >= deadline {
                drop(holder);
                release_slot(&self.slots, path, &slot);
                warn!(%path, ?timeout, "lock wait timed out");
                return Err(StateError::LockTimeout {
                    path: path.to_string(),
                    timeout,
                });
            }
            holder = slot
                .released
                .wait_timeout(holder, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let depth = holder.depth;
        drop(holder);

        debug!(%path, depth, "lock acquired");
        Ok(Lock {
            path: path.to_string(),
            slot,
            slots: Arc::clone(&self.slots),
            _not_send: PhantomData,
        })
    }

    /// Whether some thread currently holds `path`.
    pub fn is_held(&self, path: &str) -> bool {
        lock_slots(&self.slots)
            .get(path)
            .is_some_and(|slot| slot.holder().owner.is_some())
    }

    #[cfg(test)]
    fn tracked_paths(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

/// Forget `path` if `slot`, which the caller no longer holds, is referenced
/// only by the registry and the caller.
fn release_slot(slots: &Slots, path: &str, slot: &Arc<Slot>) {
    let mut slots = lock_slots(slots);
    if Arc::strong_count(slot) == 2 && slot.holder().owner.is_none() {
        slots.remove(path);
    }
}

/// Guard for one acquisition of a named lock. Released on drop.
#[derive(Debug)]
pub struct Lock {
    path: String,
    slot: Arc<Slot>,
    slots: Slots,
    _not_send: PhantomData<*const ()>,
}

impl Lock {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        let mut holder = self.slot.holder();
        holder.depth = holder.depth.saturating_sub(1);
        if holder.depth > 0 {
            return;
        }
        holder.owner = None;
        self.slot.released.notify_one();
        drop(holder);
        release_slot(&self.slots, &self.path, &self.slot);
    }
}

// ── Typed guards ───────────────────────────────────────────────────

/// Guard for the lock of one application.
#[derive(Debug)]
pub struct ApplicationLock {
    id: ApplicationId,
    lock: Lock,
}

impl ApplicationLock {
    pub(crate) fn new(id: ApplicationId, lock: Lock) -> Self {
        Self { id, lock }
    }

    pub fn application(&self) -> &ApplicationId {
        &self.id
    }

    pub fn path(&self) -> &str {
        self.lock.path()
    }
}

/// Guard for the lock of one tenant.
#[derive(Debug)]
pub struct TenantLock {
    name: TenantName,
    lock: Lock,
}

impl TenantLock {
    pub(crate) fn new(name: TenantName, lock: Lock) -> Self {
        Self { name, lock }
    }

    pub fn tenant(&self) -> &TenantName {
        &self.name
    }

    pub fn path(&self) -> &str {
        self.lock.path()
    }
}

/// Guards that carry nothing but the held path.
macro_rules! plain_lock {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name(Lock);

        impl $name {
            pub(crate) fn new(lock: Lock) -> Self {
                Self(lock)
            }

            pub fn path(&self) -> &str {
                self.0.path()
            }
        }
    };
}

plain_lock!(
    /// Guard for the global rotation pool.
    RotationLock
);
plain_lock!(
    /// Guard for the persisted version status.
    VersionStatusLock
);
plain_lock!(
    /// Guard for the certified OS versions.
    OsVersionLock
);
plain_lock!(
    /// Guard for the queued name-service requests.
    NameServiceQueueLock
);
plain_lock!(
    /// Guard for one tenant's notifications.
    NotificationsLock
);
