//! Per-instance locks.
//!
//! Handlers that read an instance's state, change it and write it back hold
//! that instance's lock across the whole sequence. Locks of different
//! instances never contend, so a slow remote call only delays events for
//! its own card.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::card::CardInstanceId;

#[derive(Debug, Default)]
pub struct InstanceLocks {
    locks: DashMap<CardInstanceId, Arc<Mutex<()>>>,
}

/// Held lock of one instance; released on drop.
pub struct InstanceGuard<'a> {
    locks: &'a InstanceLocks,
    id: CardInstanceId,
    guard: OwnedMutexGuard<()>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: &CardInstanceId) -> InstanceGuard<'_> {
        let mutex = Arc::clone(&self.locks.entry(id.clone()).or_default());
        InstanceGuard {
            locks: self,
            id: id.clone(),
            guard: mutex.lock_owned().await,
        }
    }

    /// Instances whose lock is currently held or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        let held = OwnedMutexGuard::mutex(&self.guard);
        // Only the map and this guard refer to the mutex: nobody is waiting.
        self.locks
            .locks
            .remove_if(&self.id, |_, m| Arc::ptr_eq(m, held) && Arc::strong_count(m) == 2);
    }
}
