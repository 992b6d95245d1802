//! Per-owner serialization and cancellation
//!
//! All state-mutating matching operations for one owner go through a single
//! logical writer. The registry hands out one mutex per owner; different
//! owners proceed in parallel, one owner's mutations are strictly serial.
//! This replaces the historical shared mutable session that let an enqueue
//! step race a direct write and strand receipts mid-status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry of per-owner mutexes. Clones share the registry, so every part
/// of a process (API handlers, scheduler, CLI command) serializes on the
/// same lock for a given owner.
#[derive(Clone, Default)]
pub struct OwnerLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one owner, created on first use
    pub fn for_owner(&self, owner: &str) -> OwnerLock {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let lock = map
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        OwnerLock(lock)
    }
}

/// Handle to one owner's mutex
pub struct OwnerLock(Arc<Mutex<()>>);

impl OwnerLock {
    /// Block until this owner's writer slot is free.
    /// A poisoned lock only means a panic elsewhere; the slot itself carries
    /// no data, so it is safe to keep going.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cooperative cancellation signal for long-running batch operations.
/// Checked between items, never mid-item, so cancellation cannot leave a
/// partially-mutated receipt behind.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
