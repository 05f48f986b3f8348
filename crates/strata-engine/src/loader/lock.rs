//! Loading locks and the circularity guard

use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::sync::Arc;
use strata_sdk::{LoadError, LoadResult};

use super::LoaderId;

/// Lock serializing the resolution of one name (or of a whole loader)
pub type LoadingLock = Arc<ReentrantMutex<()>>;

pub(crate) fn new_lock() -> LoadingLock {
    Arc::new(ReentrantMutex::new(()))
}

/// Per-name lock table of a parallel-capable loader.
///
/// Entries are inserted on first use and never removed.
#[derive(Default)]
pub(crate) struct LockTable {
    locks: DashMap<String, LoadingLock>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fetch the lock for `name`, inserting one if absent
    pub(crate) fn lock_for(&self, name: &str) -> LoadingLock {
        if let Some(lock) = self.locks.get(name) {
            return Arc::clone(lock.value());
        }
        // Two racing inserters both end up with the entry that won.
        Arc::clone(self.locks.entry(name.to_string()).or_insert_with(new_lock).value())
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

thread_local! {
    static IN_PROGRESS: RefCell<Vec<(LoaderId, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks `(loader, name)` as materializing on the current thread.
///
/// Loading locks are reentrant, so a supertype graph that loops back to a
/// name being materialized would otherwise recurse on the same thread.
pub(crate) struct CircularityGuard {
    loader: LoaderId,
    name: String,
}

impl CircularityGuard {
    pub(crate) fn enter(loader: LoaderId, name: &str) -> LoadResult<Self> {
        IN_PROGRESS.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(id, n)| *id == loader && n == name) {
                return Err(LoadError::linkage(name, "circular resolution"));
            }
            stack.push((loader, name.to_string()));
            Ok(Self {
                loader,
                name: name.to_string(),
            })
        })
    }
}

impl Drop for CircularityGuard {
    fn drop(&mut self) {
        IN_PROGRESS.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack
                .iter()
                .rposition(|(id, n)| *id == self.loader && *n == self.name)
            {
                stack.remove(pos);
            }
        });
    }
}
