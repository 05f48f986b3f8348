//! Optimistically published cache cell

use arc_swap::ArcSwapOption;
use crossbeam::utils::Backoff;
use std::fmt;
use std::sync::Arc;

/// Something whose cached metadata is invalidated by bumping an epoch
pub trait Versioned {
    /// Current epoch. Must never decrease.
    fn epoch(&self) -> u64;
}

/// A published value and the owner epoch it was computed for
struct Stamped<T> {
    epoch: u64,
    value: Arc<T>,
}

/// Lock-free, epoch-checked cache cell
pub struct MetadataCacheSlot<T> {
    cell: ArcSwapOption<Stamped<T>>,
}

impl<T> MetadataCacheSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            cell: ArcSwapOption::new(None),
        }
    }

    /// Return the cached value if it was published for `owner`'s current epoch
    pub fn get<O: Versioned + ?Sized>(&self, owner: &O) -> Option<Arc<T>> {
        let epoch = owner.epoch();
        let guard = self.cell.load();
        match &*guard {
            Some(stamped) if stamped.epoch == epoch => Some(Arc::clone(&stamped.value)),
            _ => None,
        }
    }

    /// Return the cached value for `owner`'s current epoch, computing and
    /// publishing a fresh one on a miss.
    ///
    /// `compute` may run more than once under contention (and again after a
    /// concurrent epoch change); errors are returned as-is and never cached.
    pub fn get_or_compute<O, E, F>(&self, owner: &O, mut compute: F) -> Result<Arc<T>, E>
    where
        O: Versioned + ?Sized,
        F: FnMut() -> Result<T, E>,
    {
        let backoff = Backoff::new();
        loop {
            let epoch = owner.epoch();
            let observed = self.cell.load_full();
            if let Some(stamped) = &observed {
                if stamped.epoch == epoch {
                    return Ok(Arc::clone(&stamped.value));
                }
            }

            let value = Arc::new(compute()?);
            let fresh = Arc::new(Stamped {
                epoch,
                value: Arc::clone(&value),
            });

            let previous = self.cell.compare_and_swap(&observed, Some(fresh));
            if same_cell(&previous, &observed) {
                // Published; only hand it out if the owner did not move on meanwhile.
                if owner.epoch() == epoch {
                    return Ok(value);
                }
            } else if let Some(winner) = &*previous {
                if winner.epoch == owner.epoch() {
                    return Ok(Arc::clone(&winner.value));
                }
            }

            backoff.spin();
        }
    }

    /// Drop the cached value. The next read recomputes.
    pub fn clear(&self) {
        self.cell.store(None);
    }

    /// Whether a value is published for `owner`'s current epoch
    pub fn is_current<O: Versioned + ?Sized>(&self, owner: &O) -> bool {
        self.get(owner).is_some()
    }
}

fn same_cell<S>(current: &Option<Arc<S>>, observed: &Option<Arc<S>>) -> bool {
    match (current, observed) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl<T> Default for MetadataCacheSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MetadataCacheSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.cell.load();
        f.debug_struct("MetadataCacheSlot")
            .field("epoch", &guard.as_ref().map(|stamped| stamped.epoch))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::thread;

    struct Owner(AtomicU64);

    impl Owner {
        fn new() -> Self {
            Owner(AtomicU64::new(0))
        }

        fn bump(&self) {
            self.0.fetch_add(1, Ordering::Release);
        }
    }

    impl Versioned for Owner {
        fn epoch(&self) -> u64 {
            self.0.load(Ordering::Acquire)
        }
    }

    #[test]
    fn test_empty_slot_misses() {
        let owner = Owner::new();
        let slot: MetadataCacheSlot<u32> = MetadataCacheSlot::new();
        assert!(slot.get(&owner).is_none());
        assert!(!slot.is_current(&owner));
    }

    #[test]
    fn test_compute_once_then_hit() {
        let owner = Owner::new();
        let slot = MetadataCacheSlot::new();
        let calls = AtomicUsize::new(0);

        let compute = || -> Result<String, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("members".to_string())
        };

        let first = slot.get_or_compute(&owner, compute).unwrap();
        let second = slot.get_or_compute(&owner, compute).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_epoch_bump_recomputes() {
        let owner = Owner::new();
        let slot = MetadataCacheSlot::new();
        let calls = AtomicUsize::new(0);

        let compute = || -> Result<usize, ()> { Ok(calls.fetch_add(1, Ordering::SeqCst)) };

        assert_eq!(*slot.get_or_compute(&owner, compute).unwrap(), 0);
        owner.bump();
        assert!(slot.get(&owner).is_none());
        assert_eq!(*slot.get_or_compute(&owner, compute).unwrap(), 1);
        assert_eq!(*slot.get_or_compute(&owner, compute).unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let owner = Owner::new();
        let slot: MetadataCacheSlot<u8> = MetadataCacheSlot::new();

        let err = slot.get_or_compute(&owner, || Err::<u8, _>("bad blob"));
        assert_eq!(err.unwrap_err(), "bad blob");
        assert!(slot.get(&owner).is_none());

        let ok = slot.get_or_compute(&owner, || Ok::<_, &str>(7)).unwrap();
        assert_eq!(*ok, 7);
    }

    #[test]
    fn test_clear_forces_recompute() {
        let owner = Owner::new();
        let slot = MetadataCacheSlot::new();
        let calls = AtomicUsize::new(0);
        let compute = || -> Result<(), ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        slot.get_or_compute(&owner, compute).unwrap();
        slot.clear();
        assert!(!slot.is_current(&owner));
        slot.get_or_compute(&owner, compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_readers_agree() {
        let owner = Arc::new(Owner::new());
        let slot = Arc::new(MetadataCacheSlot::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let owner = owner.clone();
                let slot = slot.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    slot.get_or_compute(&*owner, || -> Result<Vec<u32>, ()> {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![1, 2, 3])
                    })
                    .unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<Vec<u32>>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results {
            assert_eq!(**result, vec![1, 2, 3]);
        }
        assert!(calls.load(Ordering::SeqCst) >= 1);

        // Whatever won the race is what every later read sees.
        let published = slot.get(&*owner).unwrap();
        let again = slot
            .get_or_compute(&*owner, || -> Result<Vec<u32>, ()> { unreachable!() })
            .unwrap();
        assert!(Arc::ptr_eq(&published, &again));
    }
}
