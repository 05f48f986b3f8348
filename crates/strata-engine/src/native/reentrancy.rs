//! Per-thread stack of in-progress native loads and unloads

use std::cell::RefCell;

use super::LibraryOwner;

thread_local! {
    static FRAMES: RefCell<Vec<(LibraryOwner, String)>> = const { RefCell::new(Vec::new()) };
}

/// Owner of an in-progress load of `canonical` on this thread, innermost first
pub(crate) fn active_owner(canonical: &str) -> Option<LibraryOwner> {
    FRAMES.with(|frames| {
        frames
            .borrow()
            .iter()
            .rev()
            .find(|(_, name)| name == canonical)
            .map(|(owner, _)| *owner)
    })
}

/// Current stack depth
pub(crate) fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Pops its frame when dropped, on every exit path
pub(crate) struct ReentrancyFrame {
    depth: usize,
}

impl ReentrancyFrame {
    pub(crate) fn push(owner: LibraryOwner, canonical: &str) -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push((owner, canonical.to_string()));
            frames.len()
        });
        Self { depth }
    }
}

impl Drop for ReentrancyFrame {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            // Frames nest strictly; anything above ours is already gone.
            frames.truncate(self.depth - 1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderId;

    #[test]
    fn test_frames_nest() {
        let owner = LibraryOwner::Loader(LoaderId::new());
        assert_eq!(active_owner("/lib/a.so"), None);
        {
            let _a = ReentrancyFrame::push(owner, "/lib/a.so");
            {
                let _b = ReentrancyFrame::push(LibraryOwner::Global, "/lib/b.so");
                assert_eq!(depth(), 2);
                assert_eq!(active_owner("/lib/b.so"), Some(LibraryOwner::Global));
            }
            assert_eq!(depth(), 1);
            assert_eq!(active_owner("/lib/a.so"), Some(owner));
            assert_eq!(active_owner("/lib/b.so"), None);
        }
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_frames_are_per_thread() {
        let _frame = ReentrancyFrame::push(LibraryOwner::Global, "/lib/a.so");
        let seen = std::thread::spawn(|| active_owner("/lib/a.so")).join().unwrap();
        assert_eq!(seen, None);
    }
}
