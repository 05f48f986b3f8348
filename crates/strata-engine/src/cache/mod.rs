//! Generation-stamped metadata caches
//!
//! A [`MetadataCacheSlot`] remembers one computed value together with the
//! epoch of its owner at the time the value was published. A read is a hit
//! only while the owner's epoch is unchanged; bumping the epoch (redefinition)
//! silently supersedes the cached value.
//!
//! Publishing is a single compare-and-set. Racing threads may each compute a
//! value; the first publish wins and the others adopt it. No lock is held
//! while computing, so compute functions must be pure.
//!
//! Slots are evictable: [`MetadataCacheSlot::clear`] may be called at any time
//! and the next read recomputes.

mod slot;

pub use slot::{MetadataCacheSlot, Versioned};
