//! Type handles
//!
//! A [`TypeHandle`] is the engine's view of one defined type: its identity,
//! defining loader, supertypes, raw metadata blobs and the two lazily
//! populated metadata caches. Handles are created by a
//! [`TypeDefiner`](crate::TypeDefiner) and shared as `Arc<TypeHandle>`.

mod handle;

pub use handle::{RawMetadata, TypeHandle, TypeId, TypeSpec};
pub(crate) use handle::package_of;
