//! Delegating loaders
//!
//! A [`Loader`] resolves names to [`TypeHandle`](crate::TypeHandle)s:
//!
//! 1. acquire the loading lock for the name (a per-name lock when the
//!    loader's type is registered as parallel-capable, otherwise one lock for
//!    the whole loader)
//! 2. return an already resolved handle
//! 3. ask the parent chain
//! 4. fall back to the loader's own [`TypeSource`]
//! 5. optionally link the result
//!
//! The lock is scoped, so it is released on every exit path. Loading locks
//! are reentrant: a source may resolve other names (supertypes, peers)
//! while materializing.
//!
//! ## Capability
//!
//! Lock granularity is decided once, at construction, by the
//! [`ParallelCapabilityRegistry`]. A loader type can only register when its
//! supertype already has, so no inheritance chain mixes coarse and
//! fine-grained locking.

mod capability;
mod define;
#[allow(clippy::module_inception)]
mod loader;
mod lock;
mod package;
mod source;

pub use capability::{LoaderType, LoaderTypeId, ParallelCapabilityRegistry};
pub use define::{ImageDefiner, TypeDefiner};
pub use loader::{Loader, LoaderBuilder, LoaderId};
pub use lock::LoadingLock;
pub use package::{Package, PackageInfo};
pub use source::{EmptySource, ImageSource, TypeSource};
