//! Native library ownership
//!
//! Every canonical library identity is owned by exactly one
//! [`LibraryOwner`]: a loader or the global sentinel. The
//! [`NativeLibraryRegistry`] keeps the owner tables and a per-thread
//! reentrancy stack so that a library whose initialization requests itself
//! (or a sibling, under the same owner) completes without reloading.
//!
//! Table critical sections are short; no table lock is held while the
//! [`NativeHost`](strata_sdk::NativeHost) runs.

mod dylib;
mod reentrancy;
mod registry;

pub use dylib::DylibHost;
pub use registry::{LibraryOwner, NativeLibraryHandle, NativeLibraryRegistry};
