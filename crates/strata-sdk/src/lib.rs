//! Strata SDK - contracts between the type loader and its host
//!
//! This crate carries the small set of types a host needs to plug into
//! `strata-engine` without depending on its internals:
//!
//! - [`LoadError`] / [`LoadResult`]: the error taxonomy shared by every layer
//! - [`NativeHost`]: the host-level native library loader
//! - [`AccessPolicy`]: the access-control predicate consulted by reflection
//! - [`SecurityContext`]: the provenance attached to every defined type
//!
//! # Example
//!
//! ```ignore
//! use strata_sdk::{LoadResult, NativeHost};
//!
//! struct NoopHost;
//!
//! impl NativeHost for NoopHost {
//!     fn load(&self, canonical: &str) -> LoadResult<bool> {
//!         println!("pretend-loading {canonical}");
//!         Ok(true)
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod error;
mod host;

pub use error::{LoadError, LoadResult};
pub use host::{AccessPolicy, AllowAll, MemberAccess, NativeHost, SecurityContext};
