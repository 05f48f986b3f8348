//! Host collaborator traits
//!
//! The engine consumes these as black boxes. Implementations must be
//! `Send + Sync`: any thread may call into them concurrently.

use crate::LoadResult;

// ============================================================================
// Native Library Host
// ============================================================================

/// Host-level native library loader.
///
/// `load` is synchronous and may itself re-enter the engine's native library
/// registry, for instance when a library's initialization routine requests
/// another library (or itself).
pub trait NativeHost: Send + Sync {
    /// Physically load the library identified by `canonical`.
    ///
    /// Returns `Ok(false)` when the host declines the library without a
    /// diagnostic, and an error when loading failed.
    fn load(&self, canonical: &str) -> LoadResult<bool>;

    /// Release a previously loaded library. The default does nothing.
    fn unload(&self, _canonical: &str) {}
}

// ============================================================================
// Access Control
// ============================================================================

/// Which member set a reflective query touches
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MemberAccess {
    /// Public members, including inherited ones
    Public,
    /// Every member declared by the target itself
    Declared,
}

/// Access-control predicate consulted before a reflective result is returned
pub trait AccessPolicy: Send + Sync {
    /// Decide whether `accessor` (a type name, or `None` for host code) may
    /// query `which` members of `target`.
    fn check_member_access(&self, accessor: Option<&str>, target: &str, which: MemberAccess)
        -> bool;
}

/// Policy that allows every query
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check_member_access(&self, _: Option<&str>, _: &str, _: MemberAccess) -> bool {
        true
    }
}

// ============================================================================
// Security Context
// ============================================================================

/// Provenance attached to a type at definition time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    /// Where the type's bytes came from (path, URL, manifest entry)
    pub code_source: Option<String>,
    /// Names of the principals that signed the bytes
    pub signers: Vec<String>,
}

impl SecurityContext {
    /// Context for bytes from a known origin
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            code_source: Some(source.into()),
            signers: Vec::new(),
        }
    }
}
