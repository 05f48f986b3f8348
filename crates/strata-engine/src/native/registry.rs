//! Native library registry

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_sdk::{LoadError, LoadResult, NativeHost};

use super::reentrancy::{self, ReentrancyFrame};
use crate::config::NativeConfig;
use crate::loader::LoaderId;

/// Owner of a native library
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LibraryOwner {
    /// Process-wide libraries not tied to any loader
    Global,
    /// Libraries requested by types defined in a loader
    Loader(LoaderId),
}

impl fmt::Display for LibraryOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryOwner::Global => write!(f, "global"),
            LibraryOwner::Loader(id) => write!(f, "{}", id),
        }
    }
}

/// One canonical library under one owner
pub struct NativeLibraryHandle {
    name: String,
    owner: LibraryOwner,
    loaded: AtomicBool,
    /// Completed once the host load succeeded
    once: OnceCell<()>,
}

impl NativeLibraryHandle {
    fn new(name: &str, owner: LibraryOwner) -> Self {
        Self {
            name: name.to_string(),
            owner,
            loaded: AtomicBool::new(false),
            once: OnceCell::new(),
        }
    }

    /// Canonical identity
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning loader or the global sentinel
    pub fn owner(&self) -> LibraryOwner {
        self.owner
    }

    /// Whether the library is registered as loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

impl fmt::Debug for NativeLibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibraryHandle")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[derive(Default)]
struct Tables {
    /// Loaded libraries per owner
    by_owner: FxHashMap<LibraryOwner, FxHashMap<String, Arc<NativeLibraryHandle>>>,
    /// Global set: canonical identity to owner of every loaded library
    owners: FxHashMap<String, LibraryOwner>,
    /// Libraries whose host load is in flight
    pending: FxHashMap<String, Arc<NativeLibraryHandle>>,
}

/// Why a host load produced no library
enum Failure {
    Declined,
    Error(LoadError),
    /// The claim was released by a failed attempt before this one ran
    Stale,
}

/// Per-owner and global native library tables
pub struct NativeLibraryRegistry {
    host: Arc<dyn NativeHost>,
    config: NativeConfig,
    tables: Mutex<Tables>,
}

impl NativeLibraryRegistry {
    /// Create a registry loading through `host`
    pub fn new(host: Arc<dyn NativeHost>, config: NativeConfig) -> Self {
        Self {
            host,
            config,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Load the library `canonical` on behalf of `owner`.
    ///
    /// Returns `Ok(true)` once the library is loaded under `owner`, including
    /// when it already was or when this is a reentrant request from a load
    /// of the same library by the same owner further up this thread's stack.
    /// Returns `Ok(false)` when the host declined the library.
    pub fn load(&self, owner: LibraryOwner, canonical: &str) -> LoadResult<bool> {
        loop {
            let handle = {
                let mut tables = self.tables.lock();

                if let Some(existing) = tables.owners.get(canonical) {
                    return if *existing == owner {
                        Ok(true)
                    } else {
                        Err(owned_elsewhere(canonical, *existing, owner))
                    };
                }

                match reentrancy::active_owner(canonical) {
                    Some(active) if active == owner => {
                        tracing::trace!(library = canonical, %owner, "reentrant load");
                        return Ok(true);
                    }
                    Some(active) => return Err(owned_elsewhere(canonical, active, owner)),
                    None => {}
                }

                match tables.pending.get(canonical) {
                    Some(claim) if claim.owner() != owner => {
                        return Err(owned_elsewhere(canonical, claim.owner(), owner));
                    }
                    Some(claim) => Arc::clone(claim),
                    None => {
                        let claim = Arc::new(NativeLibraryHandle::new(canonical, owner));
                        tables.pending.insert(canonical.to_string(), Arc::clone(&claim));
                        claim
                    }
                }
            };

            let _frame = ReentrancyFrame::push(owner, canonical);
            // A same-owner load on another thread waits here for the first one.
            // The claim is committed or released before the cell settles, so a
            // waiter that runs the initializer next sees the released claim.
            let outcome = handle.once.get_or_try_init(|| {
                if !self.is_pending(&handle) {
                    return Err(Failure::Stale);
                }
                let loaded = match self.host.load(canonical) {
                    Ok(true) => self.commit(&handle).map_err(Failure::Error),
                    Ok(false) => Err(Failure::Declined),
                    Err(err) => Err(Failure::Error(err)),
                };
                if loaded.is_err() {
                    self.release(&handle);
                }
                loaded
            });

            match outcome {
                Ok(()) => return Ok(true),
                Err(Failure::Stale) => {
                    tracing::trace!(library = canonical, %owner, "claim released, retrying");
                }
                Err(Failure::Declined) => {
                    tracing::debug!(library = canonical, %owner, "host declined library");
                    return Ok(false);
                }
                Err(Failure::Error(err)) => {
                    tracing::warn!(library = canonical, %owner, error = %err, "native load failed");
                    return Err(err);
                }
            }
        }
    }

    /// Whether `handle` is still the in-flight claim for its name
    fn is_pending(&self, handle: &Arc<NativeLibraryHandle>) -> bool {
        self.tables
            .lock()
            .pending
            .get(handle.name())
            .is_some_and(|claim| Arc::ptr_eq(claim, handle))
    }

    /// Register a successful load in the owner table and the global set
    fn commit(&self, handle: &Arc<NativeLibraryHandle>) -> LoadResult<()> {
        let mut tables = self.tables.lock();
        if tables
            .pending
            .get(handle.name())
            .is_some_and(|claim| Arc::ptr_eq(claim, handle))
        {
            tables.pending.remove(handle.name());
        }
        if let Some(existing) = tables.owners.get(handle.name()) {
            return if *existing == handle.owner() {
                Ok(())
            } else {
                Err(owned_elsewhere(handle.name(), *existing, handle.owner()))
            };
        }
        handle.loaded.store(true, Ordering::Release);
        tables
            .owners
            .insert(handle.name().to_string(), handle.owner());
        tables
            .by_owner
            .entry(handle.owner())
            .or_default()
            .insert(handle.name().to_string(), Arc::clone(handle));
        tracing::debug!(library = handle.name(), owner = %handle.owner(), "native library loaded");
        Ok(())
    }

    /// Drop a failed claim so the name is available again
    fn release(&self, handle: &Arc<NativeLibraryHandle>) {
        let mut tables = self.tables.lock();
        if tables
            .pending
            .get(handle.name())
            .is_some_and(|claim| Arc::ptr_eq(claim, handle))
        {
            tables.pending.remove(handle.name());
        }
    }

    /// Load a library by short name.
    ///
    /// The name is mapped to a platform file name and looked up in the
    /// configured search paths. Without search paths the mapped name is
    /// handed to the host as is. Names containing a path separator are
    /// treated as paths.
    pub fn load_library(&self, owner: LibraryOwner, name: &str) -> LoadResult<bool> {
        if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
            return self.load_path(owner, Path::new(name));
        }

        let file_name = self.config.map_library_name(name);
        if self.config.search_paths.is_empty() {
            return self.load(owner, &file_name);
        }

        for dir in &self.config.search_paths {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                return self.load_path(owner, &candidate);
            }
        }
        Err(LoadError::not_found(file_name))
    }

    /// Load the library at `path`, identified by its canonical path
    pub fn load_path(&self, owner: LibraryOwner, path: &Path) -> LoadResult<bool> {
        let canonical = path
            .canonicalize()
            .map_err(|_| LoadError::not_found(path.display().to_string()))?;
        let canonical = canonical.to_str().ok_or_else(|| LoadError::NativeLoad {
            name: canonical.display().to_string(),
            reason: "Invalid UTF-8 in path".to_string(),
        })?;
        self.load(owner, canonical)
    }

    /// Unload `canonical` if `owner` owns it; returns whether it did
    pub fn unload(&self, owner: LibraryOwner, canonical: &str) -> bool {
        let handle = {
            let mut tables = self.tables.lock();
            if tables.owners.get(canonical) != Some(&owner) {
                return false;
            }
            tables.owners.remove(canonical);
            let handle = tables
                .by_owner
                .get_mut(&owner)
                .and_then(|libraries| libraries.remove(canonical));
            if tables.by_owner.get(&owner).is_some_and(|libraries| libraries.is_empty()) {
                tables.by_owner.remove(&owner);
            }
            handle
        };
        if let Some(handle) = handle {
            self.unload_handle(&handle);
        }
        true
    }

    /// Unload every library owned by `owner`; returns how many
    pub fn unload_all(&self, owner: LibraryOwner) -> usize {
        let handles: Vec<_> = {
            let mut tables = self.tables.lock();
            let libraries = tables.by_owner.remove(&owner).unwrap_or_default();
            for name in libraries.keys() {
                tables.owners.remove(name);
            }
            libraries.into_values().collect()
        };
        for handle in &handles {
            self.unload_handle(handle);
        }
        handles.len()
    }

    /// Unload every library of every owner
    pub fn unload_everything(&self) -> usize {
        let handles: Vec<_> = {
            let mut tables = self.tables.lock();
            tables.owners.clear();
            tables
                .by_owner
                .drain()
                .flat_map(|(_, libraries)| libraries.into_values())
                .collect()
        };
        for handle in &handles {
            self.unload_handle(handle);
        }
        handles.len()
    }

    fn unload_handle(&self, handle: &NativeLibraryHandle) {
        let _frame = ReentrancyFrame::push(handle.owner(), handle.name());
        handle.loaded.store(false, Ordering::Release);
        self.host.unload(handle.name());
        tracing::debug!(library = handle.name(), owner = %handle.owner(), "native library unloaded");
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Owner of a loaded library
    pub fn owner_of(&self, canonical: &str) -> Option<LibraryOwner> {
        self.tables.lock().owners.get(canonical).copied()
    }

    /// Whether `canonical` is loaded under any owner
    pub fn is_loaded(&self, canonical: &str) -> bool {
        self.tables.lock().owners.contains_key(canonical)
    }

    /// Libraries loaded under `owner`, sorted by name
    pub fn libraries(&self, owner: LibraryOwner) -> Vec<Arc<NativeLibraryHandle>> {
        let tables = self.tables.lock();
        let mut libraries: Vec<_> = tables
            .by_owner
            .get(&owner)
            .map(|libraries| libraries.values().cloned().collect())
            .unwrap_or_default();
        libraries.sort_by(|a, b| a.name().cmp(b.name()));
        libraries
    }

    /// Number of loaded libraries across all owners
    pub fn loaded_count(&self) -> usize {
        self.tables.lock().owners.len()
    }

    /// Lookup configuration
    pub fn config(&self) -> &NativeConfig {
        &self.config
    }
}

impl fmt::Debug for NativeLibraryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibraryRegistry")
            .field("loaded", &self.loaded_count())
            .finish()
    }
}

fn owned_elsewhere(canonical: &str, holder: LibraryOwner, requester: LibraryOwner) -> LoadError {
    LoadError::duplicate(
        canonical,
        format!("already loaded by {holder}, requested by {requester}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingHost {
        loads: AtomicUsize,
        unloads: AtomicUsize,
    }

    impl NativeHost for CountingHost {
        fn load(&self, canonical: &str) -> LoadResult<bool> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match canonical {
                "declined" => Ok(false),
                "broken" => Err(LoadError::NativeLoad {
                    name: canonical.to_string(),
                    reason: "bad image".to_string(),
                }),
                _ => Ok(true),
            }
        }

        fn unload(&self, _canonical: &str) {
            self.unloads.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn registry() -> (Arc<CountingHost>, NativeLibraryRegistry) {
        let host = Arc::new(CountingHost::default());
        let registry = NativeLibraryRegistry::new(host.clone(), NativeConfig::default());
        (host, registry)
    }

    #[test]
    fn test_load_once_per_owner() {
        let (host, registry) = registry();
        let owner = LibraryOwner::Loader(LoaderId::new());

        assert!(registry.load(owner, "/lib/gfx.so").unwrap());
        assert!(registry.load(owner, "/lib/gfx.so").unwrap());
        assert_eq!(host.loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.owner_of("/lib/gfx.so"), Some(owner));
        assert!(registry.libraries(owner)[0].is_loaded());
    }

    #[test]
    fn test_cross_owner_rejected() {
        let (_host, registry) = registry();
        let a = LibraryOwner::Loader(LoaderId::new());
        let b = LibraryOwner::Loader(LoaderId::new());

        registry.load(a, "/lib/gfx.so").unwrap();
        assert!(matches!(
            registry.load(b, "/lib/gfx.so"),
            Err(LoadError::DuplicateDefinition { .. })
        ));
        assert!(matches!(
            registry.load(LibraryOwner::Global, "/lib/gfx.so"),
            Err(LoadError::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn test_failures_release_claim() {
        let (host, registry) = registry();
        let owner = LibraryOwner::Global;

        assert!(!registry.load(owner, "declined").unwrap());
        assert!(matches!(
            registry.load(owner, "broken"),
            Err(LoadError::NativeLoad { .. })
        ));
        assert!(!registry.is_loaded("declined"));

        // A different owner may claim it afterwards
        let other = LibraryOwner::Loader(LoaderId::new());
        assert!(!registry.load(other, "declined").unwrap());
        assert_eq!(host.loads.load(Ordering::SeqCst), 3);
        assert_eq!(reentrancy::depth(), 0);
    }

    #[test]
    fn test_commit_rejects_foreign_owner() {
        let (_host, registry) = registry();
        let a = LibraryOwner::Loader(LoaderId::new());
        let b = LibraryOwner::Loader(LoaderId::new());
        registry.load(a, "/lib/gfx.so").unwrap();

        let stray = Arc::new(NativeLibraryHandle::new("/lib/gfx.so", b));
        assert!(matches!(
            registry.commit(&stray),
            Err(LoadError::DuplicateDefinition { .. })
        ));
        assert!(!stray.is_loaded());
        assert_eq!(registry.owner_of("/lib/gfx.so"), Some(a));
        assert!(registry.libraries(b).is_empty());

        let again = Arc::new(NativeLibraryHandle::new("/lib/gfx.so", a));
        registry.commit(&again).unwrap();
        assert_eq!(registry.libraries(a).len(), 1);
    }

    #[test]
    fn test_unload() {
        let (host, registry) = registry();
        let a = LibraryOwner::Loader(LoaderId::new());
        let b = LibraryOwner::Loader(LoaderId::new());

        registry.load(a, "/lib/one.so").unwrap();
        registry.load(a, "/lib/two.so").unwrap();
        registry.load(b, "/lib/three.so").unwrap();

        assert!(!registry.unload(b, "/lib/one.so"));
        assert!(registry.unload(a, "/lib/one.so"));
        assert!(!registry.is_loaded("/lib/one.so"));

        // Freed identities can move to another owner
        registry.load(b, "/lib/one.so").unwrap();

        assert_eq!(registry.unload_all(a), 1);
        assert_eq!(registry.unload_everything(), 2);
        assert_eq!(registry.loaded_count(), 0);
        assert_eq!(host.unloads.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_load_library_maps_name() {
        let (_host, registry) = registry();
        let expected = NativeConfig::default().map_library_name("gfx");
        registry.load_library(LibraryOwner::Global, "gfx").unwrap();
        assert!(registry.is_loaded(&expected));
    }

    #[test]
    fn test_load_library_searches_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = NativeConfig {
            search_paths: vec![dir.path().join("missing"), dir.path().to_path_buf()],
            library_prefix: "lib".to_string(),
            library_suffix: ".so".to_string(),
        };
        std::fs::write(dir.path().join("libgfx.so"), b"").unwrap();
        let registry = NativeLibraryRegistry::new(Arc::new(CountingHost::default()), config);

        registry.load_library(LibraryOwner::Global, "gfx").unwrap();
        let canonical = dir.path().join("libgfx.so").canonicalize().unwrap();
        assert!(registry.is_loaded(canonical.to_str().unwrap()));

        assert!(registry
            .load_library(LibraryOwner::Global, "audio")
            .unwrap_err()
            .is_not_found());
    }
}
