//! Loader and the delegation protocol

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_sdk::{LoadError, LoadResult, SecurityContext};

use super::lock::{new_lock, CircularityGuard, LockTable, LoadingLock};
use super::{LoaderType, Package, PackageInfo, TypeSource};
use crate::runtime::Runtime;
use crate::types::{package_of, TypeHandle};

/// Unique identifier for a loader
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(u64);

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

impl LoaderId {
    /// Generate a new unique LoaderId
    pub fn new() -> Self {
        LoaderId(NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for LoaderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

/// A delegating loader
pub struct Loader {
    id: LoaderId,
    name: String,
    loader_type: Arc<LoaderType>,
    parent: Option<Arc<Loader>>,
    runtime: Arc<Runtime>,
    source: Arc<dyn TypeSource>,
    /// Every name this loader resolved, defined or adopted from a parent
    resolved: DashMap<String, Arc<TypeHandle>>,
    /// Present iff the loader type was parallel-capable at construction
    name_locks: Option<LockTable>,
    instance_lock: LoadingLock,
    packages: DashMap<String, Arc<Package>>,
}

impl Loader {
    /// Unique identifier
    pub fn id(&self) -> LoaderId {
        self.id
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Implementation type
    pub fn loader_type(&self) -> &Arc<LoaderType> {
        &self.loader_type
    }

    /// Parent loader; `None` for a root loader
    pub fn parent(&self) -> Option<&Arc<Loader>> {
        self.parent.as_ref()
    }

    /// Whether this loader has no parent
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Runtime this loader belongs to
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Whether resolution uses per-name locks
    pub fn is_parallel_capable(&self) -> bool {
        self.name_locks.is_some()
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// Lock serializing resolution of `name`.
    ///
    /// Parallel-capable loaders hand out one lock per name; other loaders
    /// return their single instance lock for every name.
    pub fn loading_lock(&self, name: &str) -> LoadingLock {
        match &self.name_locks {
            Some(table) => table.lock_for(name),
            None => Arc::clone(&self.instance_lock),
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Handle already resolved by this loader, without materializing
    pub fn find_loaded(&self, name: &str) -> Option<Arc<TypeHandle>> {
        self.resolved.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Handle already resolved by this loader or any ancestor
    pub fn find_in_chain(&self, name: &str) -> Option<Arc<TypeHandle>> {
        let mut current = Some(self);
        while let Some(loader) = current {
            if let Some(handle) = loader.find_loaded(name) {
                return Some(handle);
            }
            current = loader.parent.as_deref();
        }
        None
    }

    /// Names resolved by this loader, sorted
    pub fn resolved_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resolved.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of resolved names
    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolve `name` through the parent chain, then the local source
    pub fn resolve(self: &Arc<Self>, name: &str) -> LoadResult<Arc<TypeHandle>> {
        self.resolve_with(name, false)
    }

    /// Resolve `name` and link the result
    pub fn resolve_and_link(self: &Arc<Self>, name: &str) -> LoadResult<Arc<TypeHandle>> {
        self.resolve_with(name, true)
    }

    fn resolve_with(self: &Arc<Self>, name: &str, link: bool) -> LoadResult<Arc<TypeHandle>> {
        if !is_valid_name(name) {
            return Err(LoadError::not_found(name));
        }

        let lock = self.loading_lock(name);
        let _guard = lock.lock();

        let handle = match self.find_loaded(name) {
            Some(handle) => {
                tracing::trace!(loader = %self.name, type_name = name, "already resolved");
                handle
            }
            None => self.load_unresolved(name)?,
        };

        if link {
            handle.link()?;
        }
        Ok(handle)
    }

    /// Parent delegation then local materialization, lock held
    fn load_unresolved(self: &Arc<Self>, name: &str) -> LoadResult<Arc<TypeHandle>> {
        let _in_progress = CircularityGuard::enter(self.id, name)?;

        if let Some(parent) = &self.parent {
            match parent.resolve_with(name, false) {
                Ok(handle) => {
                    tracing::trace!(
                        loader = %self.name,
                        parent = %parent.name,
                        type_name = name,
                        "delegated to parent"
                    );
                    return Ok(self.record(name, handle));
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }

        let handle = self
            .source
            .find_type(self, name)?
            .ok_or_else(|| LoadError::not_found(name))?;
        tracing::debug!(loader = %self.name, type_name = name, "materialized locally");
        Ok(self.record(name, handle))
    }

    /// Insert into the resolved table, keeping an entry that is already there
    fn record(&self, name: &str, handle: Arc<TypeHandle>) -> Arc<TypeHandle> {
        Arc::clone(self.resolved.entry(name.to_string()).or_insert(handle).value())
    }

    // ========================================================================
    // Definition
    // ========================================================================

    /// Define a type from `bytes` in this loader.
    ///
    /// `expected_name`, when given, must match the name the bytes declare.
    /// Names under a reserved prefix are only definable by a root loader.
    pub fn define_type(
        self: &Arc<Self>,
        expected_name: Option<&str>,
        bytes: &[u8],
        security: &SecurityContext,
    ) -> LoadResult<Arc<TypeHandle>> {
        if let Some(expected) = expected_name {
            self.check_definable(expected)?;
        }

        let handle = self.runtime.definer().define(bytes, self, security)?;
        let name = handle.name();

        if let Some(expected) = expected_name {
            if name != expected {
                tracing::warn!(loader = %self.name, expected, actual = name, "wrong name in definition");
                return Err(LoadError::linkage(
                    expected,
                    format!("definition declares {name}"),
                ));
            }
        } else {
            self.check_definable(name)?;
        }

        let package = self.package_for(name);
        if !package.admits(security.code_source.as_deref()) {
            tracing::warn!(loader = %self.name, package = package.name(), "sealing violation");
            return Err(LoadError::Security(format!(
                "package {} is sealed",
                package.name()
            )));
        }

        match self.resolved.entry(name.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!(loader = %self.name, type_name = name, "duplicate definition");
                Err(LoadError::duplicate(
                    name,
                    format!("already defined by {}", self.name),
                ))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&handle));
                tracing::debug!(loader = %self.name, type_name = name, "defined");
                Ok(handle)
            }
        }
    }

    fn check_definable(&self, name: &str) -> LoadResult<()> {
        if !is_valid_name(name) {
            return Err(LoadError::not_found(name));
        }
        if !self.is_root() && self.runtime.config().is_reserved(name) {
            tracing::warn!(loader = %self.name, type_name = name, "reserved name");
            return Err(LoadError::Security(format!(
                "{name} is in a reserved package"
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Packages
    // ========================================================================

    /// Define a package in this loader
    pub fn define_package(&self, name: &str, info: PackageInfo) -> LoadResult<Arc<Package>> {
        match self.packages.entry(name.to_string()) {
            Entry::Occupied(_) => Err(LoadError::duplicate(
                name,
                format!("package already defined by {}", self.name),
            )),
            Entry::Vacant(slot) => {
                let package = Arc::new(Package::new(name, self.id, info));
                slot.insert(Arc::clone(&package));
                Ok(package)
            }
        }
    }

    /// Package `name` as seen from this loader, searching ancestors
    pub fn get_package(&self, name: &str) -> Option<Arc<Package>> {
        let mut current = Some(self);
        while let Some(loader) = current {
            if let Some(package) = loader.packages.get(name) {
                return Some(Arc::clone(package.value()));
            }
            current = loader.parent.as_deref();
        }
        None
    }

    /// Packages defined by this loader, sorted by name
    pub fn packages(&self) -> Vec<Arc<Package>> {
        let mut packages: Vec<_> = self.packages.iter().map(|e| Arc::clone(e.value())).collect();
        packages.sort_by(|a, b| a.name().cmp(b.name()));
        packages
    }

    /// Package of `name`, defined on first use
    fn package_for(&self, name: &str) -> Arc<Package> {
        let package_name = package_of(name);
        let entry = self
            .packages
            .entry(package_name.to_string())
            .or_insert_with(|| {
                Arc::new(Package::new(package_name, self.id, PackageInfo::default()))
            });
        Arc::clone(entry.value())
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.loader_type.name())
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("parallel", &self.is_parallel_capable())
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

/// Names are dot-separated and contain no `/` or whitespace
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
        && !name.chars().any(|c| c == '/' || c.is_whitespace())
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Loader`]
pub struct LoaderBuilder {
    name: String,
    loader_type: Arc<LoaderType>,
    parent: Option<Arc<Loader>>,
    source: Option<Arc<dyn TypeSource>>,
}

impl LoaderBuilder {
    /// Start a loader of `loader_type`
    pub fn new(name: &str, loader_type: &Arc<LoaderType>) -> Self {
        Self {
            name: name.to_string(),
            loader_type: Arc::clone(loader_type),
            parent: None,
            source: None,
        }
    }

    /// Delegate to `parent` before materializing locally
    pub fn parent(mut self, parent: &Arc<Loader>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    /// Local type source; defaults to [`EmptySource`](super::EmptySource)
    pub fn source<S: TypeSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Create the loader.
    ///
    /// Lock granularity is fixed here from the runtime's capability registry.
    pub fn build(self, runtime: &Arc<Runtime>) -> Arc<Loader> {
        let capable = runtime.capabilities().is_capable(&self.loader_type);
        tracing::debug!(
            loader = %self.name,
            loader_type = self.loader_type.name(),
            parallel = capable,
            "loader created"
        );
        Arc::new(Loader {
            id: LoaderId::new(),
            name: self.name,
            loader_type: self.loader_type,
            parent: self.parent,
            runtime: Arc::clone(runtime),
            source: self.source.unwrap_or_else(|| Arc::new(super::EmptySource)),
            resolved: DashMap::new(),
            name_locks: capable.then(LockTable::new),
            instance_lock: new_lock(),
            packages: DashMap::new(),
        })
    }
}
