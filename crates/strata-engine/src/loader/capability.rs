//! Parallel-capability registry

use dashmap::DashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a loader type
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LoaderTypeId(u64);

impl LoaderTypeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A loader implementation type.
///
/// Loader types form a single-inheritance tree rooted at the registry's
/// base type. Capability is granted per type, never per instance.
pub struct LoaderType {
    id: LoaderTypeId,
    name: String,
    supertype: Option<Arc<LoaderType>>,
}

impl LoaderType {
    pub(crate) fn base(name: &str) -> Arc<Self> {
        Arc::new(Self {
            id: LoaderTypeId::new(),
            name: name.to_string(),
            supertype: None,
        })
    }

    /// Declare a new loader type inheriting from `supertype`
    pub fn derive(name: &str, supertype: &Arc<LoaderType>) -> Arc<Self> {
        Arc::new(Self {
            id: LoaderTypeId::new(),
            name: name.to_string(),
            supertype: Some(Arc::clone(supertype)),
        })
    }

    /// Unique identifier
    pub fn id(&self) -> LoaderTypeId {
        self.id
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Supertype (`None` only for a base type)
    pub fn supertype(&self) -> Option<&Arc<LoaderType>> {
        self.supertype.as_ref()
    }
}

impl fmt::Debug for LoaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderType")
            .field("name", &self.name)
            .field("supertype", &self.supertype.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// Set of loader types that use per-name locking.
///
/// Membership only grows. The base type is a permanent member.
pub struct ParallelCapabilityRegistry {
    base: Arc<LoaderType>,
    members: DashSet<LoaderTypeId>,
}

impl ParallelCapabilityRegistry {
    /// Create a registry with a fresh base type
    pub fn new() -> Self {
        let base = LoaderType::base("Loader");
        let members = DashSet::new();
        members.insert(base.id());
        Self { base, members }
    }

    /// The permanent base loader type
    pub fn base_type(&self) -> &Arc<LoaderType> {
        &self.base
    }

    /// Register `loader_type` as parallel-capable.
    ///
    /// Succeeds iff its supertype is already registered. Registering twice
    /// is a successful no-op; a registration is never undone.
    pub fn register(&self, loader_type: &LoaderType) -> bool {
        if self.members.contains(&loader_type.id()) {
            return true;
        }
        match loader_type.supertype() {
            Some(sup) if self.members.contains(&sup.id()) => {
                self.members.insert(loader_type.id());
                tracing::debug!(loader_type = loader_type.name(), "registered as parallel capable");
                true
            }
            _ => false,
        }
    }

    /// Whether `loader_type` is registered
    pub fn is_capable(&self, loader_type: &LoaderType) -> bool {
        self.members.contains(&loader_type.id())
    }

    /// Number of registered types, including the base type
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false: the base type is a member
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Default for ParallelCapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_is_member() {
        let registry = ParallelCapabilityRegistry::new();
        assert!(registry.is_capable(registry.base_type()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_requires_registered_supertype() {
        let registry = ParallelCapabilityRegistry::new();
        let url = LoaderType::derive("UrlLoader", registry.base_type());
        let plugin = LoaderType::derive("PluginLoader", &url);

        // Supertype not yet registered
        assert!(!registry.register(&plugin));
        assert!(!registry.is_capable(&plugin));

        assert!(registry.register(&url));
        assert!(registry.register(&plugin));
        assert!(registry.is_capable(&plugin));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ParallelCapabilityRegistry::new();
        let url = LoaderType::derive("UrlLoader", registry.base_type());
        assert!(registry.register(&url));
        assert!(registry.register(&url));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_foreign_base_never_registers() {
        let registry = ParallelCapabilityRegistry::new();
        let other = ParallelCapabilityRegistry::new();
        let foreign = LoaderType::derive("Foreign", other.base_type());
        assert!(!registry.register(&foreign));
        assert!(!registry.is_capable(other.base_type()));
    }
}
