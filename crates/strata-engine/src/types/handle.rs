//! Type handle, epochs and linking

use arc_swap::ArcSwap;
use once_cell::sync::OnceCell;
use rustc_hash::FxHashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use strata_sdk::{LoadError, LoadResult, SecurityContext};

use crate::cache::{MetadataCacheSlot, Versioned};
use crate::loader::{Loader, LoaderId};
use crate::metadata::Modifiers;
use crate::native::LibraryOwner;
use crate::reflect::{AnnotationSnapshot, ReflectiveSnapshot};

/// Unique identifier for a type handle
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u64);

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

impl TypeId {
    /// Generate a new unique TypeId
    pub fn new() -> Self {
        TypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TypeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Uninterpreted metadata supplied by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetadata {
    /// Member blob
    pub members: Vec<u8>,
    /// Annotation blob
    pub annotations: Vec<u8>,
    /// Enclosing type name
    pub enclosing: Option<String>,
    /// Native libraries requested when the type is linked
    pub native_libraries: Vec<String>,
}

/// Everything needed to create a type handle
#[derive(Debug, Clone)]
pub struct TypeSpec {
    /// Fully qualified name
    pub name: String,
    /// Type modifiers
    pub modifiers: Modifiers,
    /// Resolved superclass
    pub superclass: Option<Arc<TypeHandle>>,
    /// Resolved direct interfaces, in declaration order
    pub interfaces: Vec<Arc<TypeHandle>>,
    /// Raw metadata blobs
    pub raw: RawMetadata,
    /// Provenance of the defining bytes
    pub security: SecurityContext,
}

/// A defined type
pub struct TypeHandle {
    id: TypeId,
    name: String,
    modifiers: Modifiers,
    loader: Weak<Loader>,
    loader_id: LoaderId,
    superclass: Option<Arc<TypeHandle>>,
    interfaces: Vec<Arc<TypeHandle>>,
    /// Every proper supertype once, in depth-first declaration order
    lineage: Vec<Arc<TypeHandle>>,
    security: SecurityContext,
    /// Bumped by the host on redefinition; never decreases
    epoch: AtomicU64,
    raw: ArcSwap<RawMetadata>,
    reflection: MetadataCacheSlot<ReflectiveSnapshot>,
    annotations: MetadataCacheSlot<AnnotationSnapshot>,
    linked: OnceCell<()>,
}

impl TypeHandle {
    /// Create a handle defined by `loader`
    pub fn new(spec: TypeSpec, loader: &Arc<Loader>) -> Arc<Self> {
        let lineage = flatten_lineage(spec.superclass.as_ref(), &spec.interfaces);
        Arc::new(Self {
            id: TypeId::new(),
            name: spec.name,
            modifiers: spec.modifiers,
            loader: Arc::downgrade(loader),
            loader_id: loader.id(),
            superclass: spec.superclass,
            interfaces: spec.interfaces,
            lineage,
            security: spec.security,
            epoch: AtomicU64::new(0),
            raw: ArcSwap::from_pointee(spec.raw),
            reflection: MetadataCacheSlot::new(),
            annotations: MetadataCacheSlot::new(),
            linked: OnceCell::new(),
        })
    }

    /// Unique identifier
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without the package prefix
    pub fn simple_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(pos) => &self.name[pos + 1..],
            None => &self.name,
        }
    }

    /// Package prefix (empty for the unnamed package)
    pub fn package_name(&self) -> &str {
        package_of(&self.name)
    }

    /// Type modifiers
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.modifiers.is_interface
    }

    /// Superclass, if any
    pub fn superclass(&self) -> Option<&Arc<TypeHandle>> {
        self.superclass.as_ref()
    }

    /// Direct interfaces in declaration order
    pub fn interfaces(&self) -> &[Arc<TypeHandle>] {
        &self.interfaces
    }

    /// Defining loader, unless it has been dropped
    pub fn loader(&self) -> Option<Arc<Loader>> {
        self.loader.upgrade()
    }

    /// Identity of the defining loader
    pub fn loader_id(&self) -> LoaderId {
        self.loader_id
    }

    /// Provenance recorded at definition
    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    /// Current raw metadata
    pub fn raw(&self) -> Arc<RawMetadata> {
        self.raw.load_full()
    }

    /// This type's own redefinition counter
    pub fn own_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Every proper supertype, each listed once
    pub fn lineage(&self) -> &[Arc<TypeHandle>] {
        &self.lineage
    }

    /// Sum of the epochs of this type and every distinct supertype.
    ///
    /// Strictly increases whenever any type in the lineage is redefined, so
    /// merged snapshots of descendants are invalidated along with the
    /// redefined ancestor's own.
    pub fn lineage_epoch(&self) -> u64 {
        self.lineage
            .iter()
            .fold(self.own_epoch(), |epoch, ancestor| epoch.wrapping_add(ancestor.own_epoch()))
    }

    /// Replace the member and annotation blobs and bump the epoch.
    ///
    /// Host runtime operation. Cached snapshots are superseded, not freed.
    pub fn redefine(&self, members: Vec<u8>, annotations: Vec<u8>) {
        let current = self.raw.load_full();
        self.raw.store(Arc::new(RawMetadata {
            members,
            annotations,
            enclosing: current.enclosing.clone(),
            native_libraries: current.native_libraries.clone(),
        }));
        // Publish the blobs before the new epoch becomes visible.
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(type_name = %self.name, epoch, "redefined");
    }

    /// Whether `self` is `other` or inherits from it
    pub fn is_subtype_of(&self, other: &TypeHandle) -> bool {
        self.id == other.id || self.lineage.iter().any(|ancestor| ancestor.id == other.id)
    }

    /// Find `name` among this type and its supertypes
    pub fn find_in_lineage(self: &Arc<Self>, name: &str) -> Option<Arc<TypeHandle>> {
        if self.name == name {
            return Some(Arc::clone(self));
        }
        self.lineage
            .iter()
            .find(|ancestor| ancestor.name == name)
            .cloned()
    }

    /// Enclosing type for nested types
    pub fn enclosing_type(&self) -> LoadResult<Option<Arc<TypeHandle>>> {
        let raw = self.raw();
        let Some(enclosing) = raw.enclosing.as_deref() else {
            return Ok(None);
        };
        if enclosing == self.name {
            return Err(LoadError::InternalConsistency(format!(
                "{} declares itself as its enclosing type",
                self.name
            )));
        }
        let loader = self.defining_loader()?;
        loader.resolve(enclosing).map(Some)
    }

    /// Whether [`link`](Self::link) has completed
    pub fn is_linked(&self) -> bool {
        self.linked.get().is_some()
    }

    /// Link the type: supertypes first, then every requested native library.
    ///
    /// Idempotent; concurrent callers wait for the first to finish. A failed
    /// link leaves the type unlinked so a later call retries.
    pub fn link(&self) -> LoadResult<()> {
        self.linked
            .get_or_try_init(|| {
                if let Some(sup) = &self.superclass {
                    sup.link()?;
                }
                for iface in &self.interfaces {
                    iface.link()?;
                }

                let raw = self.raw();
                if !raw.native_libraries.is_empty() {
                    let loader = self.defining_loader()?;
                    let owner = LibraryOwner::Loader(loader.id());
                    for library in &raw.native_libraries {
                        if !loader.runtime().natives().load_library(owner, library)? {
                            return Err(LoadError::NativeLoad {
                                name: library.clone(),
                                reason: "declined by host".to_string(),
                            });
                        }
                    }
                }

                tracing::debug!(type_name = %self.name, "linked");
                Ok(())
            })
            .map(|_| ())
    }

    pub(crate) fn reflection_slot(&self) -> &MetadataCacheSlot<ReflectiveSnapshot> {
        &self.reflection
    }

    pub(crate) fn annotation_slot(&self) -> &MetadataCacheSlot<AnnotationSnapshot> {
        &self.annotations
    }

    fn defining_loader(&self) -> LoadResult<Arc<Loader>> {
        self.loader()
            .ok_or_else(|| LoadError::linkage(&self.name, "defining loader has been dropped"))
    }
}

/// Direct supertypes followed by their own lineages, first occurrence kept.
///
/// Supertypes are fixed at definition, so their lineages are already
/// flattened and this stays linear in the number of distinct ancestors.
fn flatten_lineage(
    superclass: Option<&Arc<TypeHandle>>,
    interfaces: &[Arc<TypeHandle>],
) -> Vec<Arc<TypeHandle>> {
    let mut seen = FxHashSet::default();
    let mut lineage = Vec::new();
    for direct in superclass.into_iter().chain(interfaces) {
        for ancestor in std::iter::once(direct).chain(&direct.lineage) {
            if seen.insert(ancestor.id) {
                lineage.push(Arc::clone(ancestor));
            }
        }
    }
    lineage
}

/// Package prefix of a qualified name
pub(crate) fn package_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[..pos],
        None => "",
    }
}

impl Versioned for TypeHandle {
    fn epoch(&self) -> u64 {
        self.lineage_epoch()
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandle")
            .field("id", &self.id.as_u64())
            .field("name", &self.name)
            .field("loader", &self.loader_id)
            .field("epoch", &self.own_epoch())
            .finish()
    }
}
