//! Strata Engine
//!
//! This crate resolves symbolic type names to type handles through a graph of
//! delegating loaders and caches reflective introspection over those handles:
//! - **Cache**: generation-stamped, optimistically published metadata slots (`cache`)
//! - **Metadata**: binary member/annotation blobs and type images (`metadata`)
//! - **Types**: type handles, epochs and linking (`types`)
//! - **Reflection**: merged member and annotation snapshots (`reflect`)
//! - **Loaders**: per-name locking and parent-first delegation (`loader`)
//! - **Native libraries**: ownership tables and reentrancy tracking (`native`)
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_engine::{ImageSource, LoaderBuilder, Runtime, TypeImage};
//!
//! let runtime = Runtime::builder().build();
//! let source = ImageSource::new();
//! source.insert(TypeImage::class("pkg.Widget").build()?)?;
//!
//! let boot = LoaderBuilder::new("boot", runtime.base_loader_type())
//!     .source(source)
//!     .build(&runtime);
//!
//! let widget = boot.resolve("pkg.Widget")?;
//! let methods = runtime.reflector(None).methods(&widget)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Generation-stamped metadata cache slots
pub mod cache;

/// Runtime configuration (TOML)
pub mod config;

/// Binary metadata formats: member blobs, annotation blobs, type images
pub mod metadata;

/// Type handles
pub mod types;

/// Reflective member and annotation caches
pub mod reflect;

/// Delegating loaders and the parallel-capability registry
pub mod loader;

/// Native library ownership and reentrancy tracking
pub mod native;

/// The injected bundle of process-wide registries
pub mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use strata_sdk::{
    AccessPolicy, AllowAll, LoadError, LoadResult, MemberAccess, NativeHost, SecurityContext,
};

pub use cache::{MetadataCacheSlot, Versioned};
pub use config::{ConfigError, NativeConfig, RuntimeConfig};
pub use loader::{
    EmptySource, ImageDefiner, ImageSource, Loader, LoaderBuilder, LoaderId, LoaderType,
    LoadingLock, Package, PackageInfo, ParallelCapabilityRegistry, TypeDefiner, TypeSource,
};
pub use metadata::{
    Annotation, AnnotationValue, DecodeError, EncodeError, Member, MemberKind, Modifiers, TypeImage,
    TypeImageBuilder,
};
pub use native::{DylibHost, LibraryOwner, NativeLibraryHandle, NativeLibraryRegistry};
pub use reflect::{AnnotationMap, AnnotationSnapshot, Reflector, ReflectiveSnapshot};
pub use runtime::{Runtime, RuntimeBuilder};
pub use types::{RawMetadata, TypeHandle, TypeId, TypeSpec};
