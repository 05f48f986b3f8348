//! Reflective introspection
//!
//! Two snapshots hang off every [`TypeHandle`](crate::TypeHandle), each in
//! its own [`MetadataCacheSlot`](crate::MetadataCacheSlot):
//!
//! - [`ReflectiveSnapshot`]: declared members plus the merged public member
//!   sets (fields, methods, constructors) and direct interfaces
//! - [`AnnotationSnapshot`]: declared annotations plus the effective set with
//!   inheritable superclass annotations folded in
//!
//! Both are computed on first use from the raw blobs and from the snapshots
//! of supertypes, and recomputed after any type in the lineage is redefined.
//! [`Reflector`] is the query facade; it consults the runtime's access
//! policy before handing out members.

mod annotation_data;
mod lookup;
mod reflection_data;

pub use annotation_data::{AnnotationMap, AnnotationSnapshot};
pub use lookup::Reflector;
pub use reflection_data::ReflectiveSnapshot;
