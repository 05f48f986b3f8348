//! Type sources: the local materialization step of a loader

use dashmap::DashMap;
use std::sync::Arc;
use strata_sdk::{LoadResult, SecurityContext};

use super::Loader;
use crate::metadata::{EncodeError, TypeImage};
use crate::types::TypeHandle;

/// Produces types local to a loader.
///
/// Called with the loader's loading lock for `name` held, after the parent
/// chain failed to resolve it. Implementations usually finish with
/// [`Loader::define_type`].
pub trait TypeSource: Send + Sync {
    /// Materialize `name` for `loader`, or return `Ok(None)` when this
    /// source does not know it.
    fn find_type(&self, loader: &Arc<Loader>, name: &str) -> LoadResult<Option<Arc<TypeHandle>>>;
}

impl<S: TypeSource + ?Sized> TypeSource for Arc<S> {
    fn find_type(&self, loader: &Arc<Loader>, name: &str) -> LoadResult<Option<Arc<TypeHandle>>> {
        (**self).find_type(loader, name)
    }
}

/// Source that knows no types
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySource;

impl TypeSource for EmptySource {
    fn find_type(&self, _: &Arc<Loader>, _: &str) -> LoadResult<Option<Arc<TypeHandle>>> {
        Ok(None)
    }
}

/// In-memory table of encoded type images
#[derive(Default)]
pub struct ImageSource {
    images: DashMap<String, Arc<Vec<u8>>>,
    origin: Option<String>,
}

impl ImageSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty source whose types record `origin` as code source
    pub fn with_origin(origin: &str) -> Self {
        Self {
            images: DashMap::new(),
            origin: Some(origin.to_string()),
        }
    }

    /// Add an image, replacing any previous image of the same name
    pub fn insert(&self, image: TypeImage) -> Result<(), EncodeError> {
        let bytes = image.encode()?;
        self.images.insert(image.name, Arc::new(bytes));
        Ok(())
    }

    /// Add already encoded bytes under `name`
    pub fn insert_bytes(&self, name: &str, bytes: Vec<u8>) {
        self.images.insert(name.to_string(), Arc::new(bytes));
    }

    /// Whether an image for `name` is present
    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the source is empty
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl TypeSource for ImageSource {
    fn find_type(&self, loader: &Arc<Loader>, name: &str) -> LoadResult<Option<Arc<TypeHandle>>> {
        // Release the shard guard before defining: the definer resolves
        // supertypes, which may come back to this source.
        let Some(bytes) = self.images.get(name).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };
        let security = match &self.origin {
            Some(origin) => SecurityContext::from_source(origin.clone()),
            None => SecurityContext::from_source(format!("image:{name}")),
        };
        loader.define_type(Some(name), &bytes, &security).map(Some)
    }
}
