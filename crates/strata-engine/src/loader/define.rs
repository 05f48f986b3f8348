//! Host type-definition primitive

use std::sync::Arc;
use strata_sdk::{LoadError, LoadResult, SecurityContext};

use super::Loader;
use crate::metadata::TypeImage;
use crate::types::{RawMetadata, TypeHandle, TypeSpec};

/// Turns raw bytes into a type handle defined by `loader`
pub trait TypeDefiner: Send + Sync {
    /// Define a type from `bytes`.
    ///
    /// The definer resolves supertypes through `loader`; it does not record
    /// the result in the loader's tables.
    fn define(
        &self,
        bytes: &[u8],
        loader: &Arc<Loader>,
        security: &SecurityContext,
    ) -> LoadResult<Arc<TypeHandle>>;
}

/// Definer for the binary type image format
#[derive(Debug, Clone, Copy)]
pub struct ImageDefiner {
    verify_checksums: bool,
}

impl ImageDefiner {
    /// Create a definer, optionally skipping checksum verification
    pub fn new(verify_checksums: bool) -> Self {
        Self { verify_checksums }
    }
}

impl Default for ImageDefiner {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TypeDefiner for ImageDefiner {
    fn define(
        &self,
        bytes: &[u8],
        loader: &Arc<Loader>,
        security: &SecurityContext,
    ) -> LoadResult<Arc<TypeHandle>> {
        let image = TypeImage::decode(bytes, self.verify_checksums)
            .map_err(|e| e.in_context("type image"))?;
        let name = image.name.as_str();

        let superclass = match image.superclass.as_deref() {
            None => None,
            Some(sup) if sup == name => {
                return Err(LoadError::linkage(name, "type cannot extend itself"));
            }
            Some(_) if image.modifiers.is_interface => {
                return Err(LoadError::linkage(name, "interface cannot extend a class"));
            }
            Some(sup) => {
                let handle = resolve_supertype(loader, name, sup)?;
                if handle.is_interface() {
                    return Err(LoadError::linkage(
                        name,
                        format!("interface {sup} used as superclass"),
                    ));
                }
                Some(handle)
            }
        };

        let mut interfaces = Vec::with_capacity(image.interfaces.len());
        for iface in &image.interfaces {
            if iface == name {
                return Err(LoadError::linkage(name, "type cannot implement itself"));
            }
            let handle = resolve_supertype(loader, name, iface)?;
            if !handle.is_interface() {
                return Err(LoadError::linkage(
                    name,
                    format!("class {iface} used as interface"),
                ));
            }
            interfaces.push(handle);
        }

        let spec = TypeSpec {
            name: image.name.clone(),
            modifiers: image.modifiers,
            superclass,
            interfaces,
            raw: RawMetadata {
                members: image.members,
                annotations: image.annotations,
                enclosing: image.enclosing,
                native_libraries: image.native_libraries,
            },
            security: security.clone(),
        };
        Ok(TypeHandle::new(spec, loader))
    }
}

/// Resolve a supertype; a missing one is a linkage failure of the subtype
fn resolve_supertype(
    loader: &Arc<Loader>,
    name: &str,
    supertype: &str,
) -> LoadResult<Arc<TypeHandle>> {
    loader.resolve(supertype).map_err(|err| match err {
        LoadError::NotFound { .. } => {
            LoadError::linkage(name, format!("supertype {supertype} not found"))
        }
        other => other,
    })
}
