//! Declared and effective annotations

use std::collections::BTreeMap;
use std::sync::Arc;
use strata_sdk::{LoadError, LoadResult};

use crate::metadata::{decode_annotations, Annotation};
use crate::types::TypeHandle;

/// Annotations keyed by kind
pub type AnnotationMap = BTreeMap<String, Annotation>;

/// Annotations of one type
#[derive(Debug)]
pub struct AnnotationSnapshot {
    declared: Arc<AnnotationMap>,
    /// Same allocation as `declared` when nothing is inherited
    effective: Arc<AnnotationMap>,
}

impl AnnotationSnapshot {
    /// Cached snapshot of `t`, computed on a miss
    pub fn of(t: &Arc<TypeHandle>) -> LoadResult<Arc<Self>> {
        t.annotation_slot().get_or_compute(&**t, || Self::compute(t))
    }

    fn compute(t: &Arc<TypeHandle>) -> LoadResult<Self> {
        let context = format!("annotations of {}", t.name());
        let raw = t.raw();
        let mut declared = AnnotationMap::new();
        for annotation in decode_annotations(&raw.annotations).map_err(|e| e.in_context(&context))? {
            if declared.contains_key(&annotation.kind) {
                return Err(LoadError::format(
                    context,
                    format!("duplicate annotation {}", annotation.kind),
                ));
            }
            declared.insert(annotation.kind.clone(), annotation);
        }
        let declared = Arc::new(declared);

        let inherited: Vec<Annotation> = match t.superclass() {
            Some(sup) => Self::of(sup)?
                .effective
                .values()
                .filter(|a| a.inherited && !declared.contains_key(&a.kind))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let effective = if inherited.is_empty() {
            Arc::clone(&declared)
        } else {
            let mut effective = (*declared).clone();
            for annotation in inherited {
                effective.insert(annotation.kind.clone(), annotation);
            }
            Arc::new(effective)
        };

        tracing::trace!(type_name = t.name(), declared = declared.len(), effective = effective.len(), "annotation snapshot");
        Ok(Self {
            declared,
            effective,
        })
    }

    /// Annotations the type declares itself
    pub fn declared(&self) -> &AnnotationMap {
        &self.declared
    }

    /// Declared annotations plus inheritable superclass annotations
    pub fn effective(&self) -> &AnnotationMap {
        &self.effective
    }

    /// Effective annotation of `kind`
    pub fn get(&self, kind: &str) -> Option<&Annotation> {
        self.effective.get(kind)
    }

    /// Whether the effective set is the declared set itself
    pub fn inherits_nothing(&self) -> bool {
        Arc::ptr_eq(&self.declared, &self.effective)
    }
}
