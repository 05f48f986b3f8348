//! Reflection facade

use std::fmt;
use std::sync::Arc;
use strata_sdk::{AccessPolicy, LoadError, LoadResult, MemberAccess};

use super::{AnnotationSnapshot, ReflectiveSnapshot};
use crate::metadata::{Annotation, Member, CONSTRUCTOR_NAME};
use crate::types::TypeHandle;

/// Member and annotation queries on behalf of one accessor
#[derive(Clone)]
pub struct Reflector {
    policy: Arc<dyn AccessPolicy>,
    accessor: Option<String>,
}

impl Reflector {
    /// Reflector for `accessor` (a type name, `None` for host code)
    pub fn new(policy: Arc<dyn AccessPolicy>, accessor: Option<String>) -> Self {
        Self { policy, accessor }
    }

    /// Accessor type name
    pub fn accessor(&self) -> Option<&str> {
        self.accessor.as_deref()
    }

    fn check(&self, t: &TypeHandle, which: MemberAccess) -> LoadResult<()> {
        if self
            .policy
            .check_member_access(self.accessor.as_deref(), t.name(), which)
        {
            return Ok(());
        }
        tracing::warn!(accessor = ?self.accessor, target = t.name(), ?which, "reflective access denied");
        Err(LoadError::Security(format!(
            "{} may not query {:?} members of {}",
            self.accessor.as_deref().unwrap_or("host"),
            which,
            t.name()
        )))
    }

    fn snapshot(
        &self,
        t: &Arc<TypeHandle>,
        which: MemberAccess,
    ) -> LoadResult<Arc<ReflectiveSnapshot>> {
        self.check(t, which)?;
        ReflectiveSnapshot::of(t)
    }

    // ========================================================================
    // Member lists
    // ========================================================================

    /// Public methods, including inherited ones
    pub fn methods(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Member>> {
        Ok(self.snapshot(t, MemberAccess::Public)?.public_methods().to_vec())
    }

    /// Public fields, including inherited ones
    pub fn fields(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Member>> {
        Ok(self.snapshot(t, MemberAccess::Public)?.public_fields().to_vec())
    }

    /// Public constructors
    pub fn constructors(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Member>> {
        Ok(self
            .snapshot(t, MemberAccess::Public)?
            .public_constructors()
            .to_vec())
    }

    /// Every method `t` declares
    pub fn declared_methods(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Member>> {
        Ok(self
            .snapshot(t, MemberAccess::Declared)?
            .declared_methods()
            .to_vec())
    }

    /// Every field `t` declares
    pub fn declared_fields(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Member>> {
        Ok(self
            .snapshot(t, MemberAccess::Declared)?
            .declared_fields()
            .to_vec())
    }

    /// Every constructor `t` declares
    pub fn declared_constructors(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Member>> {
        Ok(self
            .snapshot(t, MemberAccess::Declared)?
            .declared_constructors()
            .to_vec())
    }

    // ========================================================================
    // Single members
    // ========================================================================

    /// Public method `name` taking `parameters`
    pub fn method(
        &self,
        t: &Arc<TypeHandle>,
        name: &str,
        parameters: &[&str],
    ) -> LoadResult<Member> {
        let snapshot = self.snapshot(t, MemberAccess::Public)?;
        snapshot
            .public_methods()
            .iter()
            .find(|m| m.name == name && params_match(m, parameters))
            .cloned()
            .ok_or_else(|| {
                LoadError::not_found(format!("{}.{}({})", t.name(), name, parameters.join(",")))
            })
    }

    /// Public field `name`
    pub fn field(&self, t: &Arc<TypeHandle>, name: &str) -> LoadResult<Member> {
        let snapshot = self.snapshot(t, MemberAccess::Public)?;
        snapshot
            .public_fields()
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .ok_or_else(|| LoadError::not_found(format!("{}.{}", t.name(), name)))
    }

    /// Public constructor taking `parameters`
    pub fn constructor(&self, t: &Arc<TypeHandle>, parameters: &[&str]) -> LoadResult<Member> {
        let snapshot = self.snapshot(t, MemberAccess::Public)?;
        snapshot
            .public_constructors()
            .iter()
            .find(|m| params_match(m, parameters))
            .cloned()
            .ok_or_else(|| {
                LoadError::not_found(format!(
                    "{}.{}({})",
                    t.name(),
                    CONSTRUCTOR_NAME,
                    parameters.join(",")
                ))
            })
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    /// Effective annotations, sorted by kind
    pub fn annotations(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Annotation>> {
        self.check(t, MemberAccess::Public)?;
        Ok(AnnotationSnapshot::of(t)?.effective().values().cloned().collect())
    }

    /// Declared annotations, sorted by kind
    pub fn declared_annotations(&self, t: &Arc<TypeHandle>) -> LoadResult<Vec<Annotation>> {
        self.check(t, MemberAccess::Declared)?;
        Ok(AnnotationSnapshot::of(t)?.declared().values().cloned().collect())
    }

    /// Effective annotation of `kind`
    pub fn annotation(&self, t: &Arc<TypeHandle>, kind: &str) -> LoadResult<Annotation> {
        self.check(t, MemberAccess::Public)?;
        AnnotationSnapshot::of(t)?
            .get(kind)
            .cloned()
            .ok_or_else(|| LoadError::not_found(format!("@{} on {}", kind, t.name())))
    }

    /// Whether an effective annotation of `kind` is present
    pub fn is_annotation_present(&self, t: &Arc<TypeHandle>, kind: &str) -> LoadResult<bool> {
        self.check(t, MemberAccess::Public)?;
        Ok(AnnotationSnapshot::of(t)?.get(kind).is_some())
    }
}

impl fmt::Debug for Reflector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflector")
            .field("accessor", &self.accessor)
            .finish()
    }
}

fn params_match(member: &Member, parameters: &[&str]) -> bool {
    member.parameters.len() == parameters.len()
        && member.parameters.iter().zip(parameters).all(|(a, b)| a == b)
}
