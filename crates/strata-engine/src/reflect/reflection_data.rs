//! Declared and merged public members

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::sync::Arc;
use strata_sdk::LoadResult;

use crate::metadata::{decode_members, Member, MemberKind};
use crate::types::{TypeHandle, TypeId};

/// Members of one type, declared and merged
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReflectiveSnapshot {
    declared_fields: Vec<Member>,
    declared_methods: Vec<Member>,
    declared_constructors: Vec<Member>,
    public_fields: Vec<Member>,
    public_methods: Vec<Member>,
    public_constructors: Vec<Member>,
    interfaces: Vec<String>,
}

impl ReflectiveSnapshot {
    /// Cached snapshot of `t`, computed on a miss
    pub fn of(t: &Arc<TypeHandle>) -> LoadResult<Arc<Self>> {
        t.reflection_slot().get_or_compute(&**t, || Self::compute(t))
    }

    fn compute(t: &Arc<TypeHandle>) -> LoadResult<Self> {
        let raw = t.raw();
        let declared = decode_members(&raw.members, t.name())
            .map_err(|e| e.in_context(&format!("members of {}", t.name())))?;

        let mut snapshot = Self {
            interfaces: t.interfaces().iter().map(|i| i.name().to_string()).collect(),
            ..Self::default()
        };
        for member in declared {
            match member.kind {
                MemberKind::Field => snapshot.declared_fields.push(member),
                MemberKind::Method => snapshot.declared_methods.push(member),
                MemberKind::Constructor => snapshot.declared_constructors.push(member),
            }
        }

        snapshot.public_constructors = public(&snapshot.declared_constructors);
        snapshot.public_fields = merge_public_fields(t, &snapshot.declared_fields)?;
        snapshot.public_methods = merge_public_methods(t, &snapshot.declared_methods)?;

        tracing::trace!(
            type_name = t.name(),
            methods = snapshot.public_methods.len(),
            fields = snapshot.public_fields.len(),
            "reflective snapshot"
        );
        Ok(snapshot)
    }

    /// Every declared field
    pub fn declared_fields(&self) -> &[Member] {
        &self.declared_fields
    }

    /// Every declared method
    pub fn declared_methods(&self) -> &[Member] {
        &self.declared_methods
    }

    /// Every declared constructor
    pub fn declared_constructors(&self) -> &[Member] {
        &self.declared_constructors
    }

    /// Public fields, including inherited ones
    pub fn public_fields(&self) -> &[Member] {
        &self.public_fields
    }

    /// Public methods, including inherited ones
    pub fn public_methods(&self) -> &[Member] {
        &self.public_methods
    }

    /// Public constructors
    pub fn public_constructors(&self) -> &[Member] {
        &self.public_constructors
    }

    /// Direct interface names in declaration order
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }
}

fn public(members: &[Member]) -> Vec<Member> {
    members.iter().filter(|m| m.is_public()).cloned().collect()
}

/// Own public fields, then each interface's, then the superclass's
fn merge_public_fields(t: &Arc<TypeHandle>, declared: &[Member]) -> LoadResult<Vec<Member>> {
    let mut fields = public(declared);
    let mut visited = FxHashSet::default();
    for iface in t.interfaces() {
        if visited.insert(iface.id()) {
            fields.extend(ReflectiveSnapshot::of(iface)?.public_fields.iter().cloned());
        }
    }
    if let Some(sup) = t.superclass() {
        fields.extend(ReflectiveSnapshot::of(sup)?.public_fields.iter().cloned());
    }
    dedupe_declarations(&mut fields);
    Ok(fields)
}

/// Public method merge:
///
/// 1. own declared public methods
/// 2. each direct interface's public non-static methods, skipping
///    interfaces already visited
/// 3. the superclass's public methods, with interface methods that the
///    superclass chain implements concretely dropped, placed before the
///    remaining interface methods
/// 4. inherited methods redeclared by `t` removed
/// 5. duplicates by name and parameters collapsed to the most specific one
fn merge_public_methods(t: &Arc<TypeHandle>, declared: &[Member]) -> LoadResult<Vec<Member>> {
    let own = public(declared);

    let mut visited: FxHashSet<TypeId> = FxHashSet::default();
    let mut from_interfaces = Vec::new();
    for iface in t.interfaces() {
        if !visited.insert(iface.id()) {
            continue;
        }
        let snapshot = ReflectiveSnapshot::of(iface)?;
        from_interfaces.extend(snapshot.public_methods.iter().filter(|m| !m.is_static()).cloned());
    }
    dedupe_declarations(&mut from_interfaces);

    let mut inherited = match t.superclass() {
        Some(sup) => {
            let super_methods = ReflectiveSnapshot::of(sup)?.public_methods.clone();
            from_interfaces.retain(|m| {
                !super_methods
                    .iter()
                    .any(|s| s.is_concrete() && s.same_parameters(m))
            });
            super_methods
        }
        None => Vec::new(),
    };
    inherited.append(&mut from_interfaces);

    inherited.retain(|m| !own.iter().any(|d| d.same_signature(m)));

    let mut methods = own;
    methods.append(&mut inherited);
    dedupe_declarations(&mut methods);
    remove_less_specific(t, methods)
}

/// Keep the first occurrence of each (declaring type, signature)
fn dedupe_declarations(members: &mut Vec<Member>) {
    let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
    members.retain(|m| seen.insert((m.declaring_type.clone(), m.descriptor())));
}

/// Collapse methods sharing name and parameters.
///
/// A later method replaces the kept one when its return type is strictly
/// more specific, or when both return the same type and the later one is
/// declared by a subtype of the kept one's declaring type (a sub-interface
/// redeclaring a super-interface method). Otherwise the first in merge order
/// stays. The survivor takes the position of the group's first member.
fn remove_less_specific(t: &Arc<TypeHandle>, methods: Vec<Member>) -> LoadResult<Vec<Member>> {
    let mut index: FxHashMap<(String, Vec<String>), usize> = FxHashMap::default();
    let mut kept: Vec<Member> = Vec::with_capacity(methods.len());
    for method in methods {
        let key = (method.name.clone(), method.parameters.clone());
        match index.get(&key) {
            Some(&i) => {
                if supersedes(t, &method, &kept[i])? {
                    kept[i] = method;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(method);
            }
        }
    }
    Ok(kept)
}

fn supersedes(t: &Arc<TypeHandle>, candidate: &Member, kept: &Member) -> LoadResult<bool> {
    if candidate.type_name != kept.type_name {
        return is_more_specific(t, &candidate.type_name, &kept.type_name);
    }
    Ok(candidate.declaring_type != kept.declaring_type
        && t.find_in_lineage(&candidate.declaring_type)
            .is_some_and(|declarer| declarer.find_in_lineage(&kept.declaring_type).is_some()))
}

/// Whether `candidate` is a proper subtype of `current`.
///
/// The candidate is resolved through `t`'s defining loader. A return type
/// that no loader in the chain can provide is unrelated to every other.
fn is_more_specific(t: &Arc<TypeHandle>, candidate: &str, current: &str) -> LoadResult<bool> {
    let resolved = if candidate == t.name() {
        Arc::clone(t)
    } else {
        let Some(loader) = t.loader() else {
            return Ok(false);
        };
        match loader.resolve(candidate) {
            Ok(handle) => handle,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        }
    };
    Ok(resolved.find_in_lineage(current).is_some())
}
