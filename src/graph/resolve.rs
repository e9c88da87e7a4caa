//! Ownership validation and weak reference resolution.
//!
//! Strong references must form a tree: each instance has at most one owner
//! and no instance owns one of its ancestors. Both are checked with an
//! iterative depth-first walk, so hostile graphs cannot exhaust the stack.
//! Weak references and identifier-valued properties are then checked against
//! the identifiers registered during the walk. Identifiers are unique within
//! the collection property that owns them; a weak reference looks its key up
//! in the collection its path ends at.

use std::collections::HashMap;

use tracing::debug;

use super::raw::{RawGraph, RawValue};
use crate::core::{encode_value, is_builtin_definition, pid, ClassTable, Value, WeakRef};
use crate::util::{format_key, Auid, DecodeErrorKind, Error, MobId, Result};

/// Handle of a reachable object, in preorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a weak reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeakTarget {
    Object(ObjectId),
    /// Well-known definition the file did not include.
    Builtin(Auid),
}

/// A validated object graph.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    pub raw: RawGraph,
    pub table: ClassTable,
    /// Raw instance index of each object.
    order: Vec<usize>,
    /// Object of each raw instance; `None` when unreachable.
    index_of: Vec<Option<ObjectId>>,
    parent: Vec<Option<ObjectId>>,
    /// First object registered under `(key pid, key)`, across collections.
    identifiers: HashMap<(u16, Vec<u8>), ObjectId>,
    /// `(owning property, key pid, key)`.
    scoped: HashMap<(u16, u16, Vec<u8>), ObjectId>,
}

impl ResolvedGraph {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn root(&self) -> ObjectId {
        ObjectId(0)
    }

    /// Raw instance index of an object.
    #[inline]
    pub fn raw_index(&self, id: ObjectId) -> usize {
        self.order[id.index()]
    }

    /// Object of a raw instance index.
    pub fn object_of(&self, raw: usize) -> Option<ObjectId> {
        self.index_of.get(raw).copied().flatten()
    }

    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.parent[id.index()]
    }

    /// Object registered under an identifier.
    pub fn lookup(&self, key_pid: u16, key: &[u8]) -> Option<ObjectId> {
        self.identifiers.get(&(key_pid, key.to_vec())).copied()
    }

    /// Object registered under an identifier in the collection `collection_pid`.
    pub fn lookup_in(&self, collection_pid: u16, key_pid: u16, key: &[u8]) -> Option<ObjectId> {
        self.scoped.get(&(collection_pid, key_pid, key.to_vec())).copied()
    }

    pub fn resolve_weak(&self, w: &WeakRef) -> Option<WeakTarget> {
        let found = match w.path.last() {
            Some(&collection) => self.lookup_in(collection, w.key_pid, &w.key),
            None => self.lookup(w.key_pid, &w.key),
        };
        if let Some(id) = found {
            return Some(WeakTarget::Object(id));
        }
        if is_builtin_definition(w.key_pid, &w.key) {
            return Auid::from_slice(&w.key).map(WeakTarget::Builtin);
        }
        None
    }

    /// Mob with the given MobID.
    pub fn mob(&self, id: MobId) -> Option<ObjectId> {
        self.lookup(pid::MOB_ID, id.as_bytes())
    }

    /// Objects in preorder.
    pub fn objects(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.order.len() as u32).map(ObjectId)
    }
}

fn describe(raw: &RawGraph, table: &ClassTable, idx: usize) -> String {
    match raw.get(idx) {
        Some(inst) if !inst.path.is_empty() => format!("{} at {:?}", table.class_name(inst.class), inst.path),
        Some(inst) => format!("{} #{idx}", table.class_name(inst.class)),
        None => format!("#{idx}"),
    }
}

/// Validate ownership, register identifiers and check every reference.
pub fn resolve(raw: RawGraph, table: ClassTable) -> Result<ResolvedGraph> {
    let n = raw.len();
    if raw.root >= n {
        return Err(Error::invalid("graph has no root instance"));
    }

    let mut order = Vec::with_capacity(n);
    let mut index_of: Vec<Option<ObjectId>> = vec![None; n];
    let mut parent = Vec::with_capacity(n);
    let mut on_path = vec![false; n];
    let mut identifiers: HashMap<(u16, Vec<u8>), ObjectId> = HashMap::new();
    let mut scoped: HashMap<(u16, u16, Vec<u8>), ObjectId> = HashMap::new();

    // owning property pid of the root is 0
    let mut visit = |idx: usize,
                     owner: Option<ObjectId>,
                     owner_pid: u16,
                     order: &mut Vec<usize>,
                     index_of: &mut Vec<Option<ObjectId>>|
     -> Result<Vec<(u16, usize)>> {
        let id = ObjectId(order.len() as u32);
        order.push(idx);
        index_of[idx] = Some(id);
        parent.push(owner);
        let inst = &raw.instances[idx];
        for p in &inst.properties {
            let RawValue::Data(v) = &p.value else { continue };
            let unique = table.lookup_property(inst.class, p.pid).is_some_and(|d| d.unique);
            if !unique {
                continue;
            }
            let key = encode_value(v);
            identifiers.entry((p.pid, key.clone())).or_insert(id);
            if let Some(prev) = scoped.insert((owner_pid, p.pid, key.clone()), id) {
                return Err(Error::decode(
                    DecodeErrorKind::DuplicateIdentifier,
                    format!(
                        "identifier {} ({:#06x}) on {} already names object {}",
                        format_key(&key),
                        p.pid,
                        describe(&raw, &table, idx),
                        prev.0
                    ),
                ));
            }
        }
        Ok(inst.strong_children().collect())
    };

    // (instance, (owning pid, child) pairs, next child position)
    let mut stack: Vec<(usize, Vec<(u16, usize)>, usize)> = Vec::new();
    let children = visit(raw.root, None, 0, &mut order, &mut index_of)?;
    on_path[raw.root] = true;
    stack.push((raw.root, children, 0));

    while let Some((node, children, pos)) = stack.last_mut() {
        let node = *node;
        if *pos >= children.len() {
            on_path[node] = false;
            stack.pop();
            continue;
        }
        let (owner_pid, child) = children[*pos];
        *pos += 1;
        if child >= n {
            return Err(Error::invalid(format!(
                "{} references instance #{child} outside the graph",
                describe(&raw, &table, node)
            )));
        }
        if on_path[child] {
            return Err(Error::decode(
                DecodeErrorKind::CyclicOwnership,
                format!("{} owns its ancestor {}", describe(&raw, &table, node), describe(&raw, &table, child)),
            ));
        }
        if index_of[child].is_some() {
            return Err(Error::decode(
                DecodeErrorKind::MultipleOwners,
                format!("{} is owned more than once", describe(&raw, &table, child)),
            ));
        }
        let owner = index_of[node];
        let grandchildren = visit(child, owner, owner_pid, &mut order, &mut index_of)?;
        on_path[child] = true;
        stack.push((child, grandchildren, 0));
    }
    drop(visit);

    let graph = ResolvedGraph { raw, table, order, index_of, parent, identifiers, scoped };
    check_references(&graph)?;
    debug!(objects = graph.len(), identifiers = graph.identifiers.len(), "graph resolved");
    Ok(graph)
}

fn check_references(g: &ResolvedGraph) -> Result<()> {
    for id in g.objects() {
        let idx = g.raw_index(id);
        let inst = &g.raw.instances[idx];
        for p in &inst.properties {
            for w in p.value.weak_refs() {
                if g.resolve_weak(w).is_none() {
                    return Err(Error::decode(
                        DecodeErrorKind::DanglingReference,
                        format!(
                            "{} property {:#06x} names missing object {} (key {:#06x})",
                            describe(&g.raw, &g.table, idx),
                            p.pid,
                            format_key(&w.key),
                            w.key_pid
                        ),
                    ));
                }
            }
            let Some(key_pid) = g.table.lookup_property(inst.class, p.pid).and_then(|d| d.references) else {
                continue;
            };
            let RawValue::Data(v) = &p.value else { continue };
            if matches!(v, Value::MobId(m) if m.is_zero()) {
                continue;
            }
            let key = encode_value(v);
            if g.lookup(key_pid, &key).is_none() && !is_builtin_definition(key_pid, &key) {
                return Err(Error::decode(
                    DecodeErrorKind::DanglingReference,
                    format!(
                        "{} property {:#06x} names missing object {}",
                        describe(&g.raw, &g.table, idx),
                        p.pid,
                        format_key(&key)
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{class, datadef};
    use crate::graph::{RawInstance, RawProperty};

    fn strong(pid: u16, target: usize) -> RawProperty {
        RawProperty::new(pid, RawValue::Strong { name: format!("p-{pid:x}"), target })
    }

    fn seq_with(children: Vec<usize>) -> RawInstance {
        let mut s = RawInstance::new(class::SEQUENCE);
        s.set(RawProperty::new(
            pid::COMPONENTS,
            RawValue::StrongVector { name: "Components-1001".into(), elements: children },
        ));
        s
    }

    fn picture() -> RawProperty {
        RawProperty::new(
            pid::DATA_DEFINITION,
            RawValue::Weak(WeakRef {
                path: vec![2, pid::DICTIONARY, pid::DATA_DEFINITIONS],
                key_pid: pid::IDENTIFICATION,
                key: datadef::PICTURE.to_le_bytes().to_vec(),
            }),
        )
    }

    #[test]
    fn test_preorder_ids() {
        let mut g = RawGraph::default();
        let root = g.add(RawInstance::new(class::ROOT));
        let a = g.add(seq_with(vec![]));
        let b = g.add(seq_with(vec![]));
        let s = g.add(seq_with(vec![a, b]));
        g.instances[root].set(strong(2, s));
        g.instances[a].set(picture());

        let r = resolve(g, ClassTable::builtin()).unwrap();
        assert_eq!(r.len(), 4);
        assert_eq!(r.raw_index(ObjectId(1)), s);
        assert_eq!(r.raw_index(ObjectId(2)), a);
        assert_eq!(r.parent(ObjectId(3)), Some(ObjectId(1)));
        let w = match &r.raw.instances[a].get(pid::DATA_DEFINITION).unwrap().value {
            RawValue::Weak(w) => w.clone(),
            _ => unreachable!(),
        };
        assert_eq!(r.resolve_weak(&w), Some(WeakTarget::Builtin(datadef::PICTURE)));
    }

    #[test]
    fn test_cycle() {
        let mut g = RawGraph::default();
        let root = g.add(RawInstance::new(class::ROOT));
        let a = g.add(seq_with(vec![]));
        let b = g.add(seq_with(vec![a]));
        g.instances[a] = seq_with(vec![b]);
        g.instances[root].set(strong(2, a));
        let err = resolve(g, ClassTable::builtin()).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::CyclicOwnership));

        let mut g = RawGraph::default();
        let root = g.add(RawInstance::new(class::ROOT));
        g.instances[root].set(strong(2, root));
        let err = resolve(g, ClassTable::builtin()).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::CyclicOwnership));
    }

    #[test]
    fn test_shared_child() {
        let mut g = RawGraph::default();
        let root = g.add(RawInstance::new(class::ROOT));
        let leaf = g.add(seq_with(vec![]));
        let s = g.add(seq_with(vec![leaf, leaf]));
        g.instances[root].set(strong(2, s));
        let err = resolve(g, ClassTable::builtin()).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::MultipleOwners));
    }

    #[test]
    fn test_dangling_and_duplicate() {
        let missing = MobId([7; 32]);
        let mut g = RawGraph::default();
        let root = g.add(RawInstance::new(class::ROOT));
        let mut clip = RawInstance::new(class::SOURCE_CLIP);
        clip.set(RawProperty::new(pid::SOURCE_ID, RawValue::Data(Value::MobId(missing))));
        let clip = g.add(clip);
        g.instances[root].set(strong(2, clip));
        let err = resolve(g.clone(), ClassTable::builtin()).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::DanglingReference));
        assert!(err.to_string().contains(&missing.to_string()));

        g.instances[clip].set(RawProperty::new(pid::SOURCE_ID, RawValue::Data(Value::MobId(MobId::ZERO))));
        assert!(resolve(g, ClassTable::builtin()).is_ok());

        let mut g = RawGraph::default();
        let root = g.add(RawInstance::new(class::ROOT));
        let mut m1 = RawInstance::new(class::MASTER_MOB);
        m1.set(RawProperty::new(pid::MOB_ID, RawValue::Data(Value::MobId(missing))));
        let m1 = g.add(m1.clone());
        let m2 = g.add(g.instances[m1].clone());
        g.instances[root].set(RawProperty::new(
            pid::MOBS,
            RawValue::StrongSet { name: "Mobs-1901".into(), key_pid: pid::MOB_ID, elements: vec![m1, m2] },
        ));
        let err = resolve(g, ClassTable::builtin()).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::DuplicateIdentifier));
    }

    #[test]
    fn test_weak_lookup_scoped_to_collection() {
        let shared = Auid::new(0x0bad_cafe, 1, 2, [3; 8]);
        let def = |class_id| {
            let mut d = RawInstance::new(class_id);
            d.set(RawProperty::new(pid::IDENTIFICATION, RawValue::Data(Value::Auid(shared))));
            d
        };
        let set = |collection: u16, element| {
            RawProperty::new(collection, RawValue::StrongSet {
                name: format!("set-{collection:x}"),
                key_pid: pid::IDENTIFICATION,
                elements: vec![element],
            })
        };

        let mut g = RawGraph::default();
        let root = g.add(RawInstance::new(class::ROOT));
        let data_def = g.add(def(class::DATA_DEFINITION));
        let op_def = g.add(def(class::OPERATION_DEFINITION));
        let mut dict = RawInstance::new(class::DICTIONARY);
        dict.set(set(pid::DATA_DEFINITIONS, data_def));
        dict.set(set(pid::OPERATION_DEFINITIONS, op_def));
        let dict = g.add(dict);
        g.instances[root].set(strong(2, dict));

        let r = resolve(g, ClassTable::builtin()).unwrap();
        let to = |collection| WeakRef {
            path: vec![2, pid::DICTIONARY, collection],
            key_pid: pid::IDENTIFICATION,
            key: shared.to_le_bytes().to_vec(),
        };
        let target = |w: &WeakRef| match r.resolve_weak(w) {
            Some(WeakTarget::Object(id)) => r.raw_index(id),
            other => panic!("unexpected target {other:?}"),
        };
        assert_eq!(target(&to(pid::OPERATION_DEFINITIONS)), op_def);
        assert_eq!(target(&to(pid::DATA_DEFINITIONS)), data_def);
        assert_eq!(r.resolve_weak(&to(pid::PARAMETER_DEFINITIONS)), None);
    }
}
