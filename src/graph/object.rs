//! Typed read access to objects of a [`ResolvedGraph`].

use interchange::Rational;

use super::raw::{RawInstance, RawValue};
use super::resolve::{ObjectId, ResolvedGraph, WeakTarget};
use crate::core::{Indirect, Value, WeakRef};
use crate::util::{Auid, MobId};

/// Borrowed view of one object.
#[derive(Clone, Copy)]
pub struct ObjectRef<'g> {
    graph: &'g ResolvedGraph,
    id: ObjectId,
}

impl std::fmt::Debug for ObjectRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.class_name(), self.id.0)
    }
}

impl ResolvedGraph {
    pub fn object(&self, id: ObjectId) -> ObjectRef<'_> {
        ObjectRef { graph: self, id }
    }

    pub fn root_object(&self) -> ObjectRef<'_> {
        self.object(self.root())
    }
}

impl<'g> ObjectRef<'g> {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn graph(&self) -> &'g ResolvedGraph {
        self.graph
    }

    pub fn instance(&self) -> &'g RawInstance {
        &self.graph.raw.instances[self.graph.raw_index(self.id)]
    }

    pub fn class(&self) -> Auid {
        self.instance().class
    }

    pub fn class_name(&self) -> String {
        self.graph.table.class_name(self.class())
    }

    pub fn is_a(&self, class: Auid) -> bool {
        self.graph.table.is_a(self.class(), class)
    }

    pub fn parent(&self) -> Option<ObjectRef<'g>> {
        self.graph.parent(self.id).map(|p| self.graph.object(p))
    }

    pub fn has(&self, pid: u16) -> bool {
        self.instance().get(pid).is_some()
    }

    pub fn raw(&self, pid: u16) -> Option<&'g RawValue> {
        self.instance().get(pid).map(|p| &p.value)
    }

    pub fn data(&self, pid: u16) -> Option<&'g Value> {
        self.instance().data(pid)
    }

    pub fn string(&self, pid: u16) -> Option<&'g str> {
        self.data(pid)?.as_str()
    }

    pub fn i64(&self, pid: u16) -> Option<i64> {
        self.data(pid)?.as_i64()
    }

    pub fn u32(&self, pid: u16) -> Option<u32> {
        self.i64(pid).and_then(|v| u32::try_from(v).ok())
    }

    pub fn bool(&self, pid: u16) -> Option<bool> {
        match self.data(pid)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn rational(&self, pid: u16) -> Option<Rational> {
        match self.data(pid)? {
            Value::Rational(r) => Some(*r),
            _ => None,
        }
    }

    pub fn auid(&self, pid: u16) -> Option<Auid> {
        match self.data(pid)? {
            Value::Auid(a) => Some(*a),
            _ => None,
        }
    }

    pub fn mob_id(&self, pid: u16) -> Option<MobId> {
        self.instance().mob_id(pid)
    }

    pub fn indirect(&self, pid: u16) -> Option<&'g Indirect> {
        match self.data(pid)? {
            Value::Indirect(i) => Some(i),
            _ => None,
        }
    }

    fn to_object(&self, raw: usize) -> Option<ObjectRef<'g>> {
        self.graph.object_of(raw).map(|id| self.graph.object(id))
    }

    /// Target of a single strong reference.
    pub fn strong(&self, pid: u16) -> Option<ObjectRef<'g>> {
        match self.raw(pid)? {
            RawValue::Strong { target, .. } => self.to_object(*target),
            _ => None,
        }
    }

    /// Elements of a strong vector or set; empty when absent.
    pub fn strong_vec(&self, pid: u16) -> Vec<ObjectRef<'g>> {
        match self.raw(pid) {
            Some(RawValue::StrongVector { elements, .. } | RawValue::StrongSet { elements, .. }) => {
                elements.iter().filter_map(|&e| self.to_object(e)).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn weak(&self, pid: u16) -> Option<&'g WeakRef> {
        match self.raw(pid)? {
            RawValue::Weak(w) => Some(w),
            _ => None,
        }
    }

    pub fn weak_target(&self, pid: u16) -> Option<WeakTarget> {
        self.graph.resolve_weak(self.weak(pid)?)
    }

    /// Object a weak reference points at, if the file contains it.
    pub fn weak_object(&self, pid: u16) -> Option<ObjectRef<'g>> {
        match self.weak_target(pid)? {
            WeakTarget::Object(id) => Some(self.graph.object(id)),
            WeakTarget::Builtin(_) => None,
        }
    }

    /// Key of a weak reference, as an AUID.
    pub fn weak_auid(&self, pid: u16) -> Option<Auid> {
        Auid::from_slice(&self.weak(pid)?.key)
    }

    /// Mob a MobID-valued property names.
    pub fn referenced_mob(&self, pid: u16) -> Option<ObjectRef<'g>> {
        let id = self.mob_id(pid)?;
        self.graph.mob(id).map(|m| self.graph.object(m))
    }
}
