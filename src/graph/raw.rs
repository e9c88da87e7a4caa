//! Unresolved object graph: decoded instances linked by arena indices.

use smallvec::SmallVec;

use crate::core::{StoredForm, Value, WeakRef};
use crate::util::{Auid, MobId};

/// Value of a property in a [`RawGraph`]. Strong targets are instance indices.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Data(Value),
    /// Bytes of an unknown pid or type.
    Opaque(Vec<u8>),
    Strong { name: String, target: usize },
    StrongVector { name: String, elements: Vec<usize> },
    StrongSet { name: String, key_pid: u16, elements: Vec<usize> },
    Weak(WeakRef),
    WeakVector { name: String, refs: Vec<WeakRef> },
    WeakSet { name: String, refs: Vec<WeakRef> },
    Stream { name: String, bytes: Vec<u8> },
}

impl RawValue {
    /// Stored form this value is written with.
    pub fn form(&self) -> StoredForm {
        match self {
            Self::Data(_) | Self::Opaque(_) => StoredForm::Data,
            Self::Strong { .. } => StoredForm::StrongRef,
            Self::StrongVector { .. } => StoredForm::StrongRefVector,
            Self::StrongSet { .. } => StoredForm::StrongRefSet,
            Self::Weak(_) => StoredForm::WeakRef,
            Self::WeakVector { .. } => StoredForm::WeakRefVector,
            Self::WeakSet { .. } => StoredForm::WeakRefSet,
            Self::Stream { .. } => StoredForm::DataStream,
        }
    }

    /// Owned instances, in order.
    pub fn strong_targets(&self) -> &[usize] {
        match self {
            Self::Strong { target, .. } => std::slice::from_ref(target),
            Self::StrongVector { elements, .. } | Self::StrongSet { elements, .. } => elements,
            _ => &[],
        }
    }

    /// Weak references held by this value.
    pub fn weak_refs(&self) -> &[WeakRef] {
        match self {
            Self::Weak(w) => std::slice::from_ref(w),
            Self::WeakVector { refs, .. } | Self::WeakSet { refs, .. } => refs,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawProperty {
    pub pid: u16,
    pub value: RawValue,
}

impl RawProperty {
    pub fn new(pid: u16, value: RawValue) -> Self {
        Self { pid, value }
    }

    #[inline]
    pub fn form(&self) -> StoredForm {
        self.value.form()
    }
}

/// One object: its class and properties in stored order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawInstance {
    pub class: Auid,
    /// Storage path it was read from; empty for built graphs.
    pub path: String,
    pub properties: SmallVec<[RawProperty; 8]>,
}

impl RawInstance {
    pub fn new(class: Auid) -> Self {
        Self { class, path: String::new(), properties: SmallVec::new() }
    }

    pub fn get(&self, pid: u16) -> Option<&RawProperty> {
        self.properties.iter().find(|p| p.pid == pid)
    }

    pub fn get_mut(&mut self, pid: u16) -> Option<&mut RawProperty> {
        self.properties.iter_mut().find(|p| p.pid == pid)
    }

    /// Insert or replace a property, keeping first-insertion order.
    pub fn set(&mut self, prop: RawProperty) {
        match self.get_mut(prop.pid) {
            Some(p) => *p = prop,
            None => self.properties.push(prop),
        }
    }

    pub fn data(&self, pid: u16) -> Option<&Value> {
        match &self.get(pid)?.value {
            RawValue::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn mob_id(&self, pid: u16) -> Option<MobId> {
        match self.data(pid)? {
            Value::MobId(m) => Some(*m),
            _ => None,
        }
    }

    /// All owned instances with the pid of the property owning each, property by property.
    pub fn strong_children(&self) -> impl Iterator<Item = (u16, usize)> + '_ {
        self.properties
            .iter()
            .flat_map(|p| p.value.strong_targets().iter().map(move |&t| (p.pid, t)))
    }
}

/// Arena of instances with a designated root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawGraph {
    pub instances: Vec<RawInstance>,
    pub root: usize,
}

impl RawGraph {
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn add(&mut self, instance: RawInstance) -> usize {
        self.instances.push(instance);
        self.instances.len() - 1
    }

    pub fn get(&self, idx: usize) -> Option<&RawInstance> {
        self.instances.get(idx)
    }
}
