//! Programmatic construction of a [`RawGraph`] for encoding.
//!
//! Every setter checks the property against the class table so that a
//! graph that builds also encodes. Strong reference storage names are
//! derived from the declared property name.

use super::raw::{RawGraph, RawInstance, RawProperty, RawValue};
use crate::core::{class, mangle_name, pid, ClassTable, PropertyDef, TypeTag, Value, WeakRef};
use crate::util::{Auid, EncodeErrorKind, Error, Result};

fn unsupported(detail: impl Into<String>) -> Error {
    Error::encode(EncodeErrorKind::UnsupportedConstruct, detail)
}

/// Weak reference to an entry of one of the Dictionary's definition sets.
pub fn definition_ref(collection_pid: u16, id: Auid) -> WeakRef {
    WeakRef {
        path: vec![pid::ROOT_HEADER, pid::DICTIONARY, collection_pid],
        key_pid: pid::IDENTIFICATION,
        key: id.to_le_bytes().to_vec(),
    }
}

/// Weak reference to a class or type definition of the MetaDictionary.
pub fn meta_ref(collection_pid: u16, id: Auid) -> WeakRef {
    WeakRef {
        path: vec![pid::ROOT_META_DICTIONARY, collection_pid],
        key_pid: pid::META_IDENTIFICATION,
        key: id.to_le_bytes().to_vec(),
    }
}

/// Incrementally builds an object graph rooted at a Root object.
#[derive(Debug)]
pub struct GraphBuilder {
    table: ClassTable,
    graph: RawGraph,
}

impl GraphBuilder {
    pub fn new(table: ClassTable) -> Self {
        let mut graph = RawGraph::default();
        graph.root = graph.add(RawInstance::new(class::ROOT));
        Self { table, graph }
    }

    pub fn table(&self) -> &ClassTable {
        &self.table
    }

    /// Class table to extend before objects of new classes are added.
    pub fn table_mut(&mut self) -> &mut ClassTable {
        &mut self.table
    }

    pub fn root(&self) -> usize {
        self.graph.root
    }

    pub fn instance(&self, obj: usize) -> Option<&RawInstance> {
        self.graph.get(obj)
    }

    /// New unattached object of a known class.
    pub fn add(&mut self, class: Auid) -> Result<usize> {
        match self.table.get(class) {
            Some(def) if def.concrete => Ok(self.graph.add(RawInstance::new(class))),
            Some(def) => Err(unsupported(format!("{} is abstract", def.name))),
            None => Err(unsupported(format!("class {class} is not in the class table"))),
        }
    }

    fn class_of(&self, obj: usize) -> Result<Auid> {
        self.graph
            .get(obj)
            .map(|i| i.class)
            .ok_or_else(|| Error::encode(EncodeErrorKind::Layout, format!("object #{obj} does not exist")))
    }

    fn def(&self, obj: usize, pid: u16) -> Result<PropertyDef> {
        let class = self.class_of(obj)?;
        self.table.lookup_property(class, pid).cloned().ok_or_else(|| {
            unsupported(format!("{} has no property {pid:#06x}", self.table.class_name(class)))
        })
    }

    fn put(&mut self, obj: usize, prop: RawProperty) {
        self.graph.instances[obj].set(prop);
    }

    /// Set a data property.
    pub fn set(&mut self, obj: usize, pid: u16, value: impl Into<Value>) -> Result<()> {
        let def = self.def(obj, pid)?;
        let value = value.into();
        if !matches!(def.tag, TypeTag::Opaque(_)) && value.type_tag() != def.tag {
            return Err(unsupported(format!("{} expects {:?}, got {:?}", def.name, def.tag, value.type_tag())));
        }
        self.put(obj, RawProperty::new(pid, RawValue::Data(value)));
        Ok(())
    }

    /// Set a property to an already formed value without checks.
    pub fn set_raw(&mut self, obj: usize, pid: u16, value: RawValue) -> Result<()> {
        self.class_of(obj)?;
        self.put(obj, RawProperty::new(pid, value));
        Ok(())
    }

    fn expect(&self, def: &PropertyDef, want: fn(&TypeTag) -> bool) -> Result<()> {
        if want(&def.tag) {
            Ok(())
        } else {
            Err(unsupported(format!("{} is declared {:?}", def.name, def.tag)))
        }
    }

    pub fn set_strong(&mut self, obj: usize, pid: u16, child: usize) -> Result<()> {
        let def = self.def(obj, pid)?;
        self.expect(&def, |t| matches!(t, TypeTag::StrongRef))?;
        self.class_of(child)?;
        let name = mangle_name(&def.name, pid);
        self.put(obj, RawProperty::new(pid, RawValue::Strong { name, target: child }));
        Ok(())
    }

    /// Append to a strong vector, creating it on first use.
    pub fn push_strong(&mut self, obj: usize, pid: u16, child: usize) -> Result<()> {
        let def = self.def(obj, pid)?;
        self.expect(&def, |t| matches!(t, TypeTag::StrongRefVector))?;
        self.class_of(child)?;
        match self.graph.instances[obj].get_mut(pid).map(|p| &mut p.value) {
            Some(RawValue::StrongVector { elements, .. }) => elements.push(child),
            _ => {
                let name = mangle_name(&def.name, pid);
                self.put(obj, RawProperty::new(pid, RawValue::StrongVector { name, elements: vec![child] }));
            }
        }
        Ok(())
    }

    /// Add to a strong set, creating it on first use.
    pub fn insert_strong(&mut self, obj: usize, pid: u16, child: usize) -> Result<()> {
        let def = self.def(obj, pid)?;
        let TypeTag::StrongRefSet { key_pid } = def.tag else {
            return Err(unsupported(format!("{} is declared {:?}", def.name, def.tag)));
        };
        self.class_of(child)?;
        match self.graph.instances[obj].get_mut(pid).map(|p| &mut p.value) {
            Some(RawValue::StrongSet { elements, .. }) => elements.push(child),
            _ => {
                let name = mangle_name(&def.name, pid);
                self.put(obj, RawProperty::new(pid, RawValue::StrongSet { name, key_pid, elements: vec![child] }));
            }
        }
        Ok(())
    }

    pub fn set_weak(&mut self, obj: usize, pid: u16, target: WeakRef) -> Result<()> {
        let def = self.def(obj, pid)?;
        self.expect(&def, |t| matches!(t, TypeTag::WeakRef))?;
        self.put(obj, RawProperty::new(pid, RawValue::Weak(target)));
        Ok(())
    }

    pub fn push_weak(&mut self, obj: usize, pid: u16, target: WeakRef) -> Result<()> {
        let def = self.def(obj, pid)?;
        self.expect(&def, |t| matches!(t, TypeTag::WeakRefVector))?;
        match self.graph.instances[obj].get_mut(pid).map(|p| &mut p.value) {
            Some(RawValue::WeakVector { refs, .. }) => refs.push(target),
            _ => {
                let name = mangle_name(&def.name, pid);
                self.put(obj, RawProperty::new(pid, RawValue::WeakVector { name, refs: vec![target] }));
            }
        }
        Ok(())
    }

    pub fn insert_weak(&mut self, obj: usize, pid: u16, target: WeakRef) -> Result<()> {
        let def = self.def(obj, pid)?;
        self.expect(&def, |t| matches!(t, TypeTag::WeakRefSet))?;
        match self.graph.instances[obj].get_mut(pid).map(|p| &mut p.value) {
            Some(RawValue::WeakSet { refs, .. }) => {
                if !refs.contains(&target) {
                    refs.push(target);
                }
            }
            _ => {
                let name = mangle_name(&def.name, pid);
                self.put(obj, RawProperty::new(pid, RawValue::WeakSet { name, refs: vec![target] }));
            }
        }
        Ok(())
    }

    pub fn finish(self) -> (RawGraph, ClassTable) {
        (self.graph, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::datadef;

    #[test]
    fn test_checked_setters() {
        let mut b = GraphBuilder::new(ClassTable::builtin());
        let seq = b.add(class::SEQUENCE).unwrap();
        let fill = b.add(class::FILLER).unwrap();
        b.set(fill, pid::LENGTH, Value::Int64(24)).unwrap();
        b.set_weak(fill, pid::DATA_DEFINITION, definition_ref(pid::DATA_DEFINITIONS, datadef::PICTURE))
            .unwrap();
        b.push_strong(seq, pid::COMPONENTS, fill).unwrap();

        assert!(b.add(class::SEGMENT).is_err());
        let err = b.set(fill, pid::LENGTH, Value::Int32(24)).unwrap_err();
        assert_eq!(err.encode_kind(), Some(EncodeErrorKind::UnsupportedConstruct));
        assert!(b.set_strong(seq, pid::COMPONENTS, fill).is_err());
        assert!(b.set(fill, pid::MOB_ID, Value::Int64(1)).is_err());

        let (g, _) = b.finish();
        match &g.instances[seq].get(pid::COMPONENTS).unwrap().value {
            RawValue::StrongVector { name, elements } => {
                assert_eq!(name, "Components-1001");
                assert_eq!(elements, &vec![fill]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_set_key() {
        let mut b = GraphBuilder::new(ClassTable::builtin());
        let content = b.add(class::CONTENT_STORAGE).unwrap();
        let mob = b.add(class::MASTER_MOB).unwrap();
        b.insert_strong(content, pid::MOBS, mob).unwrap();
        let (g, _) = b.finish();
        assert!(matches!(
            g.instances[content].get(pid::MOBS).unwrap().value,
            RawValue::StrongSet { key_pid: pid::MOB_ID, .. }
        ));
    }
}
