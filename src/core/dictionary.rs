//! Class table: built-in classes merged with a file's extension classes.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use super::codec::read_raw_properties;
use super::schema::{builtin_classes, class, pid, ClassDef, PropertyDef};
use super::stored::*;
use super::types::TypeTag;
use super::value::{decode_string, decode_value, Value};
use crate::cfb::{Container, EntryId};
use crate::util::{Auid, DecodeErrorKind, Error, Result};

/// Guard against parent chains that loop.
const MAX_CLASS_DEPTH: usize = 64;

/// All classes known while decoding or encoding one file.
#[derive(Debug, Clone)]
pub struct ClassTable {
    classes: HashMap<Auid, ClassDef>,
    /// Classes added or extended beyond the built-in model, in registration order.
    extended: Vec<Auid>,
    /// Properties not part of the built-in model.
    extension_props: HashSet<(Auid, u16)>,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ClassTable {
    /// Table holding only the built-in model.
    pub fn builtin() -> Self {
        Self {
            classes: builtin_classes().iter().map(|c| (c.id, c.clone())).collect(),
            extended: Vec::new(),
            extension_props: HashSet::new(),
        }
    }

    pub fn get(&self, id: Auid) -> Option<&ClassDef> {
        self.classes.get(&id)
    }

    pub fn contains(&self, id: Auid) -> bool {
        self.classes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// `id` followed by its ancestors.
    pub fn lineage(&self, id: Auid) -> impl Iterator<Item = &ClassDef> {
        let mut cur = self.classes.get(&id);
        let mut depth = 0;
        std::iter::from_fn(move || {
            let c = cur?;
            depth += 1;
            cur = match c.parent {
                Some(p) if p != c.id && depth < MAX_CLASS_DEPTH => self.classes.get(&p),
                _ => None,
            };
            Some(c)
        })
    }

    /// Property `pid` as declared by `class` or an ancestor.
    pub fn lookup_property(&self, class: Auid, pid: u16) -> Option<&PropertyDef> {
        self.lineage(class).find_map(|c| c.property(pid))
    }

    pub fn all_properties(&self, class: Auid) -> impl Iterator<Item = &PropertyDef> {
        self.lineage(class).flat_map(|c| c.properties.iter())
    }

    /// True if `class` is `ancestor` or derives from it.
    pub fn is_a(&self, class: Auid, ancestor: Auid) -> bool {
        self.lineage(class).any(|c| c.id == ancestor)
    }

    /// Class name, or its AUID when unknown.
    pub fn class_name(&self, id: Auid) -> String {
        self.classes.get(&id).map_or_else(|| id.to_string(), |c| c.name.clone())
    }

    pub fn is_builtin(&self, id: Auid) -> bool {
        builtin_classes().iter().any(|c| c.id == id)
    }

    /// True unless the built-in model declares `pid` on `class` or an ancestor.
    pub fn is_extension_property(&self, class: Auid, pid: u16) -> bool {
        !self.lineage(class).any(|c| {
            builtin_classes()
                .iter()
                .any(|b| b.id == c.id && b.property(pid).is_some())
        })
    }

    /// Class along the lineage of `class` that declares `pid`.
    pub fn declaring_class(&self, class: Auid, pid: u16) -> Option<&ClassDef> {
        self.lineage(class).find(|c| c.property(pid).is_some())
    }

    /// Merge a class definition.
    ///
    /// A new class is added whole. For a known class, only properties whose
    /// pid is not yet declared along its lineage are added.
    pub fn register(&mut self, def: ClassDef) {
        let id = def.id;
        if let Some(existing) = self.classes.get(&id) {
            let new_props: Vec<PropertyDef> = def
                .properties
                .into_iter()
                .filter(|p| self.lookup_property(id, p.pid).is_none())
                .collect();
            if new_props.is_empty() {
                return;
            }
            trace!(class = %existing.name, count = new_props.len(), "extension properties");
            for p in &new_props {
                self.extension_props.insert((id, p.pid));
            }
            if let Some(existing) = self.classes.get_mut(&id) {
                existing.properties.extend(new_props);
            }
        } else {
            trace!(class = %def.name, %id, "extension class");
            for p in &def.properties {
                self.extension_props.insert((id, p.pid));
            }
            self.classes.insert(id, def);
        }
        if !self.extended.contains(&id) {
            self.extended.push(id);
        }
    }

    /// Definitions to write into a file's MetaDictionary: whole extension
    /// classes, and built-in classes carrying only their extension properties.
    pub fn extension_definitions(&self) -> Vec<ClassDef> {
        self.extended
            .iter()
            .filter_map(|id| self.classes.get(id))
            .map(|c| ClassDef {
                properties: c
                    .properties
                    .iter()
                    .filter(|p| self.extension_props.contains(&(c.id, p.pid)))
                    .cloned()
                    .collect(),
                ..c.clone()
            })
            .collect()
    }
}

// ============================================================================
// Loading from a file
// ============================================================================

fn structure(detail: impl Into<String>) -> Error {
    Error::decode(DecodeErrorKind::Structure, detail)
}

struct RawObject {
    props: Vec<(u16, StoredForm, Vec<u8>)>,
}

impl RawObject {
    fn read(c: &Container, id: EntryId) -> Result<Self> {
        Ok(Self { props: read_raw_properties(c, id)? })
    }

    fn get(&self, pid: u16) -> Option<(StoredForm, &[u8])> {
        self.props.iter().find(|(p, _, _)| *p == pid).map(|(_, f, b)| (*f, b.as_slice()))
    }

    fn data(&self, pid: u16, tag: TypeTag) -> Result<Option<Value>> {
        match self.get(pid) {
            Some((StoredForm::Data, b)) => decode_value(b, tag).map(Some),
            Some((form, _)) => Err(Error::decode(
                DecodeErrorKind::PropertyType,
                format!("meta property {pid:#06x} stored as {form}"),
            )),
            None => Ok(None),
        }
    }

    fn auid(&self, pid: u16) -> Result<Auid> {
        match self.data(pid, TypeTag::Auid)? {
            Some(Value::Auid(a)) => Ok(a),
            _ => Err(Error::decode(
                DecodeErrorKind::MissingProperty,
                format!("meta definition lacks identification {pid:#06x}"),
            )),
        }
    }

    fn string(&self, pid: u16) -> Result<Option<String>> {
        match self.get(pid) {
            Some((StoredForm::Data, b)) => decode_string(b).map(Some),
            _ => Ok(None),
        }
    }

    fn boolean(&self, pid: u16) -> Result<Option<bool>> {
        Ok(match self.data(pid, TypeTag::Boolean)? {
            Some(Value::Bool(b)) => Some(b),
            _ => None,
        })
    }

    /// Key of a weak reference property, as an AUID.
    fn weak_auid(&self, pid: u16) -> Result<Option<Auid>> {
        match self.get(pid) {
            Some((StoredForm::WeakRef, b)) => Ok(Auid::from_slice(&WeakKey::parse(b)?.key)),
            _ => Ok(None),
        }
    }

    /// Element storages of a strong set property.
    fn set_elements(&self, c: &Container, storage: EntryId, pid: u16) -> Result<Vec<EntryId>> {
        let Some((form, b)) = self.get(pid) else {
            return Ok(Vec::new());
        };
        if form != StoredForm::StrongRefSet {
            return Err(structure(format!("meta collection {pid:#06x} stored as {form}")));
        }
        let name = decode_name(b)?;
        let index_id = c
            .child(storage, &index_name(&name))
            .ok_or_else(|| Error::decode(DecodeErrorKind::Stream, format!("missing index of {name:?}")))?;
        let index = StrongIndex::parse_set(&c.read_entry(index_id)?)?;
        index
            .entries
            .iter()
            .map(|e| {
                let el = element_name(&name, e.local_key);
                c.child(storage, &el)
                    .ok_or_else(|| structure(format!("missing collection element {el:?}")))
            })
            .collect()
    }
}

fn load_property_def(c: &Container, id: EntryId) -> Result<PropertyDef> {
    let o = RawObject::read(c, id)?;
    let name = o.string(pid::META_NAME)?.unwrap_or_default();
    let local = match o.data(pid::LOCAL_IDENTIFICATION, TypeTag::UInt16)? {
        Some(Value::UInt16(v)) => v,
        _ => return Err(structure(format!("property definition {name:?} has no local id"))),
    };
    let type_id = o.weak_auid(pid::PROPERTY_TYPE)?.unwrap_or(Auid::NIL);
    let tag = TypeTag::from_type_id(type_id);
    let mut def = PropertyDef::new(local, name, tag);
    if tag.type_id() != Some(type_id) {
        def.type_id = Some(type_id);
    }
    def.optional = o.boolean(pid::IS_OPTIONAL)?.unwrap_or(true);
    def.unique = o.boolean(pid::IS_UNIQUE_IDENTIFIER)?.unwrap_or(false);
    Ok(def)
}

fn load_class_def(c: &Container, id: EntryId) -> Result<ClassDef> {
    let o = RawObject::read(c, id)?;
    let class_id = o.auid(pid::META_IDENTIFICATION)?;
    let name = o.string(pid::META_NAME)?.unwrap_or_else(|| class_id.to_string());
    let parent = o.weak_auid(pid::PARENT_CLASS)?.filter(|p| *p != class_id);
    let concrete = o.boolean(pid::IS_CONCRETE)?.unwrap_or(true);
    let properties = o
        .set_elements(c, id, pid::PROPERTIES)?
        .into_iter()
        .map(|p| load_property_def(c, p))
        .collect::<Result<Vec<_>>>()?;
    Ok(ClassDef { id: class_id, name, parent, concrete, properties })
}

/// Storage name of the root's MetaDictionary.
pub fn meta_dictionary_name() -> String {
    mangle_name("MetaDictionary", pid::ROOT_META_DICTIONARY)
}

/// Build the class table of a file: the built-in model plus every class
/// declared in its MetaDictionary.
pub fn load_class_dictionary(c: &Container) -> Result<ClassTable> {
    let mut table = ClassTable::builtin();
    let Some(md) = c.child(c.root(), &meta_dictionary_name()) else {
        debug!("no MetaDictionary, using built-in classes only");
        return Ok(table);
    };
    if c.clsid(md) != class::META_DICTIONARY && !c.clsid(md).is_nil() {
        return Err(structure(format!("MetaDictionary storage has class {}", c.clsid(md))));
    }
    let o = RawObject::read(c, md)?;
    let mut defs = o
        .set_elements(c, md, pid::CLASS_DEFINITIONS)?
        .into_iter()
        .map(|id| load_class_def(c, id))
        .collect::<Result<Vec<_>>>()?;

    // Parents first so extension properties are checked against full lineages.
    let mut registered = 0;
    while !defs.is_empty() {
        let before = defs.len();
        defs.retain(|d| {
            let ready = d.parent.map_or(true, |p| table.contains(p) || p == d.id);
            if ready {
                table.register(d.clone());
                registered += 1;
            }
            !ready
        });
        if defs.len() == before {
            let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
            return Err(structure(format!("classes with undefined parents: {names:?}")));
        }
    }
    debug!(declared = registered, classes = table.len(), "class dictionary loaded");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vendor_class() -> ClassDef {
        ClassDef {
            id: Auid::new(0x1234_5678, 1, 2, [9; 8]),
            name: "VendorEffect".into(),
            parent: Some(class::SEGMENT),
            concrete: true,
            properties: vec![PropertyDef::new(0xFFF0, "Knob", TypeTag::Int32).optional()],
        }
    }

    #[test]
    fn test_lookup_walks_parents() {
        let t = ClassTable::builtin();
        let p = t.lookup_property(class::SOURCE_CLIP, pid::MOB_ID);
        assert!(p.is_none());
        let p = t.lookup_property(class::SOURCE_CLIP, pid::SOURCE_ID).unwrap();
        assert_eq!(p.name, "SourceID");
        assert_eq!(p.references, Some(pid::MOB_ID));
        assert!(t.lookup_property(class::SOURCE_CLIP, pid::DATA_DEFINITION).is_some());
        assert!(t.is_a(class::COMPOSITION_MOB, class::MOB));
        assert!(!t.is_a(class::MOB, class::COMPOSITION_MOB));
    }

    #[test]
    fn test_register_extension() {
        let mut t = ClassTable::builtin();
        t.register(vendor_class());
        assert!(t.is_a(vendor_class().id, class::COMPONENT));
        assert_eq!(t.class_name(vendor_class().id), "VendorEffect");

        // Redeclaring a built-in class only adds new pids.
        let mut filler = t.get(class::FILLER).unwrap().clone();
        filler.properties.push(PropertyDef::new(0xFFF1, "Tint", TypeTag::UInt8).optional());
        filler.properties.push(PropertyDef::new(pid::LENGTH, "Length", TypeTag::Int64));
        t.register(filler);

        let ext = t.extension_definitions();
        assert_eq!(ext.len(), 2);
        assert_eq!(ext[0].properties.len(), 1);
        assert_eq!(ext[1].id, class::FILLER);
        assert_eq!(ext[1].properties.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![0xFFF1]);
        assert!(ClassTable::builtin().extension_definitions().is_empty());
    }
}
