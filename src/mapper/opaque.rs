//! Preserved object subtrees.
//!
//! Objects the mapper has no timeline counterpart for are captured into a
//! [`MetadataValue`] payload and rebuilt verbatim by the encoder:
//!
//! ```text
//! { class, className, properties: [ { pid, form, ...value } ],
//!   classes: [ ClassDef ], definitions: [ { collection, object } ], mobs: [ object ] }
//! ```
//!
//! Data values are kept as their stored bytes. Strong references nest their
//! target objects, weak references keep `(path, keyPid, key)`. Definitions
//! and mobs the subtree points at are captured alongside so the rebuilt file
//! resolves. Unknown properties of mapped objects use the same property
//! layout under the reserved metadata key.

use std::collections::HashSet;

use interchange::{Metadata, MetadataValue};
use tracing::{trace, warn};

use super::encode::EncodeCx;
use super::metadata::RESERVED_KEY;
use crate::core::{
    class, encode_value, is_builtin_definition, pid, typeid, ClassDef, PropertyDef, StoredForm, TypeTag, Value, WeakRef,
};
use crate::graph::{meta_ref, GraphBuilder, ObjectId, ObjectRef, RawValue, ResolvedGraph, WeakTarget};
use crate::util::{Auid, EncodeErrorKind, Error, MobId, Result};

/// Deepest object nesting a payload may hold.
const MAX_DEPTH: usize = 256;

const EXTENSIONS: &str = "extensions";

fn int(v: impl Into<i64>) -> MetadataValue {
    MetadataValue::Int(v.into())
}

fn map<const N: usize>(entries: [(&str, MetadataValue); N]) -> Metadata {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

// ============================================================================
// Capture
// ============================================================================

fn weak_value(w: &WeakRef) -> MetadataValue {
    MetadataValue::Map(map([
        ("path", MetadataValue::List(w.path.iter().map(|&p| int(p)).collect())),
        ("keyPid", int(w.key_pid)),
        ("key", MetadataValue::Bytes(w.key.clone())),
    ]))
}

fn property_def_value(p: &PropertyDef) -> MetadataValue {
    let mut m = map([
        ("pid", int(p.pid)),
        ("name", p.name.as_str().into()),
        ("form", p.tag.stored_form().as_str().into()),
        ("optional", p.optional.into()),
        ("unique", p.unique.into()),
    ]);
    match p.tag {
        TypeTag::StrongRefSet { key_pid } => {
            m.insert("keyPid".into(), int(key_pid));
        }
        tag if tag.stored_form() == StoredForm::Data => {
            let ty = p.declared_type().or(match tag {
                TypeTag::Opaque(id) => Some(id),
                _ => None,
            });
            if let Some(ty) = ty {
                m.insert("type".into(), ty.to_string().into());
            }
        }
        _ => {}
    }
    MetadataValue::Map(m)
}

fn class_value(c: &ClassDef) -> MetadataValue {
    MetadataValue::Map(map([
        ("id", c.id.to_string().into()),
        ("name", c.name.as_str().into()),
        ("parent", c.parent.map_or(MetadataValue::Null, |p| p.to_string().into())),
        ("concrete", c.concrete.into()),
        ("properties", MetadataValue::List(c.properties.iter().map(property_def_value).collect())),
    ]))
}

/// Walks objects into payload values, collecting what they depend on.
struct Capture<'g> {
    graph: &'g ResolvedGraph,
    weak: Vec<WeakRef>,
    mobs: Vec<MobId>,
    classes: HashSet<Auid>,
}

impl<'g> Capture<'g> {
    fn new(graph: &'g ResolvedGraph) -> Self {
        Self { graph, weak: Vec::new(), mobs: Vec::new(), classes: HashSet::new() }
    }

    fn object(&mut self, obj: ObjectRef<'g>, depth: usize) -> Result<MetadataValue> {
        if depth > MAX_DEPTH {
            return Err(Error::invalid(format!("{obj:?} is nested more than {MAX_DEPTH} objects deep")));
        }
        self.classes.insert(obj.class());
        let mut props = Vec::with_capacity(obj.instance().properties.len());
        for p in &obj.instance().properties {
            props.push(MetadataValue::Map(self.property(obj, p.pid, &p.value, depth)?));
        }
        Ok(MetadataValue::Map(map([
            ("class", obj.class().to_string().into()),
            ("className", obj.class_name().into()),
            ("properties", MetadataValue::List(props)),
        ])))
    }

    fn child(&mut self, raw: usize, depth: usize) -> Result<MetadataValue> {
        let g = self.graph;
        let id = g
            .object_of(raw)
            .ok_or_else(|| Error::invalid(format!("instance #{raw} is not reachable from the root")))?;
        self.object(g.object(id), depth + 1)
    }

    fn children(&mut self, elements: &[usize], depth: usize) -> Result<MetadataValue> {
        let mut out = Vec::with_capacity(elements.len());
        for &e in elements {
            out.push(self.child(e, depth)?);
        }
        Ok(MetadataValue::List(out))
    }

    fn property(&mut self, obj: ObjectRef<'g>, pid: u16, value: &'g RawValue, depth: usize) -> Result<Metadata> {
        let mut m = map([("pid", int(pid)), ("form", value.form().as_str().into())]);
        let mut put = |k: &str, v: MetadataValue| {
            m.insert(k.to_string(), v);
        };
        match value {
            RawValue::Data(v) => {
                if let Value::MobId(id) = v {
                    let refers = self.graph.table.lookup_property(obj.class(), pid);
                    if refers.is_some_and(|d| d.references == Some(pid::MOB_ID)) {
                        self.mobs.push(*id);
                    }
                }
                put("bytes", MetadataValue::Bytes(encode_value(v)));
            }
            RawValue::Opaque(b) => put("bytes", MetadataValue::Bytes(b.clone())),
            RawValue::Stream { name, bytes } => {
                put("name", name.as_str().into());
                put("bytes", MetadataValue::Bytes(bytes.clone()));
            }
            RawValue::Strong { name, target } => {
                put("name", name.as_str().into());
                put("object", self.child(*target, depth)?);
            }
            RawValue::StrongVector { name, elements } => {
                put("name", name.as_str().into());
                put("objects", self.children(elements, depth)?);
            }
            RawValue::StrongSet { name, key_pid, elements } => {
                put("name", name.as_str().into());
                put("keyPid", int(*key_pid));
                put("objects", self.children(elements, depth)?);
            }
            RawValue::Weak(w) => {
                self.weak.push(w.clone());
                put("ref", weak_value(w));
            }
            RawValue::WeakVector { name, refs } | RawValue::WeakSet { name, refs } => {
                self.weak.extend(refs.iter().cloned());
                put("name", name.as_str().into());
                put("refs", MetadataValue::List(refs.iter().map(weak_value).collect()));
            }
        }
        Ok(m)
    }

    /// Capture the definitions, mobs and extension classes everything
    /// captured so far depends on, into `out`.
    fn support(mut self, skip_mobs: &[MobId], out: &mut Metadata) -> Result<()> {
        let g = self.graph;
        let mut definitions = Vec::new();
        let mut mobs = Vec::new();
        let mut seen_defs: HashSet<ObjectId> = HashSet::new();
        let mut seen_mobs: HashSet<MobId> = skip_mobs.iter().copied().collect();
        let (mut wi, mut mi) = (0, 0);

        while wi < self.weak.len() || mi < self.mobs.len() {
            if wi < self.weak.len() {
                let w = self.weak[wi].clone();
                wi += 1;
                let in_dictionary = w.path.len() == 3 && w.path[..2] == [pid::ROOT_HEADER, pid::DICTIONARY];
                // well-known definitions resolve without a declaration
                if !in_dictionary || is_builtin_definition(w.key_pid, &w.key) {
                    continue;
                }
                if let Some(WeakTarget::Object(id)) = g.resolve_weak(&w) {
                    if seen_defs.insert(id) {
                        let object = self.object(g.object(id), 0)?;
                        definitions.push(MetadataValue::Map(map([("collection", int(w.path[2])), ("object", object)])));
                    }
                }
                continue;
            }
            let m = self.mobs[mi];
            mi += 1;
            if m.is_zero() || !seen_mobs.insert(m) {
                continue;
            }
            if let Some(id) = g.mob(m) {
                mobs.push(self.object(g.object(id), 0)?);
            }
        }

        let mut wanted = HashSet::new();
        for c in &self.classes {
            wanted.extend(g.table.lineage(*c).map(|d| d.id));
        }
        let classes: Vec<_> = g
            .table
            .extension_definitions()
            .iter()
            .filter(|d| wanted.contains(&d.id))
            .map(class_value)
            .collect();

        if !classes.is_empty() {
            out.insert("classes".into(), MetadataValue::List(classes));
        }
        if !definitions.is_empty() {
            out.insert("definitions".into(), MetadataValue::List(definitions));
        }
        if !mobs.is_empty() {
            out.insert("mobs".into(), MetadataValue::List(mobs));
        }
        Ok(())
    }
}

/// Mobs owning `obj`, which a payload must not copy.
fn enclosing_mobs(obj: &ObjectRef<'_>) -> Vec<MobId> {
    let mut out = Vec::new();
    let mut cur = obj.parent();
    while let Some(p) = cur {
        if let Some(id) = p.mob_id(pid::MOB_ID).filter(|_| p.is_a(class::MOB)) {
            out.push(id);
        }
        cur = p.parent();
    }
    out
}

/// Payload preserving `obj` and everything it owns or names.
pub fn capture(obj: ObjectRef<'_>) -> Result<MetadataValue> {
    let mut cap = Capture::new(obj.graph());
    let MetadataValue::Map(mut out) = cap.object(obj, 0)? else {
        return Err(Error::invalid("object payload is not a map"));
    };
    cap.support(&enclosing_mobs(&obj), &mut out)?;
    trace!(object = ?obj, "captured opaque payload");
    Ok(MetadataValue::Map(out))
}

/// Properties of a mapped object that the built-in model does not declare,
/// as the value of the reserved metadata key.
pub fn capture_extensions(obj: ObjectRef<'_>) -> Result<Option<MetadataValue>> {
    let g = obj.graph();
    let mut cap = Capture::new(g);
    let mut entries = Vec::new();
    for p in &obj.instance().properties {
        if !g.table.is_extension_property(obj.class(), p.pid) {
            continue;
        }
        let mut entry = cap.property(obj, p.pid, &p.value, 0)?;
        if let Some(def) = g.table.lookup_property(obj.class(), p.pid) {
            entry.insert("definition".into(), property_def_value(def));
        }
        entries.push(MetadataValue::Map(entry));
    }
    if entries.is_empty() {
        return Ok(None);
    }
    trace!(object = ?obj, count = entries.len(), "extension properties preserved");
    let mut out = map([(EXTENSIONS, MetadataValue::List(entries))]);
    cap.support(&enclosing_mobs(&obj), &mut out)?;
    Ok(Some(MetadataValue::Map(out)))
}

// ============================================================================
// Rebuild
// ============================================================================

fn bad(detail: impl Into<String>) -> Error {
    Error::encode(EncodeErrorKind::InvalidOpaquePayload, detail)
}

/// Typed access to the fields of a payload map.
#[derive(Clone, Copy)]
struct Fields<'a>(&'a Metadata);

impl<'a> Fields<'a> {
    fn of(v: &'a MetadataValue, what: &str) -> Result<Self> {
        v.as_map().map(Self).ok_or_else(|| bad(format!("{what} is not a map")))
    }

    fn get(self, key: &str) -> Result<&'a MetadataValue> {
        self.0.get(key).ok_or_else(|| bad(format!("missing field {key:?}")))
    }

    fn str(self, key: &str) -> Result<&'a str> {
        self.get(key)?.as_str().ok_or_else(|| bad(format!("field {key:?} is not a string")))
    }

    fn int(self, key: &str) -> Result<i64> {
        self.get(key)?.as_int().ok_or_else(|| bad(format!("field {key:?} is not an integer")))
    }

    fn pid(self, key: &str) -> Result<u16> {
        u16::try_from(self.int(key)?).map_err(|_| bad(format!("field {key:?} is not a pid")))
    }

    fn bool(self, key: &str) -> Result<bool> {
        self.get(key)?.as_bool().ok_or_else(|| bad(format!("field {key:?} is not a boolean")))
    }

    fn bytes(self, key: &str) -> Result<Vec<u8>> {
        self.get(key)?
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| bad(format!("field {key:?} is not bytes")))
    }

    fn list(self, key: &str) -> Result<&'a [MetadataValue]> {
        self.get(key)?.as_list().ok_or_else(|| bad(format!("field {key:?} is not a list")))
    }

    /// List that may be absent.
    fn opt_list(self, key: &str) -> Result<&'a [MetadataValue]> {
        match self.0.get(key) {
            None => Ok(&[]),
            Some(_) => self.list(key),
        }
    }

    fn auid(self, key: &str) -> Result<Auid> {
        let s = self.str(key)?;
        s.parse().map_err(|_| bad(format!("field {key:?} is not an AUID: {s}")))
    }

    fn form(self) -> Result<StoredForm> {
        let s = self.str("form")?;
        StoredForm::from_name(s).ok_or_else(|| bad(format!("unknown stored form {s:?}")))
    }
}

fn parse_weak(v: &MetadataValue) -> Result<WeakRef> {
    let f = Fields::of(v, "weak reference")?;
    let path = f
        .list("path")?
        .iter()
        .map(|p| p.as_int().and_then(|i| u16::try_from(i).ok()).ok_or_else(|| bad("weak reference path holds a non-pid")))
        .collect::<Result<Vec<_>>>()?;
    Ok(WeakRef { path, key_pid: f.pid("keyPid")?, key: f.bytes("key")? })
}

fn parse_property_def(v: &MetadataValue) -> Result<PropertyDef> {
    let f = Fields::of(v, "property definition")?;
    let tag = match f.form()? {
        StoredForm::Data => match f.0.get("type") {
            Some(_) => TypeTag::from_type_id(f.auid("type")?),
            None => TypeTag::Opaque(typeid::OPAQUE),
        },
        StoredForm::DataStream => TypeTag::Stream,
        StoredForm::StrongRef => TypeTag::StrongRef,
        StoredForm::StrongRefVector => TypeTag::StrongRefVector,
        StoredForm::StrongRefSet => TypeTag::StrongRefSet { key_pid: f.pid("keyPid")? },
        StoredForm::WeakRef => TypeTag::WeakRef,
        StoredForm::WeakRefVector => TypeTag::WeakRefVector,
        StoredForm::WeakRefSet => TypeTag::WeakRefSet,
    };
    let mut def = PropertyDef::new(f.pid("pid")?, f.str("name")?, tag);
    def.optional = f.bool("optional")?;
    def.unique = f.bool("unique")?;
    Ok(def)
}

fn parse_class(v: &MetadataValue) -> Result<ClassDef> {
    let f = Fields::of(v, "class")?;
    let parent = match f.get("parent")? {
        MetadataValue::Null => None,
        _ => Some(f.auid("parent")?),
    };
    Ok(ClassDef {
        id: f.auid("id")?,
        name: f.str("name")?.to_string(),
        parent,
        concrete: f.bool("concrete")?,
        properties: f.list("properties")?.iter().map(parse_property_def).collect::<Result<_>>()?,
    })
}

fn key_of(object: &MetadataValue, key_pid: u16) -> Result<Vec<u8>> {
    let f = Fields::of(object, "object")?;
    for p in f.list("properties")? {
        let pf = Fields::of(p, "property")?;
        if pf.pid("pid")? == key_pid {
            return pf.bytes("bytes");
        }
    }
    Err(bad(format!("object of class {} has no key {key_pid:#06x}", f.str("class")?)))
}

impl EncodeCx<'_> {
    fn rebuild_object(&mut self, v: &MetadataValue, depth: usize) -> Result<usize> {
        if depth > MAX_DEPTH {
            return Err(bad(format!("objects nested more than {MAX_DEPTH} deep")));
        }
        let f = Fields::of(v, "object")?;
        let class = f.auid("class")?;
        if !self.b.table().contains(class) {
            return Err(bad(format!("class {class} ({}) is not declared", f.str("className").unwrap_or("?"))));
        }
        let obj = self.b.add(class)?;
        for p in f.list("properties")? {
            let (pid, value) = self.rebuild_property(p, depth)?;
            self.b.set_raw(obj, pid, value)?;
        }
        Ok(obj)
    }

    fn rebuild_objects(&mut self, list: &[MetadataValue], depth: usize) -> Result<Vec<usize>> {
        list.iter().map(|o| self.rebuild_object(o, depth + 1)).collect()
    }

    fn rebuild_property(&mut self, v: &MetadataValue, depth: usize) -> Result<(u16, RawValue)> {
        let f = Fields::of(v, "property")?;
        let pid = f.pid("pid")?;
        let name = || f.str("name").map(str::to_string);
        let value = match f.form()? {
            StoredForm::Data => RawValue::Opaque(f.bytes("bytes")?),
            StoredForm::DataStream => RawValue::Stream { name: name()?, bytes: f.bytes("bytes")? },
            StoredForm::StrongRef => {
                let target = self.rebuild_object(f.get("object")?, depth + 1)?;
                RawValue::Strong { name: name()?, target }
            }
            StoredForm::StrongRefVector => {
                let elements = self.rebuild_objects(f.list("objects")?, depth)?;
                RawValue::StrongVector { name: name()?, elements }
            }
            StoredForm::StrongRefSet => {
                let elements = self.rebuild_objects(f.list("objects")?, depth)?;
                RawValue::StrongSet { name: name()?, key_pid: f.pid("keyPid")?, elements }
            }
            StoredForm::WeakRef => RawValue::Weak(parse_weak(f.get("ref")?)?),
            StoredForm::WeakRefVector => RawValue::WeakVector {
                name: name()?,
                refs: f.list("refs")?.iter().map(parse_weak).collect::<Result<_>>()?,
            },
            StoredForm::WeakRefSet => RawValue::WeakSet {
                name: name()?,
                refs: f.list("refs")?.iter().map(parse_weak).collect::<Result<_>>()?,
            },
        };
        Ok((pid, value))
    }

    /// Register classes, then add definitions and mobs not already written.
    fn rebuild_support(&mut self, f: Fields<'_>) -> Result<()> {
        for c in f.opt_list("classes")? {
            let def = parse_class(c)?;
            self.b.table_mut().register(def);
        }
        for d in f.opt_list("definitions")? {
            let df = Fields::of(d, "definition")?;
            let collection = df.pid("collection")?;
            let object = df.get("object")?;
            let key = key_of(object, pid::IDENTIFICATION)?;
            if self.definitions.insert((collection, key)) {
                let obj = self.rebuild_object(object, 0)?;
                self.b.insert_strong(self.dictionary, collection, obj)?;
            }
        }
        for m in f.opt_list("mobs")? {
            let key = key_of(m, pid::MOB_ID)?;
            let id = MobId::from_slice(&key).ok_or_else(|| bad("mob identifier is not 32 bytes"))?;
            if self.mob_ids.insert(id) {
                let obj = self.rebuild_object(m, 0)?;
                self.b.insert_strong(self.content, pid::MOBS, obj)?;
            }
        }
        Ok(())
    }

    /// Rebuild an opaque payload, returning the restored object.
    pub(super) fn rebuild_opaque(&mut self, payload: &MetadataValue) -> Result<usize> {
        let f = Fields::of(payload, "opaque payload")?;
        self.rebuild_support(f)?;
        self.rebuild_object(payload, 0)
    }

    /// Restore preserved extension properties from the reserved metadata key.
    pub(super) fn restore_extensions(&mut self, obj: usize, md: &Metadata) -> Result<()> {
        let Some(reserved) = md.get(RESERVED_KEY) else {
            return Ok(());
        };
        let Some(f) = reserved.as_map().map(Fields) else {
            warn!(key = RESERVED_KEY, "reserved metadata is not a map, ignored");
            return Ok(());
        };
        for key in f.0.keys() {
            if !matches!(key.as_str(), EXTENSIONS | "classes" | "definitions" | "mobs") {
                warn!(key = %key, "unrecognized reserved metadata, ignored");
            }
        }
        self.rebuild_support(f)?;

        let class = self.b.instance(obj).map(|i| i.class).ok_or_else(|| bad(format!("object #{obj} does not exist")))?;
        for entry in f.opt_list(EXTENSIONS)? {
            let ef = Fields::of(entry, "extension")?;
            if let Some(d) = ef.0.get("definition") {
                let prop = parse_property_def(d)?;
                let mut def = self
                    .b
                    .table()
                    .get(class)
                    .cloned()
                    .ok_or_else(|| bad(format!("class {class} is not declared")))?;
                def.properties = vec![prop];
                self.b.table_mut().register(def);
            }
            let (pid, value) = self.rebuild_property(entry, 0)?;
            self.b.set_raw(obj, pid, value)?;
        }
        Ok(())
    }
}

// ============================================================================
// MetaDictionary
// ============================================================================

/// Declare every extension class and property of the builder's table in the
/// MetaDictionary `meta`. Properties of reference types are left undeclared
/// and read back by stored form.
pub fn write_class_definitions(b: &mut GraphBuilder, meta: usize) -> Result<()> {
    for def in b.table().extension_definitions() {
        let cd = b.add(class::CLASS_DEFINITION)?;
        b.set(cd, pid::META_IDENTIFICATION, def.id)?;
        b.set(cd, pid::META_NAME, def.name.as_str())?;
        b.set_weak(cd, pid::PARENT_CLASS, meta_ref(pid::CLASS_DEFINITIONS, def.parent.unwrap_or(def.id)))?;
        b.set(cd, pid::IS_CONCRETE, def.concrete)?;

        for p in def.properties.iter().filter(|p| p.tag.is_data()) {
            let Some(ty) = p.declared_type() else { continue };
            let pd = b.add(class::PROPERTY_DEFINITION)?;
            b.set(pd, pid::META_IDENTIFICATION, Auid::name_based(def.id, &p.pid.to_le_bytes()))?;
            b.set(pd, pid::META_NAME, p.name.as_str())?;
            b.set_weak(pd, pid::PROPERTY_TYPE, meta_ref(pid::TYPE_DEFINITIONS, ty))?;
            b.set(pd, pid::IS_OPTIONAL, p.optional)?;
            b.set(pd, pid::LOCAL_IDENTIFICATION, p.pid)?;
            if p.unique {
                b.set(pd, pid::IS_UNIQUE_IDENTIFIER, true)?;
            }
            b.insert_strong(cd, pid::PROPERTIES, pd)?;
        }
        b.insert_strong(meta, pid::CLASS_DEFINITIONS, cd)?;
        trace!(class = %def.name, "class definition written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_def_value() {
        let p = PropertyDef::new(0xFFF0, "Knob", TypeTag::Int32).optional();
        assert_eq!(parse_property_def(&property_def_value(&p)).unwrap(), p);

        let s = PropertyDef::new(0xFFF1, "Things", TypeTag::StrongRefSet { key_pid: pid::MOB_ID });
        assert_eq!(parse_property_def(&property_def_value(&s)).unwrap(), s);
    }

    #[test]
    fn test_weak_value() {
        let w = WeakRef { path: vec![2, 0x3B04, 0x2605], key_pid: pid::IDENTIFICATION, key: vec![7; 16] };
        assert_eq!(parse_weak(&weak_value(&w)).unwrap(), w);
        let err = parse_weak(&MetadataValue::Int(1)).unwrap_err();
        assert_eq!(err.encode_kind(), Some(EncodeErrorKind::InvalidOpaquePayload));
    }

    #[test]
    fn test_class_value() {
        let c = ClassDef {
            id: Auid::new(0x1234_5678, 1, 2, [9; 8]),
            name: "VendorEffect".into(),
            parent: Some(class::SEGMENT),
            concrete: true,
            properties: vec![PropertyDef::new(0xFFF0, "Knob", TypeTag::Int32).optional()],
        };
        assert_eq!(parse_class(&class_value(&c)).unwrap(), c);
    }
}
