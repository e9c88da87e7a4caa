//! Property set codec: `properties` stream bytes to typed properties and back.

use tracing::trace;

use super::dictionary::ClassTable;
use super::stored::*;
use super::types::TypeTag;
use super::value::{decode_value, encode_value, Value};
use crate::cfb::{Container, EntryId};
use crate::util::{Auid, DecodeErrorKind, EncodeErrorKind, Error, Result};

/// A weak reference with its target collection path spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeakRef {
    /// Pids from the root object to the collection holding the target.
    pub path: Vec<u16>,
    pub key_pid: u16,
    pub key: Vec<u8>,
}

/// Value of one decoded property.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Typed data of a known property.
    Data(Value),
    /// Data of an unknown pid or type, kept verbatim.
    Opaque(Vec<u8>),
    /// Child storage name of a single strong reference.
    Strong(String),
    /// Collection name of a strong or weak vector or set.
    Collection(String),
    Weak(WeakRef),
    /// Name of a data stream next to the properties stream.
    Stream(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedProperty {
    pub pid: u16,
    pub form: StoredForm,
    pub value: DecodedValue,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedInstance {
    pub properties: Vec<DecodedProperty>,
}

impl DecodedInstance {
    pub fn get(&self, pid: u16) -> Option<&DecodedProperty> {
        self.properties.iter().find(|p| p.pid == pid)
    }
}

fn type_err(detail: String) -> Error {
    Error::decode(DecodeErrorKind::PropertyType, detail)
}

/// Decode a `properties` stream of an object of class `class`.
pub fn decode_instance(
    bytes: &[u8],
    class: Auid,
    table: &ClassTable,
    refs: &ReferencedProperties,
) -> Result<DecodedInstance> {
    let class_def = table.get(class).ok_or_else(|| {
        Error::decode(DecodeErrorKind::UnknownClass, format!("class {class} is neither built in nor declared"))
    })?;
    let entries = parse_property_set(bytes)?;
    let mut out = DecodedInstance { properties: Vec::with_capacity(entries.len()) };

    for e in entries {
        if out.get(e.pid).is_some() {
            return Err(Error::invalid(format!("pid {:#06x} appears twice in {}", e.pid, class_def.name)));
        }
        let def = table
            .lookup_property(class, e.pid)
            .filter(|d| !matches!(d.tag, TypeTag::Opaque(_)));
        let value = match def {
            Some(def) => {
                let expected = def.tag.stored_form();
                if e.form != expected {
                    return Err(type_err(format!(
                        "{}.{} ({:#06x}) stored as {}, declared {}",
                        class_def.name, def.name, e.pid, e.form, expected
                    )));
                }
                match e.form {
                    StoredForm::Data => DecodedValue::Data(decode_value(e.value, def.tag).map_err(|err| {
                        type_err(format!("{}.{}: {err}", class_def.name, def.name))
                    })?),
                    _ => decode_reference(e.form, e.value, refs)?,
                }
            }
            None => {
                trace!(pid = e.pid, form = %e.form, class = %class_def.name, "unknown property kept opaque");
                match e.form {
                    StoredForm::Data => DecodedValue::Opaque(e.value.to_vec()),
                    _ => decode_reference(e.form, e.value, refs)?,
                }
            }
        };
        out.properties.push(DecodedProperty { pid: e.pid, form: e.form, value });
    }

    for def in table.all_properties(class) {
        if !def.optional && out.get(def.pid).is_none() {
            return Err(Error::decode(
                DecodeErrorKind::MissingProperty,
                format!("{} lacks required property {} ({:#06x})", class_def.name, def.name, def.pid),
            ));
        }
    }
    Ok(out)
}

fn decode_reference(form: StoredForm, b: &[u8], refs: &ReferencedProperties) -> Result<DecodedValue> {
    Ok(match form {
        StoredForm::Data => DecodedValue::Opaque(b.to_vec()),
        StoredForm::DataStream => DecodedValue::Stream(decode_stream_ref(b)?),
        StoredForm::StrongRef => DecodedValue::Strong(decode_name(b)?),
        StoredForm::StrongRefVector
        | StoredForm::StrongRefSet
        | StoredForm::WeakRefVector
        | StoredForm::WeakRefSet => DecodedValue::Collection(decode_name(b)?),
        StoredForm::WeakRef => {
            let k = WeakKey::parse(b)?;
            DecodedValue::Weak(WeakRef { path: weak_path(refs, k.tag)?, key_pid: k.key_pid, key: k.key })
        }
    })
}

/// Target path of a weak reference tag.
pub fn weak_path(refs: &ReferencedProperties, tag: u16) -> Result<Vec<u16>> {
    refs.path(tag)
        .map(<[u16]>::to_vec)
        .ok_or_else(|| Error::invalid(format!("weak reference tag {tag} is not in the referenced properties table")))
}

/// Encode properties of an object of class `class`.
///
/// Weak reference paths are interned into `refs`.
pub fn encode_instance(
    class: Auid,
    properties: &[DecodedProperty],
    table: &ClassTable,
    refs: &mut ReferencedProperties,
) -> Result<Vec<u8>> {
    let class_name = table.class_name(class);
    let mut values = Vec::with_capacity(properties.len());
    for p in properties {
        if let Some(def) = table.lookup_property(class, p.pid) {
            let declared = def.tag.stored_form();
            let opaque = matches!(def.tag, TypeTag::Opaque(_));
            if !opaque && p.form != declared {
                return Err(Error::encode(
                    EncodeErrorKind::UnsupportedConstruct,
                    format!("{class_name}.{} written as {}, declared {declared}", def.name, p.form),
                ));
            }
            if let DecodedValue::Data(v) = &p.value {
                if !opaque && v.type_tag() != def.tag {
                    return Err(Error::encode(
                        EncodeErrorKind::UnsupportedConstruct,
                        format!("{class_name}.{} expects {:?}, got {:?}", def.name, def.tag, v.type_tag()),
                    ));
                }
            }
        }
        let bytes = match &p.value {
            DecodedValue::Data(v) => encode_value(v),
            DecodedValue::Opaque(b) => b.clone(),
            DecodedValue::Strong(name) | DecodedValue::Collection(name) => encode_name(name),
            DecodedValue::Stream(name) => encode_stream_ref(name),
            DecodedValue::Weak(w) => WeakKey { tag: refs.intern(&w.path), key_pid: w.key_pid, key: w.key.clone() }
                .to_bytes(),
        };
        if bytes.len() > u16::MAX as usize {
            return Err(Error::encode(
                EncodeErrorKind::Layout,
                format!("{class_name} pid {:#06x} value of {} bytes does not fit a property set", p.pid, bytes.len()),
            ));
        }
        values.push((p.pid, p.form, bytes));
    }
    Ok(write_property_set(values.iter().map(|(pid, form, b)| (*pid, *form, b.as_slice()))))
}

// ============================================================================
// Raw probes
// ============================================================================

/// Read the property set of an object storage without interpreting it.
pub fn read_raw_properties(c: &Container, storage: EntryId) -> Result<Vec<(u16, StoredForm, Vec<u8>)>> {
    let stream = c.child(storage, PROPERTIES_STREAM).ok_or_else(|| {
        Error::decode(DecodeErrorKind::Stream, format!("{:?} has no properties stream", c.path_of(storage)))
    })?;
    let bytes = c.read_entry(stream)?;
    Ok(parse_property_set(&bytes)?
        .into_iter()
        .map(|e| (e.pid, e.form, e.value.to_vec()))
        .collect())
}

/// Raw bytes of one property of the storage at `path`, if present.
pub fn probe_property(c: &Container, path: &str, pid: u16) -> Result<Option<(StoredForm, Vec<u8>)>> {
    let Some(storage) = c.entry(path) else {
        return Ok(None);
    };
    Ok(read_raw_properties(c, storage)?
        .into_iter()
        .find(|(p, _, _)| *p == pid)
        .map(|(_, form, b)| (form, b)))
}

/// The root `referenced properties` table; empty when absent.
pub fn read_referenced_properties(c: &Container) -> Result<ReferencedProperties> {
    match c.child(c.root(), REFERENCED_PROPERTIES_STREAM) {
        Some(id) => ReferencedProperties::parse(&c.read_entry(id)?),
        None => Ok(ReferencedProperties::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{class, datadef, pid};
    use interchange::Rational;

    fn slot_bytes(edit_rate: &[u8]) -> Vec<u8> {
        let seg = encode_name("Segment-4803");
        write_property_set([
            (pid::SLOT_ID, StoredForm::Data, &1u32.to_le_bytes()[..]),
            (pid::SEGMENT, StoredForm::StrongRef, &seg[..]),
            (pid::EDIT_RATE, StoredForm::Data, edit_rate),
            (pid::ORIGIN, StoredForm::Data, &0i64.to_le_bytes()[..]),
            (0xFF01, StoredForm::Data, &[7u8, 7, 7][..]),
        ])
    }

    #[test]
    fn test_decode_known_and_unknown() {
        let table = ClassTable::builtin();
        let rate = encode_value(&Value::Rational(Rational::new(25, 1)));
        let inst = decode_instance(&slot_bytes(&rate), class::TIMELINE_MOB_SLOT, &table, &Default::default()).unwrap();
        assert_eq!(inst.get(pid::EDIT_RATE).unwrap().value, DecodedValue::Data(Value::Rational(Rational::new(25, 1))));
        assert_eq!(inst.get(pid::SEGMENT).unwrap().value, DecodedValue::Strong("Segment-4803".into()));
        assert_eq!(inst.get(0xFF01).unwrap().value, DecodedValue::Opaque(vec![7, 7, 7]));
    }

    #[test]
    fn test_decode_errors() {
        let table = ClassTable::builtin();
        let refs = ReferencedProperties::default();

        let err = decode_instance(&slot_bytes(&[1, 2, 3]), class::TIMELINE_MOB_SLOT, &table, &refs).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::PropertyType));

        let odd = Auid::new(0xdead_beef, 1, 2, [3; 8]);
        let err = decode_instance(&slot_bytes(&[0; 8]), odd, &table, &refs).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::UnknownClass));

        let bytes = write_property_set([(pid::SLOT_ID, StoredForm::Data, &1u32.to_le_bytes()[..])]);
        let err = decode_instance(&bytes, class::TIMELINE_MOB_SLOT, &table, &refs).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::MissingProperty));

        let name = encode_name("x");
        let bytes = write_property_set([(pid::COMPONENTS, StoredForm::StrongRef, &name[..])]);
        let err = decode_instance(&bytes, class::SEQUENCE, &table, &refs).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::PropertyType));
    }

    #[test]
    fn test_weak_roundtrip() {
        let table = ClassTable::builtin();
        let mut refs = ReferencedProperties::default();
        let props = vec![
            DecodedProperty {
                pid: pid::DATA_DEFINITION,
                form: StoredForm::WeakRef,
                value: DecodedValue::Weak(WeakRef {
                    path: vec![pid::ROOT_HEADER, pid::DICTIONARY, pid::DATA_DEFINITIONS],
                    key_pid: pid::IDENTIFICATION,
                    key: datadef::PICTURE.to_le_bytes().to_vec(),
                }),
            },
            DecodedProperty {
                pid: pid::LENGTH,
                form: StoredForm::Data,
                value: DecodedValue::Data(Value::Int64(48)),
            },
        ];
        let bytes = encode_instance(class::FILLER, &props, &table, &mut refs).unwrap();
        assert_eq!(refs.paths.len(), 1);
        let back = decode_instance(&bytes, class::FILLER, &table, &refs).unwrap();
        assert_eq!(back.properties, props);
    }

    #[test]
    fn test_encode_rejects_wrong_type() {
        let table = ClassTable::builtin();
        let props = vec![DecodedProperty {
            pid: pid::LENGTH,
            form: StoredForm::Data,
            value: DecodedValue::Data(Value::Int32(1)),
        }];
        let err = encode_instance(class::FILLER, &props, &table, &mut Default::default()).unwrap_err();
        assert_eq!(err.encode_kind(), Some(EncodeErrorKind::UnsupportedConstruct));
    }
}
