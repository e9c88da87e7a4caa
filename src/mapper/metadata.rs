//! Metadata carried as TaggedValues.
//!
//! Scalars (string, integer, boolean, rational, bytes) are written as
//! `UserComments`, one TaggedValue each. Everything else is serialized to
//! JSON with `serde_json` and written to `Attributes`, which is where the
//! decoder looks for it.

use interchange::{Metadata, MetadataValue};
use tracing::trace;

use crate::core::{class, pid, Indirect, Value};
use crate::facade::MetadataEncoding;
use crate::graph::{GraphBuilder, ObjectRef};
use crate::util::{EncodeErrorKind, Error, Result};

/// Metadata key holding data the mapper preserves for the encoder.
pub const RESERVED_KEY: &str = "AAF";

/// Comment holding the untruncated clip name.
pub const ORIGINAL_NAME: &str = "OriginalName";

/// Comment and attribute pids of a mob or a component.
fn pids_of(is_mob: bool) -> (u16, u16) {
    if is_mob {
        (pid::MOB_USER_COMMENTS, pid::MOB_ATTRIBUTES)
    } else {
        (pid::COMPONENT_USER_COMMENTS, pid::COMPONENT_ATTRIBUTES)
    }
}

fn indirect_to_metadata(v: &Indirect) -> MetadataValue {
    match v.value() {
        Some(Value::String(s)) => MetadataValue::String(s),
        Some(Value::Bool(b)) => MetadataValue::Bool(b),
        Some(Value::Rational(r)) => MetadataValue::Rational(r),
        Some(Value::Bytes(b)) => MetadataValue::Bytes(b),
        Some(other) => match other.as_i64() {
            Some(i) => MetadataValue::Int(i),
            None => MetadataValue::Bytes(v.bytes.clone()),
        },
        None => {
            trace!(type_id = %v.type_id, "tagged value of unknown type kept as bytes");
            MetadataValue::Bytes(v.bytes.clone())
        }
    }
}

fn metadata_to_indirect(v: &MetadataValue, enc: MetadataEncoding) -> Option<Indirect> {
    Some(match v {
        MetadataValue::String(s) => Indirect::string(&enc.apply(s)),
        MetadataValue::Int(i) => Indirect::int64(*i),
        MetadataValue::Bool(b) => Indirect::boolean(*b),
        MetadataValue::Rational(r) => Indirect::rational(*r),
        MetadataValue::Bytes(b) => Indirect::bytes(b),
        _ => return None,
    })
}

/// Value of an attribute written by [`write_metadata`]: JSON text of a value
/// that has no comment form, exactly as `serde_json` prints it. Any other
/// text is a plain string.
fn attribute_value(text: String) -> MetadataValue {
    let Ok(parsed) = serde_json::from_str::<MetadataValue>(&text) else {
        return MetadataValue::String(text);
    };
    let canonical = serde_json::to_string(&parsed).is_ok_and(|json| json == text);
    if canonical && metadata_to_indirect(&parsed, MetadataEncoding::Utf16).is_none() {
        parsed
    } else {
        MetadataValue::String(text)
    }
}

/// `(name, value)` of every TaggedValue in a strong vector.
pub fn tagged_values<'g>(obj: &ObjectRef<'g>, vector_pid: u16) -> Vec<(&'g str, &'g Indirect)> {
    obj.strong_vec(vector_pid)
        .into_iter()
        .filter(|t| t.is_a(class::TAGGED_VALUE))
        .filter_map(|t| Some((t.string(pid::TAG_NAME)?, t.indirect(pid::TAG_VALUE)?)))
        .collect()
}

/// Comments and attributes of a mob or component.
pub fn read_metadata(obj: &ObjectRef<'_>) -> Metadata {
    let (comments, attributes) = pids_of(obj.is_a(class::MOB));
    let mut md = Metadata::new();
    for (name, v) in tagged_values(obj, comments) {
        md.insert(name.to_string(), indirect_to_metadata(v));
    }
    for (name, v) in tagged_values(obj, attributes) {
        let value = match v.as_string() {
            Some(text) => attribute_value(text),
            None => indirect_to_metadata(v),
        };
        md.insert(name.to_string(), value);
    }
    md
}

/// Append one TaggedValue to the strong vector `vector_pid` of `obj`.
pub fn push_tagged_value(
    b: &mut GraphBuilder,
    obj: usize,
    vector_pid: u16,
    name: &str,
    value: Indirect,
) -> Result<()> {
    let tv = b.add(class::TAGGED_VALUE)?;
    b.set(tv, pid::TAG_NAME, name)?;
    b.set(tv, pid::TAG_VALUE, value)?;
    b.push_strong(obj, vector_pid, tv)
}

fn is_mob(b: &GraphBuilder, obj: usize) -> bool {
    b.instance(obj).is_some_and(|i| b.table().is_a(i.class, class::MOB))
}

/// Write metadata onto a mob or component. The reserved key is skipped.
pub fn write_metadata(b: &mut GraphBuilder, obj: usize, md: &Metadata, enc: MetadataEncoding) -> Result<()> {
    let (comments, attributes) = pids_of(is_mob(b, obj));
    for (key, value) in md {
        if key == RESERVED_KEY {
            continue;
        }
        let name = enc.apply(key);
        match metadata_to_indirect(value, enc) {
            Some(ind) => push_tagged_value(b, obj, comments, &name, ind)?,
            None => {
                let json = serde_json::to_string(value).map_err(|e| {
                    Error::encode(EncodeErrorKind::UnsupportedConstruct, format!("metadata {key:?}: {e}"))
                })?;
                push_tagged_value(b, obj, attributes, &name, Indirect::string(&enc.apply(&json)))?;
            }
        }
    }
    Ok(())
}

/// Write a single user comment.
pub fn write_comment(b: &mut GraphBuilder, obj: usize, name: &str, value: Indirect) -> Result<()> {
    let (comments, _) = pids_of(is_mob(b, obj));
    push_tagged_value(b, obj, comments, name, value)
}

/// Write a single attribute.
pub fn write_attribute(b: &mut GraphBuilder, obj: usize, name: &str, value: &str) -> Result<()> {
    let (_, attributes) = pids_of(is_mob(b, obj));
    push_tagged_value(b, obj, attributes, name, Indirect::string(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use interchange::Rational;

    #[test]
    fn test_scalar_mapping() {
        let enc = MetadataEncoding::Utf16;
        for v in [
            MetadataValue::from("x"),
            MetadataValue::Int(-3),
            MetadataValue::Bool(true),
            MetadataValue::Rational(Rational::new(1, 3)),
            MetadataValue::Bytes(vec![1, 2]),
        ] {
            let ind = metadata_to_indirect(&v, enc).unwrap();
            assert_eq!(indirect_to_metadata(&ind), v);
        }
        assert!(metadata_to_indirect(&MetadataValue::Float(1.5), enc).is_none());
        assert_eq!(indirect_to_metadata(&Indirect::int32(7)), MetadataValue::Int(7));
    }

    #[test]
    fn test_json_values() {
        let v = MetadataValue::List(vec![MetadataValue::Float(0.25), MetadataValue::Null]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(serde_json::from_str::<MetadataValue>(&json).unwrap(), v);
        assert_eq!(attribute_value(json), v);
    }

    #[test]
    fn test_foreign_attribute_text() {
        for text in ["42", "true", r#"{"Int":42}"#, r#"{"String":"x"}"#, r#"{ "Float": 1.5 }"#, "plain"] {
            assert_eq!(attribute_value(text.to_string()), MetadataValue::String(text.to_string()));
        }
        assert_eq!(attribute_value(r#"{"Float":1.5}"#.to_string()), MetadataValue::Float(1.5));
    }
}
