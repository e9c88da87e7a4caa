//! Typed property values and their byte encodings.
//!
//! All values are little-endian. Strings are UTF-16LE with a trailing NUL.
//! Indirect values carry a byte-order mark and the AUID of their actual type
//! ahead of the value bytes.

use byteorder::{LittleEndian, WriteBytesExt};
use interchange::Rational;

use super::types::{typeid, TypeTag};
use crate::util::{Auid, DecodeErrorKind, Error, MobId, Result};

/// Byte-order mark used inside properties and indirect values ('L').
pub const LITTLE_ENDIAN_MARK: u8 = 0x4C;

/// Date and time with 1/250 s fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeStamp {
    pub year: i16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fraction: u8,
}

impl TimeStamp {
    /// Current UTC time.
    pub fn now() -> Self {
        let t = time::OffsetDateTime::now_utc();
        Self {
            year: t.year() as i16,
            month: u8::from(t.month()),
            day: t.day(),
            hour: t.hour(),
            minute: t.minute(),
            second: t.second(),
            fraction: (t.millisecond() / 4) as u8,
        }
    }
}

/// Object model version (`major.minor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VersionType {
    pub major: i8,
    pub minor: i8,
}

impl std::fmt::Display for VersionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Producing application version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProductVersion {
    pub major: u16,
    pub minor: u16,
    pub tertiary: u16,
    pub patch: u16,
    pub release: u8,
}

/// A value tagged with its own type (used by tagged values and constants).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Indirect {
    pub type_id: Auid,
    pub bytes: Vec<u8>,
}

impl Indirect {
    pub fn new(type_id: Auid, bytes: Vec<u8>) -> Self {
        Self { type_id, bytes }
    }

    pub fn string(s: &str) -> Self {
        Self::new(typeid::STRING, encode_string(s))
    }

    pub fn int32(v: i32) -> Self {
        Self::new(typeid::INT32, v.to_le_bytes().to_vec())
    }

    pub fn int64(v: i64) -> Self {
        Self::new(typeid::INT64, v.to_le_bytes().to_vec())
    }

    pub fn boolean(v: bool) -> Self {
        Self::new(typeid::BOOLEAN, vec![v as u8])
    }

    pub fn rational(r: Rational) -> Self {
        Self::new(typeid::RATIONAL, encode_value(&Value::Rational(r)))
    }

    pub fn bytes(b: &[u8]) -> Self {
        Self::new(typeid::UINT8_ARRAY, b.to_vec())
    }

    /// Decode the carried value when its type is built in.
    pub fn value(&self) -> Option<Value> {
        match TypeTag::from_type_id(self.type_id) {
            TypeTag::Opaque(_) => None,
            tag => decode_value(&self.bytes, tag).ok(),
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self.value()? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any integer type widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        self.value()?.as_i64()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value()? {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_rational(&self) -> Option<Rational> {
        match self.value()? {
            Value::Rational(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        (TypeTag::from_type_id(self.type_id) == TypeTag::Bytes).then_some(self.bytes.as_slice())
    }
}

/// A decoded data property.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Rational(Rational),
    Auid(Auid),
    MobId(MobId),
    String(String),
    TimeStamp(TimeStamp),
    Version(VersionType),
    ProductVersion(ProductVersion),
    AuidArray(Vec<Auid>),
    UInt32Array(Vec<u32>),
    Bytes(Vec<u8>),
    Indirect(Indirect),
}

impl Value {
    /// Integer value widened to i64.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Self::UInt8(v) => v as i64,
            Self::UInt16(v) => v as i64,
            Self::UInt32(v) => v as i64,
            Self::UInt64(v) => i64::try_from(v).ok()?,
            Self::Int8(v) => v as i64,
            Self::Int16(v) => v as i64,
            Self::Int32(v) => v as i64,
            Self::Int64(v) => v,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Tag that encodes this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Bool(_) => TypeTag::Boolean,
            Self::UInt8(_) => TypeTag::UInt8,
            Self::UInt16(_) => TypeTag::UInt16,
            Self::UInt32(_) => TypeTag::UInt32,
            Self::UInt64(_) => TypeTag::UInt64,
            Self::Int8(_) => TypeTag::Int8,
            Self::Int16(_) => TypeTag::Int16,
            Self::Int32(_) => TypeTag::Int32,
            Self::Int64(_) => TypeTag::Int64,
            Self::Rational(_) => TypeTag::Rational,
            Self::Auid(_) => TypeTag::Auid,
            Self::MobId(_) => TypeTag::MobId,
            Self::String(_) => TypeTag::String,
            Self::TimeStamp(_) => TypeTag::TimeStamp,
            Self::Version(_) => TypeTag::Version,
            Self::ProductVersion(_) => TypeTag::ProductVersion,
            Self::AuidArray(_) => TypeTag::AuidArray,
            Self::UInt32Array(_) => TypeTag::UInt32Array,
            Self::Bytes(_) => TypeTag::Bytes,
            Self::Indirect(_) => TypeTag::Indirect,
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $v:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::$v(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    i32 => Int32,
    i64 => Int64,
    Rational => Rational,
    Auid => Auid,
    MobId => MobId,
    String => String,
    TimeStamp => TimeStamp,
    VersionType => Version,
    Indirect => Indirect,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// UTF-16LE with a trailing NUL.
pub fn encode_string(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2 + 2);
    for u in s.encode_utf16().chain(std::iter::once(0)) {
        out.extend_from_slice(&u.to_le_bytes());
    }
    out
}

/// Decode UTF-16LE up to the first NUL.
pub fn decode_string(b: &[u8]) -> Result<String> {
    if b.len() % 2 != 0 {
        return Err(Error::decode(
            DecodeErrorKind::PropertyType,
            format!("string of odd length {}", b.len()),
        ));
    }
    let units: Vec<u16> = b
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16(&units)
        .map_err(|_| Error::decode(DecodeErrorKind::PropertyType, "string is not valid UTF-16"))
}

/// Serialize a value.
pub fn encode_value(v: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    // Writes into a Vec cannot fail.
    let _ = write_value(&mut out, v);
    out
}

fn write_value(out: &mut Vec<u8>, v: &Value) -> std::io::Result<()> {
    match v {
        Value::Bool(b) => out.write_u8(*b as u8)?,
        Value::UInt8(x) => out.write_u8(*x)?,
        Value::UInt16(x) => out.write_u16::<LittleEndian>(*x)?,
        Value::UInt32(x) => out.write_u32::<LittleEndian>(*x)?,
        Value::UInt64(x) => out.write_u64::<LittleEndian>(*x)?,
        Value::Int8(x) => out.write_i8(*x)?,
        Value::Int16(x) => out.write_i16::<LittleEndian>(*x)?,
        Value::Int32(x) => out.write_i32::<LittleEndian>(*x)?,
        Value::Int64(x) => out.write_i64::<LittleEndian>(*x)?,
        Value::Rational(r) => {
            out.write_i32::<LittleEndian>(r.num)?;
            out.write_i32::<LittleEndian>(r.den)?;
        }
        Value::Auid(a) => out.extend_from_slice(&a.to_le_bytes()),
        Value::MobId(m) => out.extend_from_slice(m.as_bytes()),
        Value::String(s) => out.extend_from_slice(&encode_string(s)),
        Value::TimeStamp(t) => {
            out.write_i16::<LittleEndian>(t.year)?;
            out.write_u8(t.month)?;
            out.write_u8(t.day)?;
            out.write_u8(t.hour)?;
            out.write_u8(t.minute)?;
            out.write_u8(t.second)?;
            out.write_u8(t.fraction)?;
        }
        Value::Version(v) => {
            out.write_i8(v.major)?;
            out.write_i8(v.minor)?;
        }
        Value::ProductVersion(p) => {
            out.write_u16::<LittleEndian>(p.major)?;
            out.write_u16::<LittleEndian>(p.minor)?;
            out.write_u16::<LittleEndian>(p.tertiary)?;
            out.write_u16::<LittleEndian>(p.patch)?;
            out.write_u8(p.release)?;
        }
        Value::AuidArray(ids) => {
            for a in ids {
                out.extend_from_slice(&a.to_le_bytes());
            }
        }
        Value::UInt32Array(xs) => {
            for x in xs {
                out.write_u32::<LittleEndian>(*x)?;
            }
        }
        Value::Bytes(b) => out.extend_from_slice(b),
        Value::Indirect(ind) => {
            out.write_u8(LITTLE_ENDIAN_MARK)?;
            out.extend_from_slice(&ind.type_id.to_le_bytes());
            out.extend_from_slice(&ind.bytes);
        }
    }
    Ok(())
}

/// Decode bytes as the declared type. A size mismatch is a `PropertyType` error.
pub fn decode_value(b: &[u8], tag: TypeTag) -> Result<Value> {
    if let Some(n) = tag.fixed_size() {
        if b.len() != n {
            return Err(Error::decode(
                DecodeErrorKind::PropertyType,
                format!("{tag:?} expects {n} bytes, got {}", b.len()),
            ));
        }
    }
    let u16_at = |o: usize| u16::from_le_bytes([b[o], b[o + 1]]);
    let u32_at = |o: usize| u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]]);
    let u64_at = |o: usize| {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[o..o + 8]);
        u64::from_le_bytes(a)
    };
    let multiple_of = |n: usize| -> Result<()> {
        if b.len() % n != 0 {
            return Err(Error::decode(
                DecodeErrorKind::PropertyType,
                format!("{tag:?} length {} is not a multiple of {n}", b.len()),
            ));
        }
        Ok(())
    };

    Ok(match tag {
        TypeTag::Boolean => Value::Bool(b[0] != 0),
        TypeTag::UInt8 => Value::UInt8(b[0]),
        TypeTag::Int8 => Value::Int8(b[0] as i8),
        TypeTag::UInt16 => Value::UInt16(u16_at(0)),
        TypeTag::Int16 => Value::Int16(u16_at(0) as i16),
        TypeTag::UInt32 => Value::UInt32(u32_at(0)),
        TypeTag::Int32 => Value::Int32(u32_at(0) as i32),
        TypeTag::UInt64 => Value::UInt64(u64_at(0)),
        TypeTag::Int64 => Value::Int64(u64_at(0) as i64),
        TypeTag::Rational => Value::Rational(Rational::new(u32_at(0) as i32, u32_at(4) as i32)),
        TypeTag::Auid => Value::Auid(Auid::from_slice(b).unwrap_or_default()),
        TypeTag::MobId => Value::MobId(MobId::from_slice(b).unwrap_or_default()),
        TypeTag::String => Value::String(decode_string(b)?),
        TypeTag::TimeStamp => Value::TimeStamp(TimeStamp {
            year: u16_at(0) as i16,
            month: b[2],
            day: b[3],
            hour: b[4],
            minute: b[5],
            second: b[6],
            fraction: b[7],
        }),
        TypeTag::Version => Value::Version(VersionType { major: b[0] as i8, minor: b[1] as i8 }),
        TypeTag::ProductVersion => Value::ProductVersion(ProductVersion {
            major: u16_at(0),
            minor: u16_at(2),
            tertiary: u16_at(4),
            patch: u16_at(6),
            release: b[8],
        }),
        TypeTag::AuidArray => {
            multiple_of(16)?;
            Value::AuidArray(b.chunks_exact(16).filter_map(Auid::from_slice).collect())
        }
        TypeTag::UInt32Array => {
            multiple_of(4)?;
            Value::UInt32Array(
                b.chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            )
        }
        TypeTag::Bytes => Value::Bytes(b.to_vec()),
        TypeTag::Indirect => {
            if b.len() < 17 || b[0] != LITTLE_ENDIAN_MARK {
                return Err(Error::decode(
                    DecodeErrorKind::PropertyType,
                    format!("malformed indirect value of {} bytes", b.len()),
                ));
            }
            Value::Indirect(Indirect::new(
                Auid::from_slice(&b[1..17]).unwrap_or_default(),
                b[17..].to_vec(),
            ))
        }
        other => {
            return Err(Error::decode(
                DecodeErrorKind::PropertyType,
                format!("{other:?} is not a data type"),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_encoding() {
        let b = encode_string("Clip");
        assert_eq!(b, vec![b'C', 0, b'l', 0, b'i', 0, b'p', 0, 0, 0]);
        assert_eq!(decode_string(&b).unwrap(), "Clip");
        assert!(decode_string(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_rational_exact() {
        let v = Value::Rational(Rational::new(30000, 1001));
        let b = encode_value(&v);
        assert_eq!(b.len(), 8);
        assert_eq!(decode_value(&b, TypeTag::Rational).unwrap(), v);
    }

    #[test]
    fn test_size_mismatch() {
        let err = decode_value(&[1, 2, 3], TypeTag::Int32).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::PropertyType));
        assert!(decode_value(&[0; 15], TypeTag::AuidArray).is_err());
        assert!(decode_value(&[0; 4], TypeTag::StrongRef).is_err());
    }

    #[test]
    fn test_indirect() {
        let ind = Indirect::string("hello");
        let b = encode_value(&Value::Indirect(ind.clone()));
        assert_eq!(b[0], LITTLE_ENDIAN_MARK);
        let Value::Indirect(back) = decode_value(&b, TypeTag::Indirect).unwrap() else {
            panic!("expected indirect");
        };
        assert_eq!(back, ind);
        assert_eq!(back.as_string().as_deref(), Some("hello"));
        assert_eq!(Indirect::int64(-5).as_i64(), Some(-5));
        assert_eq!(Indirect::rational(Rational::new(1, 2)).as_rational(), Some(Rational::new(1, 2)));
        assert_eq!(Indirect::boolean(true).as_bool(), Some(true));
        assert_eq!(Indirect::bytes(&[1, 2]).as_bytes(), Some(&[1u8, 2][..]));
    }

    #[test]
    fn test_timestamp_layout() {
        let t = TimeStamp { year: 2024, month: 3, day: 9, hour: 1, minute: 2, second: 3, fraction: 4 };
        let b = encode_value(&Value::TimeStamp(t));
        assert_eq!(b.len(), 8);
        assert_eq!(decode_value(&b, TypeTag::TimeStamp).unwrap(), Value::TimeStamp(t));
    }
}
