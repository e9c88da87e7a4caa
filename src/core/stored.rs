//! On-disk layout of object properties.
//!
//! Each object storage holds a `properties` stream:
//!
//! ```text
//! +------+------+-----------+
//! | 0x4C | 0x20 | u16 count |                        header
//! +------+------+-----------+
//! | u16 pid | u16 form | u16 len |  x count          directory
//! +--------------------------------+
//! | value bytes, in directory order |                payload
//! +--------------------------------+
//! ```
//!
//! Strong collections add an index stream next to the properties stream;
//! weak collections keep their keys in one. Weak reference targets are named
//! by a tag into the root's `referenced properties` stream.

use byteorder::{LittleEndian, WriteBytesExt};

use super::value::{decode_string, encode_string, LITTLE_ENDIAN_MARK};
use crate::util::{DecodeErrorKind, Error, Result};

pub const PROPERTIES_STREAM: &str = "properties";
pub const REFERENCED_PROPERTIES_STREAM: &str = "referenced properties";

const PROPERTY_SET_VERSION: u8 = 0x20;

/// Longest storage name, in UTF-16 units.
const MAX_NAME: usize = 31;
/// Room reserved after a collection name for `{xxxxxxxx}` element suffixes.
const ELEMENT_SUFFIX: usize = 10;

// ============================================================================
// Stored forms
// ============================================================================

/// How a property value is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoredForm {
    Data,
    DataStream,
    StrongRef,
    StrongRefVector,
    StrongRefSet,
    WeakRef,
    WeakRefVector,
    WeakRefSet,
}

impl StoredForm {
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            0x82 => Self::Data,
            0x42 => Self::DataStream,
            0x22 => Self::StrongRef,
            0x32 => Self::StrongRefVector,
            0x3A => Self::StrongRefSet,
            0x02 => Self::WeakRef,
            0x12 => Self::WeakRefVector,
            0x1A => Self::WeakRefSet,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Self::Data => 0x82,
            Self::DataStream => 0x42,
            Self::StrongRef => 0x22,
            Self::StrongRefVector => 0x32,
            Self::StrongRefSet => 0x3A,
            Self::WeakRef => 0x02,
            Self::WeakRefVector => 0x12,
            Self::WeakRefSet => 0x1A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "Data",
            Self::DataStream => "DataStream",
            Self::StrongRef => "StrongReference",
            Self::StrongRefVector => "StrongReferenceVector",
            Self::StrongRefSet => "StrongReferenceSet",
            Self::WeakRef => "WeakReference",
            Self::WeakRefVector => "WeakReferenceVector",
            Self::WeakRefSet => "WeakReferenceSet",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        [
            Self::Data,
            Self::DataStream,
            Self::StrongRef,
            Self::StrongRefVector,
            Self::StrongRefSet,
            Self::WeakRef,
            Self::WeakRefVector,
            Self::WeakRefSet,
        ]
        .into_iter()
        .find(|f| f.as_str() == s)
    }

    #[inline]
    pub fn is_strong(self) -> bool {
        matches!(self, Self::StrongRef | Self::StrongRefVector | Self::StrongRefSet)
    }

    #[inline]
    pub fn is_weak(self) -> bool {
        matches!(self, Self::WeakRef | Self::WeakRefVector | Self::WeakRefSet)
    }
}

impl std::fmt::Display for StoredForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Property sets
// ============================================================================

/// One directory entry of a property set, borrowing its value bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyEntry<'a> {
    pub pid: u16,
    pub form: StoredForm,
    pub value: &'a [u8],
}

fn structure(detail: impl Into<String>) -> Error {
    Error::decode(DecodeErrorKind::Structure, detail)
}

fn rd_u16(b: &[u8], o: usize) -> Result<u16> {
    b.get(o..o + 2)
        .map(|s| u16::from_le_bytes([s[0], s[1]]))
        .ok_or_else(|| structure(format!("unexpected end of data at {o}")))
}

fn rd_u32(b: &[u8], o: usize) -> Result<u32> {
    b.get(o..o + 4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or_else(|| structure(format!("unexpected end of data at {o}")))
}

/// Parse a `properties` stream.
pub fn parse_property_set(bytes: &[u8]) -> Result<Vec<PropertyEntry<'_>>> {
    if bytes.len() < 4 {
        return Err(structure("property set shorter than its header"));
    }
    if bytes[0] != LITTLE_ENDIAN_MARK {
        return Err(structure(format!("unsupported property set byte order {:#04x}", bytes[0])));
    }
    let count = rd_u16(bytes, 2)? as usize;
    let mut value_off = 4 + count * 6;
    if value_off > bytes.len() {
        return Err(structure(format!("property directory of {count} entries is truncated")));
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let d = 4 + i * 6;
        let pid = rd_u16(bytes, d)?;
        let code = rd_u16(bytes, d + 2)?;
        let len = rd_u16(bytes, d + 4)? as usize;
        let form = StoredForm::from_u16(code)
            .ok_or_else(|| structure(format!("pid {pid:#06x} has unknown stored form {code:#06x}")))?;
        let value = bytes
            .get(value_off..value_off + len)
            .ok_or_else(|| structure(format!("pid {pid:#06x} value overruns the property set")))?;
        out.push(PropertyEntry { pid, form, value });
        value_off += len;
    }
    Ok(out)
}

/// Serialize a `properties` stream.
pub fn write_property_set<'a>(entries: impl IntoIterator<Item = (u16, StoredForm, &'a [u8])>) -> Vec<u8> {
    let entries: Vec<_> = entries.into_iter().collect();
    let mut out = Vec::with_capacity(4 + entries.len() * 6);
    out.push(LITTLE_ENDIAN_MARK);
    out.push(PROPERTY_SET_VERSION);
    let _ = out.write_u16::<LittleEndian>(entries.len() as u16);
    for (pid, form, value) in &entries {
        let _ = out.write_u16::<LittleEndian>(*pid);
        let _ = out.write_u16::<LittleEndian>(form.as_u16());
        let _ = out.write_u16::<LittleEndian>(value.len() as u16);
    }
    for (_, _, value) in &entries {
        out.extend_from_slice(value);
    }
    out
}

// ============================================================================
// Names
// ============================================================================

/// Storage name of a property: `"<name>-<pid hex>"`, shortened so element
/// names of a collection still fit in 31 units.
pub fn mangle_name(name: &str, pid: u16) -> String {
    let suffix = format!("-{pid:x}");
    let room = MAX_NAME - ELEMENT_SUFFIX - suffix.len();
    let mut base: String = name.chars().filter(|c| *c != '/').take(room).collect();
    base.push_str(&suffix);
    base
}

/// Storage name of a collection element.
pub fn element_name(collection: &str, local_key: u32) -> String {
    format!("{collection}{{{local_key:x}}}")
}

/// Stream name of a collection's index.
pub fn index_name(collection: &str) -> String {
    format!("{collection} index")
}

/// Value of a strong reference or collection property: the UTF-16 name.
pub fn encode_name(name: &str) -> Vec<u8> {
    encode_string(name)
}

pub fn decode_name(b: &[u8]) -> Result<String> {
    decode_string(b).map_err(|_| structure("reference name is not valid UTF-16"))
}

/// Value of a data stream property: byte order then the stream name.
pub fn encode_stream_ref(name: &str) -> Vec<u8> {
    let mut out = vec![LITTLE_ENDIAN_MARK];
    out.extend_from_slice(&encode_string(name));
    out
}

pub fn decode_stream_ref(b: &[u8]) -> Result<String> {
    match b.split_first() {
        Some((_, rest)) => decode_name(rest),
        None => Err(structure("empty data stream reference")),
    }
}

// ============================================================================
// Strong collection indexes
// ============================================================================

/// One element of a strong collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrongIndexEntry {
    pub local_key: u32,
    /// Unique identifier of the element; empty for vectors.
    pub key: Vec<u8>,
}

/// Parsed `"<name> index"` stream of a strong vector or set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrongIndex {
    pub next_free_key: u32,
    pub last_free_key: u32,
    /// Set key property and size; `None` for vectors.
    pub key: Option<(u16, u8)>,
    pub entries: Vec<StrongIndexEntry>,
}

impl StrongIndex {
    /// Vector index with keys `0..count`.
    pub fn vector(count: usize) -> Self {
        Self {
            next_free_key: count as u32,
            last_free_key: u32::MAX,
            key: None,
            entries: (0..count as u32)
                .map(|k| StrongIndexEntry { local_key: k, key: Vec::new() })
                .collect(),
        }
    }

    /// Set index with keys `0..n` and the given element identifiers.
    pub fn set(key_pid: u16, key_size: u8, keys: Vec<Vec<u8>>) -> Self {
        let n = keys.len() as u32;
        Self {
            next_free_key: n,
            last_free_key: u32::MAX,
            key: Some((key_pid, key_size)),
            entries: keys
                .into_iter()
                .zip(0..n)
                .map(|(key, local_key)| StrongIndexEntry { local_key, key })
                .collect(),
        }
    }

    pub fn parse_vector(b: &[u8]) -> Result<Self> {
        let count = rd_u32(b, 0)? as usize;
        let mut idx = Self {
            next_free_key: rd_u32(b, 4)?,
            last_free_key: rd_u32(b, 8)?,
            key: None,
            entries: Vec::with_capacity(count.min(b.len() / 4)),
        };
        for i in 0..count {
            idx.entries.push(StrongIndexEntry { local_key: rd_u32(b, 12 + i * 4)?, key: Vec::new() });
        }
        Ok(idx)
    }

    pub fn parse_set(b: &[u8]) -> Result<Self> {
        let count = rd_u32(b, 0)? as usize;
        let key_pid = rd_u16(b, 12)?;
        let key_size = *b.get(14).ok_or_else(|| structure("set index header truncated"))?;
        let stride = 8 + key_size as usize;
        let mut idx = Self {
            next_free_key: rd_u32(b, 4)?,
            last_free_key: rd_u32(b, 8)?,
            key: Some((key_pid, key_size)),
            entries: Vec::with_capacity(count.min(b.len() / stride.max(1))),
        };
        for i in 0..count {
            let o = 15 + i * stride;
            let local_key = rd_u32(b, o)?;
            // o + 4: reference count, not needed for decoding
            let key = b
                .get(o + 8..o + stride)
                .ok_or_else(|| structure("set index entry truncated"))?
                .to_vec();
            idx.entries.push(StrongIndexEntry { local_key, key });
        }
        Ok(idx)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let _ = out.write_u32::<LittleEndian>(self.entries.len() as u32);
        let _ = out.write_u32::<LittleEndian>(self.next_free_key);
        let _ = out.write_u32::<LittleEndian>(self.last_free_key);
        match self.key {
            None => {
                for e in &self.entries {
                    let _ = out.write_u32::<LittleEndian>(e.local_key);
                }
            }
            Some((pid, size)) => {
                let _ = out.write_u16::<LittleEndian>(pid);
                out.push(size);
                for e in &self.entries {
                    let _ = out.write_u32::<LittleEndian>(e.local_key);
                    let _ = out.write_u32::<LittleEndian>(1);
                    out.extend_from_slice(&e.key);
                }
            }
        }
        out
    }
}

// ============================================================================
// Weak references
// ============================================================================

/// A single weak reference value: target collection tag plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WeakKey {
    pub tag: u16,
    pub key_pid: u16,
    pub key: Vec<u8>,
}

impl WeakKey {
    pub fn parse(b: &[u8]) -> Result<Self> {
        let tag = rd_u16(b, 0)?;
        let key_pid = rd_u16(b, 2)?;
        let size = *b.get(4).ok_or_else(|| structure("weak reference truncated"))? as usize;
        let key = b
            .get(5..5 + size)
            .ok_or_else(|| structure("weak reference key truncated"))?
            .to_vec();
        Ok(Self { tag, key_pid, key })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.key.len());
        let _ = out.write_u16::<LittleEndian>(self.tag);
        let _ = out.write_u16::<LittleEndian>(self.key_pid);
        out.push(self.key.len() as u8);
        out.extend_from_slice(&self.key);
        out
    }
}

/// Parsed index stream of a weak vector or set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WeakIndex {
    pub tag: u16,
    pub key_pid: u16,
    pub keys: Vec<Vec<u8>>,
}

impl WeakIndex {
    pub fn parse(b: &[u8]) -> Result<Self> {
        let count = rd_u32(b, 0)? as usize;
        let tag = rd_u16(b, 4)?;
        let key_pid = rd_u16(b, 6)?;
        let size = *b.get(8).ok_or_else(|| structure("weak index header truncated"))? as usize;
        let mut keys = Vec::with_capacity(count.min(b.len()));
        for i in 0..count {
            let o = 9 + i * size;
            let key = b
                .get(o..o + size)
                .ok_or_else(|| structure("weak index entry truncated"))?;
            keys.push(key.to_vec());
        }
        Ok(Self { tag, key_pid, keys })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let size = self.keys.first().map_or(0, |k| k.len());
        let mut out = Vec::new();
        let _ = out.write_u32::<LittleEndian>(self.keys.len() as u32);
        let _ = out.write_u16::<LittleEndian>(self.tag);
        let _ = out.write_u16::<LittleEndian>(self.key_pid);
        out.push(size as u8);
        for k in &self.keys {
            out.extend_from_slice(k);
        }
        out
    }
}

// ============================================================================
// Referenced properties
// ============================================================================

/// Root table of weak reference target paths, indexed by tag.
///
/// Each path lists the pids from the root object down to the collection
/// that holds the targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferencedProperties {
    pub paths: Vec<Vec<u16>>,
}

impl ReferencedProperties {
    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.is_empty() {
            return Ok(Self::default());
        }
        let count = rd_u16(b, 1)? as usize;
        let total = rd_u32(b, 3)? as usize;
        let mut paths = Vec::with_capacity(count);
        let mut cur = Vec::new();
        for i in 0..total {
            let pid = rd_u16(b, 7 + i * 2)?;
            if pid == 0 {
                paths.push(std::mem::take(&mut cur));
            } else {
                cur.push(pid);
            }
        }
        if paths.len() != count {
            return Err(structure(format!(
                "referenced properties declares {count} paths, found {}",
                paths.len()
            )));
        }
        Ok(Self { paths })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let total: usize = self.paths.iter().map(|p| p.len() + 1).sum();
        let mut out = vec![LITTLE_ENDIAN_MARK];
        let _ = out.write_u16::<LittleEndian>(self.paths.len() as u16);
        let _ = out.write_u32::<LittleEndian>(total as u32);
        for p in &self.paths {
            for pid in p {
                let _ = out.write_u16::<LittleEndian>(*pid);
            }
            let _ = out.write_u16::<LittleEndian>(0);
        }
        out
    }

    pub fn path(&self, tag: u16) -> Option<&[u16]> {
        self.paths.get(tag as usize).map(Vec::as_slice)
    }

    /// Tag of `path`, registering it if new.
    pub fn intern(&mut self, path: &[u16]) -> u16 {
        if let Some(i) = self.paths.iter().position(|p| p == path) {
            return i as u16;
        }
        self.paths.push(path.to_vec());
        (self.paths.len() - 1) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_set_layout() {
        let name = encode_name("Header-2");
        let bytes = write_property_set([
            (0x3B05u16, StoredForm::Data, &[1u8, 1][..]),
            (0x0002, StoredForm::StrongRef, &name[..]),
        ]);
        assert_eq!(&bytes[0..4], &[0x4C, 0x20, 2, 0]);
        assert_eq!(&bytes[4..10], &[0x05, 0x3B, 0x82, 0, 2, 0]);

        let entries = parse_property_set(&bytes).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, &[1, 1]);
        assert_eq!(entries[1].form, StoredForm::StrongRef);
        assert_eq!(decode_name(entries[1].value).unwrap(), "Header-2");
    }

    #[test]
    fn test_property_set_overrun() {
        let mut bytes = write_property_set([(0x0101u16, StoredForm::Data, &[0u8; 16][..])]);
        bytes.truncate(bytes.len() - 1);
        let err = parse_property_set(&bytes).unwrap_err();
        assert_eq!(err.decode_kind(), Some(DecodeErrorKind::Structure));

        let mut bytes = write_property_set([(0x0101u16, StoredForm::Data, &[0u8; 2][..])]);
        bytes[6] = 0x77;
        assert!(parse_property_set(&bytes).is_err());
    }

    #[test]
    fn test_mangled_names() {
        assert_eq!(mangle_name("Header", 2), "Header-2");
        assert_eq!(mangle_name("Mobs", 0x1901), "Mobs-1901");
        let long = mangle_name("AVeryLongPropertyNameIndeed", 0x4401);
        assert_eq!(long.len(), MAX_NAME - ELEMENT_SUFFIX);
        assert!(element_name(&long, u32::MAX).len() <= MAX_NAME);
        assert_eq!(element_name("Mobs-1901", 26), "Mobs-1901{1a}");
        assert_eq!(index_name("Mobs-1901"), "Mobs-1901 index");
    }

    #[test]
    fn test_set_index() {
        let idx = StrongIndex::set(0x4401, 4, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        let back = StrongIndex::parse_set(&idx.to_bytes()).unwrap();
        assert_eq!(back, idx);
        let v = StrongIndex::vector(3);
        let back = StrongIndex::parse_vector(&v.to_bytes()).unwrap();
        assert_eq!(back.entries.iter().map(|e| e.local_key).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(StrongIndex::parse_set(&idx.to_bytes()[..20]).is_err());
    }

    #[test]
    fn test_weak_layouts() {
        let w = WeakKey { tag: 3, key_pid: 0x1B01, key: vec![9; 16] };
        let b = w.to_bytes();
        assert_eq!(b.len(), 21);
        assert_eq!(WeakKey::parse(&b).unwrap(), w);

        let idx = WeakIndex { tag: 1, key_pid: 0x1B01, keys: vec![vec![1; 16], vec![2; 16]] };
        assert_eq!(WeakIndex::parse(&idx.to_bytes()).unwrap(), idx);
    }

    #[test]
    fn test_referenced_properties() {
        let mut rp = ReferencedProperties::default();
        assert_eq!(rp.intern(&[2, 0x3B04, 0x2605]), 0);
        assert_eq!(rp.intern(&[2, 0x3B04, 0x2608]), 1);
        assert_eq!(rp.intern(&[2, 0x3B04, 0x2605]), 0);
        let back = ReferencedProperties::parse(&rp.to_bytes()).unwrap();
        assert_eq!(back, rp);
        assert_eq!(back.path(1), Some(&[2, 0x3B04, 0x2608][..]));
    }
}
