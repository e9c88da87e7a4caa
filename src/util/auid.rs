//! 16-byte AUIDs and 32-byte MobIDs.
//!
//! AUIDs share the Windows GUID layout: three little-endian integer fields
//! followed by eight raw bytes. The same layout is used for CFB class ids and
//! for AUID property values.

use std::fmt;
use std::str::FromStr;

/// An AAF unique identifier (class, type, definition or usage code).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Auid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Auid {
    pub const NIL: Auid = Auid::new(0, 0, 0, [0; 8]);

    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self { data1, data2, data3, data4 }
    }

    /// Parse the on-disk little-endian layout.
    pub fn from_le_bytes(b: [u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&b[8..16]);
        Self {
            data1: u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            data2: u16::from_le_bytes([b[4], b[5]]),
            data3: u16::from_le_bytes([b[6], b[7]]),
            data4,
        }
    }

    /// Parse from a slice; `None` unless exactly 16 bytes.
    pub fn from_slice(b: &[u8]) -> Option<Self> {
        let arr: [u8; 16] = b.try_into().ok()?;
        Some(Self::from_le_bytes(arr))
    }

    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    /// Random identifier built from a v4 UUID.
    pub fn random() -> Self {
        let u = uuid::Uuid::new_v4();
        let (d1, d2, d3, d4) = u.as_fields();
        Self::new(d1, d2, d3, *d4)
    }

    /// Deterministic identifier derived from `name` under `namespace` (v5 UUID).
    pub fn name_based(namespace: Auid, name: &[u8]) -> Self {
        let (d1, d2, d3, d4) = (namespace.data1, namespace.data2, namespace.data3, namespace.data4);
        let ns = uuid::Uuid::from_fields(d1, d2, d3, &d4);
        let u = uuid::Uuid::new_v5(&ns, name);
        let (d1, d2, d3, d4) = u.as_fields();
        Self::new(d1, d2, d3, *d4)
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Display for Auid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Auid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Auid({self})")
    }
}

impl FromStr for Auid {
    type Err = String;

    /// Accepts the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form,
    /// optionally prefixed with `urn:uuid:`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches("urn:uuid:");
        let u = uuid::Uuid::parse_str(s).map_err(|e| format!("invalid AUID {s:?}: {e}"))?;
        let (d1, d2, d3, d4) = u.as_fields();
        Ok(Self::new(d1, d2, d3, *d4))
    }
}

/// SMPTE universal label prefix for AAF MobIDs (UMID, material type "not identified").
const UMID_LABEL: [u8; 12] = [
    0x06, 0x0a, 0x2b, 0x34, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x0f, 0x00,
];

/// Length byte of a basic UMID.
const UMID_LENGTH: u8 = 0x13;

/// A 32-byte SMPTE UMID identifying a Mob.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MobId(pub [u8; 32]);

impl MobId {
    pub const ZERO: MobId = MobId([0; 32]);

    /// Mint a fresh MobID whose material number is a v4 UUID.
    pub fn new_umid() -> Self {
        let mut b = [0u8; 32];
        b[0..12].copy_from_slice(&UMID_LABEL);
        b[12] = UMID_LENGTH;
        // 13..16: instance number, left zero
        b[16..32].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        Self(b)
    }

    pub fn from_slice(b: &[u8]) -> Option<Self> {
        b.try_into().ok().map(Self)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The all-zero MobID, meaning "no source".
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Default for MobId {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for MobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("urn:smpte:umid:")?;
        for (i, chunk) in self.0.chunks(4).enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            for b in chunk {
                write!(f, "{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MobId({self})")
    }
}

/// Render identifier key bytes for diagnostics.
pub fn format_key(key: &[u8]) -> String {
    if let Some(a) = Auid::from_slice(key) {
        return a.to_string();
    }
    if let Some(m) = MobId::from_slice(key) {
        return m.to_string();
    }
    key.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auid_layout() {
        let a = Auid::new(0x0d010101, 0x0101, 0x2f00, [0x06, 0x0e, 0x2b, 0x34, 0x02, 0x06, 0x01, 0x01]);
        let b = a.to_le_bytes();
        assert_eq!(&b[0..4], &[0x01, 0x01, 0x01, 0x0d]);
        assert_eq!(&b[6..8], &[0x00, 0x2f]);
        assert_eq!(Auid::from_le_bytes(b), a);
        assert_eq!(a.to_string(), "0d010101-0101-2f00-060e-2b3402060101");
        assert_eq!("0d010101-0101-2f00-060e-2b3402060101".parse::<Auid>().unwrap(), a);
    }

    #[test]
    fn test_mob_id() {
        let a = MobId::new_umid();
        let b = MobId::new_umid();
        assert_ne!(a, b);
        assert_eq!(&a.0[0..4], &[0x06, 0x0a, 0x2b, 0x34]);
        assert!(!a.is_zero());
        assert!(MobId::ZERO.is_zero());
        assert!(a.to_string().starts_with("urn:smpte:umid:060a2b34"));
    }

    #[test]
    fn test_format_key() {
        assert_eq!(format_key(&[0xab, 0x01]), "ab01");
        assert_eq!(format_key(&[0u8; 16]), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_name_based() {
        let ns = Auid::new(0x0d010101, 0x0101, 0x1100, [0x06, 0x0e, 0x2b, 0x34, 0x02, 0x06, 0x01, 0x01]);
        let a = Auid::name_based(ns, &[0x01, 0xff]);
        assert_eq!(a, Auid::name_based(ns, &[0x01, 0xff]));
        assert_ne!(a, Auid::name_based(ns, &[0x02, 0xff]));
        assert_ne!(a, ns);
    }
}
