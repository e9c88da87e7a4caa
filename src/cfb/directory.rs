//! 128-byte directory entries.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::util::{Auid, DecodeErrorKind, Error, Result};

/// One raw directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub color: u8,
    pub left: u32,
    pub right: u32,
    pub child: u32,
    pub clsid: Auid,
    pub state_bits: u32,
    pub created: u64,
    pub modified: u64,
    pub start_sector: u32,
    pub size: u64,
}

impl DirEntry {
    /// Unused slot.
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            entry_type: EntryType::Unallocated,
            color: COLOR_RED,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            clsid: Auid::NIL,
            state_bits: 0,
            created: 0,
            modified: 0,
            start_sector: 0,
            size: 0,
        }
    }

    pub fn new(name: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            name: name.into(),
            entry_type,
            color: COLOR_BLACK,
            ..Self::empty()
        }
    }

    /// Parse an entry. `offset` is its file offset, used for diagnostics.
    pub fn parse(data: &[u8], offset: u64, sector_size: SectorSize) -> Result<Self> {
        let bad = |detail: String| Error::decode_at(DecodeErrorKind::Directory, detail, offset);
        if data.len() < DIR_ENTRY_SIZE {
            return Err(bad("truncated directory entry".into()));
        }

        let type_byte = data[66];
        let entry_type = EntryType::from_u8(type_byte)
            .ok_or_else(|| bad(format!("bad entry type {type_byte}")))?;

        let name_len = u16::from_le_bytes([data[64], data[65]]) as usize;
        let name = if entry_type == EntryType::Unallocated {
            String::new()
        } else {
            if name_len > 64 || name_len % 2 != 0 {
                return Err(bad(format!("bad name length {name_len}")));
            }
            let units: Vec<u16> = data[..name_len]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            String::from_utf16(&units).map_err(|_| bad("entry name is not valid UTF-16".into()))?
        };

        let u32_at = |o: usize| u32::from_le_bytes([data[o], data[o + 1], data[o + 2], data[o + 3]]);
        let u64_at = |o: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&data[o..o + 8]);
            u64::from_le_bytes(b)
        };

        let mut clsid = [0u8; 16];
        clsid.copy_from_slice(&data[80..96]);

        let mut size = u64_at(120);
        if sector_size == SectorSize::S512 {
            // Version 3 writers may leave garbage in the high half.
            size &= 0xFFFF_FFFF;
        }

        Ok(Self {
            name,
            entry_type,
            color: data[67],
            left: u32_at(68),
            right: u32_at(72),
            child: u32_at(76),
            clsid: Auid::from_le_bytes(clsid),
            state_bits: u32_at(96),
            created: u64_at(100),
            modified: u64_at(108),
            start_sector: u32_at(116),
            size,
        })
    }

    /// Serialize as 128 bytes.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let units: Vec<u16> = self.name.encode_utf16().collect();
        if units.len() > MAX_NAME_LEN {
            return Err(Error::encode(
                crate::util::EncodeErrorKind::NameTooLong,
                format!("{:?} has {} UTF-16 units", self.name, units.len()),
            ));
        }
        let mut name = [0u8; 64];
        for (i, u) in units.iter().enumerate() {
            name[i * 2..i * 2 + 2].copy_from_slice(&u.to_le_bytes());
        }
        w.write_all(&name)?;
        let name_len = if self.entry_type == EntryType::Unallocated {
            0
        } else {
            ((units.len() + 1) * 2) as u16
        };
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_u8(self.entry_type.as_u8())?;
        w.write_u8(self.color)?;
        w.write_u32::<LittleEndian>(self.left)?;
        w.write_u32::<LittleEndian>(self.right)?;
        w.write_u32::<LittleEndian>(self.child)?;
        w.write_all(&self.clsid.to_le_bytes())?;
        w.write_u32::<LittleEndian>(self.state_bits)?;
        w.write_u64::<LittleEndian>(self.created)?;
        w.write_u64::<LittleEndian>(self.modified)?;
        w.write_u32::<LittleEndian>(self.start_sector)?;
        w.write_u64::<LittleEndian>(self.size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_roundtrip() {
        let mut e = DirEntry::new("properties", EntryType::Stream);
        e.start_sector = 7;
        e.size = 300;
        e.left = 3;
        let mut buf = Vec::new();
        e.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), DIR_ENTRY_SIZE);
        let back = DirEntry::parse(&buf, 0, SectorSize::S4096).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_name_too_long() {
        let e = DirEntry::new("x".repeat(32), EntryType::Stream);
        let err = e.write_to(&mut Vec::new()).unwrap_err();
        assert_eq!(err.encode_kind(), Some(crate::util::EncodeErrorKind::NameTooLong));
    }

    #[test]
    fn test_v3_size_mask() {
        let mut e = DirEntry::new("s", EntryType::Stream);
        e.size = 0xDEAD_0000_0010;
        let mut buf = Vec::new();
        e.write_to(&mut buf).unwrap();
        let back = DirEntry::parse(&buf, 0, SectorSize::S512).unwrap();
        assert_eq!(back.size, 0x10);
    }
}
