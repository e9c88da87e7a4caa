//! Compound File Binary constants and structures.

use std::cmp::Ordering;

/// Magic bytes at the start of a compound file.
pub const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 512;

/// Header field offsets.
pub const MINOR_VERSION_OFFSET: usize = 24;
pub const MAJOR_VERSION_OFFSET: usize = 26;
pub const BYTE_ORDER_OFFSET: usize = 28;
pub const SECTOR_SHIFT_OFFSET: usize = 30;
pub const MINI_SECTOR_SHIFT_OFFSET: usize = 32;
pub const NUM_DIR_SECTORS_OFFSET: usize = 40;
pub const NUM_FAT_SECTORS_OFFSET: usize = 44;
pub const FIRST_DIR_SECTOR_OFFSET: usize = 48;
pub const MINI_CUTOFF_OFFSET: usize = 56;
pub const FIRST_MINI_FAT_OFFSET: usize = 60;
pub const NUM_MINI_FAT_OFFSET: usize = 64;
pub const FIRST_DIFAT_OFFSET: usize = 68;
pub const NUM_DIFAT_OFFSET: usize = 72;
pub const DIFAT_OFFSET: usize = 76;

/// DIFAT slots held in the header itself.
pub const HEADER_DIFAT_SLOTS: usize = 109;

/// Minor version written by this library.
pub const MINOR_VERSION: u16 = 0x003E;

/// Little-endian byte order mark.
pub const BYTE_ORDER_MARK: u16 = 0xFFFE;

/// Mini sector shift (64-byte mini sectors).
pub const MINI_SECTOR_SHIFT: u16 = 6;
pub const MINI_SECTOR_SIZE: usize = 1 << MINI_SECTOR_SHIFT;

/// Streams shorter than this live in the mini stream.
pub const MINI_STREAM_CUTOFF: u32 = 4096;

/// Largest regular sector number.
pub const MAXREGSECT: u32 = 0xFFFF_FFFA;
/// Sector holds DIFAT entries.
pub const DIFSECT: u32 = 0xFFFF_FFFC;
/// Sector holds FAT entries.
pub const FATSECT: u32 = 0xFFFF_FFFD;
/// End of a sector chain.
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
/// Unallocated sector.
pub const FREESECT: u32 = 0xFFFF_FFFF;
/// No sibling/child directory entry.
pub const NOSTREAM: u32 = 0xFFFF_FFFF;

/// Size of one directory entry.
pub const DIR_ENTRY_SIZE: usize = 128;

/// Longest entry name in UTF-16 code units (excluding the terminator).
pub const MAX_NAME_LEN: usize = 31;

/// Name of the root directory entry.
pub const ROOT_ENTRY_NAME: &str = "Root Entry";

/// Sector size of a compound file; picks the major version too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SectorSize {
    /// Version 3, 512-byte sectors
    S512,
    /// Version 4, 4096-byte sectors
    #[default]
    S4096,
}

impl SectorSize {
    #[inline]
    pub const fn shift(self) -> u16 {
        match self {
            Self::S512 => 9,
            Self::S4096 => 12,
        }
    }

    #[inline]
    pub const fn size(self) -> usize {
        1 << self.shift()
    }

    #[inline]
    pub const fn major_version(self) -> u16 {
        match self {
            Self::S512 => 3,
            Self::S4096 => 4,
        }
    }

    /// u32 entries per FAT/DIFAT sector.
    #[inline]
    pub const fn entries_per_sector(self) -> usize {
        self.size() / 4
    }

    pub fn from_major(major: u16, shift: u16) -> Option<Self> {
        match (major, shift) {
            (3, 9) => Some(Self::S512),
            (4, 12) => Some(Self::S4096),
            _ => None,
        }
    }
}

/// File offset of a regular sector.
#[inline]
pub const fn sector_offset(sector: u32, shift: u16) -> u64 {
    ((sector as u64) + 1) << shift
}

/// Directory entry object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Unallocated,
    Storage,
    Stream,
    Root,
}

impl EntryType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Unallocated),
            1 => Some(Self::Storage),
            2 => Some(Self::Stream),
            5 => Some(Self::Root),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Unallocated => 0,
            Self::Storage => 1,
            Self::Stream => 2,
            Self::Root => 5,
        }
    }

    #[inline]
    pub fn is_storage(self) -> bool {
        matches!(self, Self::Storage | Self::Root)
    }
}

/// Red-black tree node color.
pub const COLOR_RED: u8 = 0;
pub const COLOR_BLACK: u8 = 1;

/// Compare two entry names the way sibling trees are ordered:
/// shorter names first, then by uppercased UTF-16 code units.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let ua: Vec<u16> = a.encode_utf16().collect();
    let ub: Vec<u16> = b.encode_utf16().collect();
    ua.len().cmp(&ub.len()).then_with(|| {
        for (x, y) in ua.iter().zip(ub.iter()) {
            let o = upper_unit(*x).cmp(&upper_unit(*y));
            if o != Ordering::Equal {
                return o;
            }
        }
        Ordering::Equal
    })
}

fn upper_unit(u: u16) -> u16 {
    match char::from_u32(u as u32) {
        Some(c) => {
            let mut up = c.to_uppercase();
            match (up.next(), up.next()) {
                (Some(x), None) if (x as u32) <= 0xFFFF => x as u32 as u16,
                _ => u,
            }
        }
        None => u,
    }
}

/// UTF-16 length of a name.
#[inline]
pub fn name_len_utf16(name: &str) -> usize {
    name.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sector_sizes() {
        assert_eq!(SectorSize::S512.size(), 512);
        assert_eq!(SectorSize::S4096.size(), 4096);
        assert_eq!(SectorSize::default(), SectorSize::S4096);
        assert_eq!(SectorSize::from_major(3, 9), Some(SectorSize::S512));
        assert_eq!(SectorSize::from_major(3, 12), None);
        assert_eq!(sector_offset(0, 9), 512);
        assert_eq!(sector_offset(2, 12), 3 * 4096);
    }

    #[test]
    fn test_compare_names() {
        assert_eq!(compare_names("b", "aa"), Ordering::Less);
        assert_eq!(compare_names("abc", "ABC"), Ordering::Equal);
        assert_eq!(compare_names("abd", "ABC"), Ordering::Greater);
        assert_eq!(compare_names("Header-2", "properties"), Ordering::Less);
    }

    #[test]
    fn test_entry_type() {
        assert_eq!(EntryType::from_u8(5), Some(EntryType::Root));
        assert_eq!(EntryType::from_u8(3), None);
        assert!(EntryType::Root.is_storage());
        assert!(!EntryType::Stream.is_storage());
    }
}
