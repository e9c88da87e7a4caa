//! The 512-byte compound file header.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::util::{DecodeErrorKind, Error, Result};

/// Parsed compound file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub sector_size: SectorSize,
    pub num_dir_sectors: u32,
    pub num_fat_sectors: u32,
    pub first_dir_sector: u32,
    pub mini_stream_cutoff: u32,
    pub first_mini_fat_sector: u32,
    pub num_mini_fat_sectors: u32,
    pub first_difat_sector: u32,
    pub num_difat_sectors: u32,
    /// First 109 FAT sector numbers.
    pub difat: [u32; HEADER_DIFAT_SLOTS],
}

fn u16_at(b: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([b[off], b[off + 1]])
}

fn u32_at(b: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

impl Header {
    /// Empty header for the given sector size.
    pub fn new(sector_size: SectorSize) -> Self {
        Self {
            sector_size,
            num_dir_sectors: 0,
            num_fat_sectors: 0,
            first_dir_sector: ENDOFCHAIN,
            mini_stream_cutoff: MINI_STREAM_CUTOFF,
            first_mini_fat_sector: ENDOFCHAIN,
            num_mini_fat_sectors: 0,
            first_difat_sector: ENDOFCHAIN,
            num_difat_sectors: 0,
            difat: [FREESECT; HEADER_DIFAT_SLOTS],
        }
    }

    /// Parse and validate the header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bad = |detail: String, offset: usize| {
            Error::decode_at(DecodeErrorKind::Header, detail, offset as u64)
        };

        if data.len() < HEADER_SIZE {
            return Err(bad(format!("file too short for header: {} bytes", data.len()), data.len()));
        }
        if data[0..8] != CFB_SIGNATURE {
            return Err(bad("bad compound file signature".into(), 0));
        }

        let byte_order = u16_at(data, BYTE_ORDER_OFFSET);
        if byte_order != BYTE_ORDER_MARK {
            return Err(bad(format!("bad byte order mark {byte_order:#06x}"), BYTE_ORDER_OFFSET));
        }

        let major = u16_at(data, MAJOR_VERSION_OFFSET);
        let shift = u16_at(data, SECTOR_SHIFT_OFFSET);
        let sector_size = SectorSize::from_major(major, shift).ok_or_else(|| {
            bad(
                format!("unsupported version {major} with sector shift {shift}"),
                MAJOR_VERSION_OFFSET,
            )
        })?;

        let mini_shift = u16_at(data, MINI_SECTOR_SHIFT_OFFSET);
        if mini_shift != MINI_SECTOR_SHIFT {
            return Err(bad(format!("bad mini sector shift {mini_shift}"), MINI_SECTOR_SHIFT_OFFSET));
        }

        let num_dir_sectors = u32_at(data, NUM_DIR_SECTORS_OFFSET);
        if sector_size == SectorSize::S512 && num_dir_sectors != 0 {
            return Err(bad(
                format!("version 3 file declares {num_dir_sectors} directory sectors"),
                NUM_DIR_SECTORS_OFFSET,
            ));
        }

        let mini_stream_cutoff = u32_at(data, MINI_CUTOFF_OFFSET);
        if mini_stream_cutoff != MINI_STREAM_CUTOFF {
            return Err(bad(format!("bad mini stream cutoff {mini_stream_cutoff}"), MINI_CUTOFF_OFFSET));
        }

        let mut difat = [FREESECT; HEADER_DIFAT_SLOTS];
        for (i, slot) in difat.iter_mut().enumerate() {
            *slot = u32_at(data, DIFAT_OFFSET + i * 4);
        }

        Ok(Self {
            sector_size,
            num_dir_sectors,
            num_fat_sectors: u32_at(data, NUM_FAT_SECTORS_OFFSET),
            first_dir_sector: u32_at(data, FIRST_DIR_SECTOR_OFFSET),
            mini_stream_cutoff,
            first_mini_fat_sector: u32_at(data, FIRST_MINI_FAT_OFFSET),
            num_mini_fat_sectors: u32_at(data, NUM_MINI_FAT_OFFSET),
            first_difat_sector: u32_at(data, FIRST_DIFAT_OFFSET),
            num_difat_sectors: u32_at(data, NUM_DIFAT_OFFSET),
            difat,
        })
    }

    #[inline]
    pub fn sector_shift(&self) -> u16 {
        self.sector_size.shift()
    }

    /// Serialize into a full first sector (512 bytes, zero-padded to the sector size).
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&CFB_SIGNATURE)?;
        w.write_all(&[0u8; 16])?; // header CLSID
        w.write_u16::<LittleEndian>(MINOR_VERSION)?;
        w.write_u16::<LittleEndian>(self.sector_size.major_version())?;
        w.write_u16::<LittleEndian>(BYTE_ORDER_MARK)?;
        w.write_u16::<LittleEndian>(self.sector_size.shift())?;
        w.write_u16::<LittleEndian>(MINI_SECTOR_SHIFT)?;
        w.write_all(&[0u8; 6])?; // reserved
        w.write_u32::<LittleEndian>(self.num_dir_sectors)?;
        w.write_u32::<LittleEndian>(self.num_fat_sectors)?;
        w.write_u32::<LittleEndian>(self.first_dir_sector)?;
        w.write_u32::<LittleEndian>(0)?; // transaction signature
        w.write_u32::<LittleEndian>(self.mini_stream_cutoff)?;
        w.write_u32::<LittleEndian>(self.first_mini_fat_sector)?;
        w.write_u32::<LittleEndian>(self.num_mini_fat_sectors)?;
        w.write_u32::<LittleEndian>(self.first_difat_sector)?;
        w.write_u32::<LittleEndian>(self.num_difat_sectors)?;
        for v in &self.difat {
            w.write_u32::<LittleEndian>(*v)?;
        }
        let pad = self.sector_size.size() - HEADER_SIZE;
        if pad > 0 {
            w.write_all(&vec![0u8; pad])?;
        }
        Ok(())
    }
}
