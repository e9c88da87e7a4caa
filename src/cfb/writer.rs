//! Compound file writer.
//!
//! Storages and streams are collected in memory. [`ContainerWriter::finalize`]
//! computes the whole layout first and only then writes, so a failed layout
//! never leaves partial output behind.
//!
//! Sectors are allocated first-fit in this order: regular streams, mini
//! stream, mini FAT, directory, FAT, DIFAT.

use std::collections::HashMap;
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use super::directory::DirEntry;
use super::format::*;
use super::header::Header;
use crate::util::{Auid, EncodeErrorKind, Error, Result};

#[derive(Debug)]
enum NodeKind {
    Storage { clsid: Auid, children: Vec<usize> },
    Stream(Vec<u8>),
}

#[derive(Debug)]
struct WriterNode {
    name: String,
    kind: NodeKind,
}

/// Builder for a compound file.
#[derive(Debug)]
pub struct ContainerWriter {
    sector_size: SectorSize,
    nodes: Vec<WriterNode>,
    index: HashMap<(usize, String), usize>,
}

impl Default for ContainerWriter {
    fn default() -> Self {
        Self::create()
    }
}

fn layout_err(msg: impl Into<String>) -> Error {
    Error::encode(EncodeErrorKind::Layout, msg)
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(layout_err("empty entry name"));
    }
    let n = name_len_utf16(name);
    if n > MAX_NAME_LEN {
        return Err(Error::encode(
            EncodeErrorKind::NameTooLong,
            format!("{name:?} has {n} UTF-16 units (limit {MAX_NAME_LEN})"),
        ));
    }
    Ok(())
}

impl ContainerWriter {
    /// Empty container with 4096-byte sectors.
    pub fn create() -> Self {
        Self {
            sector_size: SectorSize::default(),
            nodes: vec![WriterNode {
                name: ROOT_ENTRY_NAME.to_string(),
                kind: NodeKind::Storage { clsid: Auid::NIL, children: Vec::new() },
            }],
            index: HashMap::new(),
        }
    }

    /// Choose the sector size (and so the file version).
    pub fn with_sector_size(mut self, sector_size: SectorSize) -> Self {
        self.sector_size = sector_size;
        self
    }

    #[inline]
    pub fn sector_size(&self) -> SectorSize {
        self.sector_size
    }

    /// Walk to the storage holding the last path component, creating
    /// intermediate storages as needed.
    fn parent_of<'p>(&mut self, path: &'p str) -> Result<(usize, &'p str)> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let Some((leaf, dirs)) = parts.split_last() else {
            return Err(layout_err("empty path"));
        };
        let mut cur = 0usize;
        for dir in dirs {
            cur = self.ensure_storage(cur, dir)?;
        }
        check_name(leaf)?;
        Ok((cur, *leaf))
    }

    fn ensure_storage(&mut self, parent: usize, name: &str) -> Result<usize> {
        if let Some(&i) = self.index.get(&(parent, name.to_string())) {
            return match self.nodes[i].kind {
                NodeKind::Storage { .. } => Ok(i),
                NodeKind::Stream(_) => Err(layout_err(format!("{name:?} is a stream, not a storage"))),
            };
        }
        check_name(name)?;
        self.add_child(parent, name, NodeKind::Storage { clsid: Auid::NIL, children: Vec::new() })
    }

    fn add_child(&mut self, parent: usize, name: &str, kind: NodeKind) -> Result<usize> {
        let idx = self.nodes.len();
        self.nodes.push(WriterNode { name: name.to_string(), kind });
        match &mut self.nodes[parent].kind {
            NodeKind::Storage { children, .. } => children.push(idx),
            NodeKind::Stream(_) => return Err(layout_err("parent is a stream")),
        }
        self.index.insert((parent, name.to_string()), idx);
        Ok(idx)
    }

    /// Create a storage (and any missing parents) with the given class id.
    pub fn create_storage(&mut self, path: &str, clsid: Auid) -> Result<()> {
        let (parent, leaf) = self.parent_of(path)?;
        let idx = self.ensure_storage(parent, leaf)?;
        if let NodeKind::Storage { clsid: c, .. } = &mut self.nodes[idx].kind {
            *c = clsid;
        }
        Ok(())
    }

    /// Set the class id of an existing storage; `""` names the root.
    pub fn set_clsid(&mut self, path: &str, clsid: Auid) -> Result<()> {
        let mut cur = 0usize;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            cur = *self
                .index
                .get(&(cur, part.to_string()))
                .ok_or_else(|| layout_err(format!("no storage {path:?}")))?;
        }
        match &mut self.nodes[cur].kind {
            NodeKind::Storage { clsid: c, .. } => {
                *c = clsid;
                Ok(())
            }
            NodeKind::Stream(_) => Err(layout_err(format!("{path:?} is a stream"))),
        }
    }

    /// Add or replace a stream.
    pub fn write_stream(&mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let (parent, leaf) = self.parent_of(path)?;
        let bytes = bytes.into();
        if let Some(&i) = self.index.get(&(parent, leaf.to_string())) {
            return match &mut self.nodes[i].kind {
                NodeKind::Stream(data) => {
                    *data = bytes;
                    Ok(())
                }
                NodeKind::Storage { .. } => Err(layout_err(format!("{path:?} is a storage"))),
            };
        }
        self.add_child(parent, leaf, NodeKind::Stream(bytes))?;
        Ok(())
    }

    /// Number of entries including the root.
    pub fn entry_count(&self) -> usize {
        self.nodes.len()
    }

    /// Lay out the file and write it to `w`.
    pub fn finalize<W: Write>(&self, w: &mut W) -> Result<()> {
        let bytes = self.finalize_to_vec()?;
        w.write_all(&bytes)?;
        w.flush()?;
        Ok(())
    }

    /// Lay out the file in memory.
    pub fn finalize_to_vec(&self) -> Result<Vec<u8>> {
        let ssz = self.sector_size.size();
        let per = self.sector_size.entries_per_sector();

        // Directory order: breadth first from the root.
        let mut order = vec![0usize];
        let mut dir_index = vec![0u32; self.nodes.len()];
        let mut head = 0;
        while head < order.len() {
            let n = order[head];
            head += 1;
            if let NodeKind::Storage { children, .. } = &self.nodes[n].kind {
                for &c in children {
                    dir_index[c] = order.len() as u32;
                    order.push(c);
                }
            }
        }

        // Split streams between regular sectors and the mini stream.
        let mut big: Vec<usize> = Vec::new();
        let mut mini: Vec<usize> = Vec::new();
        for &n in &order {
            if let NodeKind::Stream(data) = &self.nodes[n].kind {
                if data.is_empty() {
                    continue;
                }
                if data.len() < MINI_STREAM_CUTOFF as usize {
                    mini.push(n);
                } else {
                    big.push(n);
                }
            }
        }

        let mut start_of: HashMap<usize, u32> = HashMap::new();
        let mut mini_data: Vec<u8> = Vec::new();
        let mut mini_fat: Vec<u32> = Vec::new();
        for &n in &mini {
            if let NodeKind::Stream(data) = &self.nodes[n].kind {
                let start = mini_fat.len() as u32;
                let count = data.len().div_ceil(MINI_SECTOR_SIZE);
                for i in 0..count {
                    mini_fat.push(if i + 1 < count { start + i as u32 + 1 } else { ENDOFCHAIN });
                }
                mini_data.extend_from_slice(data);
                mini_data.resize(mini_fat.len() * MINI_SECTOR_SIZE, 0);
                start_of.insert(n, start);
            }
        }

        let mut fat: Vec<u32> = Vec::new();
        let alloc = |count: usize, fat: &mut Vec<u32>| -> u32 {
            if count == 0 {
                return ENDOFCHAIN;
            }
            let start = fat.len() as u32;
            for i in 0..count {
                fat.push(if i + 1 < count { start + i as u32 + 1 } else { ENDOFCHAIN });
            }
            start
        };

        for &n in &big {
            if let NodeKind::Stream(data) = &self.nodes[n].kind {
                let s = alloc(data.len().div_ceil(ssz), &mut fat);
                start_of.insert(n, s);
            }
        }
        let mini_stream_sectors = mini_data.len().div_ceil(ssz);
        let mini_stream_start = alloc(mini_stream_sectors, &mut fat);
        let mini_fat_sectors = (mini_fat.len() * 4).div_ceil(ssz);
        let mini_fat_start = alloc(mini_fat_sectors, &mut fat);
        let dir_sectors = (order.len() * DIR_ENTRY_SIZE).div_ceil(ssz);
        let dir_start = alloc(dir_sectors, &mut fat);

        // FAT and DIFAT sizes depend on each other.
        let data_sectors = fat.len();
        let (mut n_fat, mut n_difat) = (1usize, 0usize);
        loop {
            let total = data_sectors + n_fat + n_difat;
            let nf = total.div_ceil(per);
            let nd = if nf > HEADER_DIFAT_SLOTS {
                (nf - HEADER_DIFAT_SLOTS).div_ceil(per - 1)
            } else {
                0
            };
            if nf == n_fat && nd == n_difat {
                break;
            }
            n_fat = nf;
            n_difat = nd;
        }
        let fat_start = fat.len() as u32;
        fat.extend(std::iter::repeat(FATSECT).take(n_fat));
        let difat_start = fat.len() as u32;
        fat.extend(std::iter::repeat(DIFSECT).take(n_difat));
        let total_sectors = fat.len();
        if total_sectors as u64 > MAXREGSECT as u64 {
            return Err(layout_err("file too large for compound layout"));
        }
        fat.resize(n_fat * per, FREESECT);

        // Directory entries.
        let mut entries: Vec<DirEntry> = order
            .iter()
            .map(|&n| {
                let node = &self.nodes[n];
                match &node.kind {
                    NodeKind::Storage { clsid, .. } => {
                        let t = if n == 0 { EntryType::Root } else { EntryType::Storage };
                        let mut e = DirEntry::new(node.name.clone(), t);
                        e.clsid = *clsid;
                        e
                    }
                    NodeKind::Stream(data) => {
                        let mut e = DirEntry::new(node.name.clone(), EntryType::Stream);
                        e.size = data.len() as u64;
                        e.start_sector = start_of.get(&n).copied().unwrap_or(ENDOFCHAIN);
                        e
                    }
                }
            })
            .collect();
        entries[0].start_sector = mini_stream_start;
        entries[0].size = mini_data.len() as u64;

        for &n in &order {
            if let NodeKind::Storage { children, .. } = &self.nodes[n].kind {
                let mut sorted: Vec<u32> = children.iter().map(|&c| dir_index[c]).collect();
                sorted.sort_by(|&a, &b| compare_names(&entries[a as usize].name, &entries[b as usize].name));
                for pair in sorted.windows(2) {
                    let (a, b) = (&entries[pair[0] as usize].name, &entries[pair[1] as usize].name);
                    if compare_names(a, b).is_eq() {
                        return Err(layout_err(format!("sibling names {a:?} and {b:?} collide")));
                    }
                }
                let root = build_tree(&sorted, &mut entries);
                entries[dir_index[n] as usize].child = root;
            }
        }

        // Emit.
        let mut header = Header::new(self.sector_size);
        header.num_dir_sectors = if self.sector_size == SectorSize::S4096 { dir_sectors as u32 } else { 0 };
        header.num_fat_sectors = n_fat as u32;
        header.first_dir_sector = dir_start;
        header.first_mini_fat_sector = mini_fat_start;
        header.num_mini_fat_sectors = mini_fat_sectors as u32;
        header.first_difat_sector = if n_difat > 0 { difat_start } else { ENDOFCHAIN };
        header.num_difat_sectors = n_difat as u32;
        for i in 0..n_fat.min(HEADER_DIFAT_SLOTS) {
            header.difat[i] = fat_start + i as u32;
        }

        let mut out: Vec<u8> = Vec::with_capacity((total_sectors + 1) * ssz);
        header.write_to(&mut out)?;

        for &n in &big {
            if let NodeKind::Stream(data) = &self.nodes[n].kind {
                out.extend_from_slice(data);
                pad_to(&mut out, ssz, 0);
            }
        }
        out.extend_from_slice(&mini_data);
        pad_to(&mut out, ssz, 0);

        for v in &mini_fat {
            out.write_u32::<LittleEndian>(*v)?;
        }
        pad_u32s(&mut out, ssz, FREESECT)?;

        for e in &entries {
            e.write_to(&mut out)?;
        }
        let empty = DirEntry::empty();
        while (out.len() % ssz) != 0 {
            empty.write_to(&mut out)?;
        }

        for v in &fat {
            out.write_u32::<LittleEndian>(*v)?;
        }

        let mut remaining: Vec<u32> = (HEADER_DIFAT_SLOTS..n_fat).map(|i| fat_start + i as u32).collect();
        for d in 0..n_difat {
            let take = remaining.len().min(per - 1);
            let chunk: Vec<u32> = remaining.drain(..take).collect();
            for v in &chunk {
                out.write_u32::<LittleEndian>(*v)?;
            }
            for _ in chunk.len()..per - 1 {
                out.write_u32::<LittleEndian>(FREESECT)?;
            }
            let next = if d + 1 < n_difat { difat_start + d as u32 + 1 } else { ENDOFCHAIN };
            out.write_u32::<LittleEndian>(next)?;
        }

        debug_assert_eq!(out.len(), (total_sectors + 1) * ssz);
        debug!(
            entries = order.len(),
            sectors = total_sectors,
            bytes = out.len(),
            "laid out compound file"
        );
        Ok(out)
    }
}

/// Balanced binary tree over names already in order; every node is black.
fn build_tree(sorted: &[u32], entries: &mut [DirEntry]) -> u32 {
    if sorted.is_empty() {
        return NOSTREAM;
    }
    let mid = sorted.len() / 2;
    let root = sorted[mid];
    let left = build_tree(&sorted[..mid], entries);
    let right = build_tree(&sorted[mid + 1..], entries);
    let e = &mut entries[root as usize];
    e.left = left;
    e.right = right;
    e.color = COLOR_BLACK;
    root
}

fn pad_to(out: &mut Vec<u8>, ssz: usize, byte: u8) {
    let rem = out.len() % ssz;
    if rem != 0 {
        out.resize(out.len() + ssz - rem, byte);
    }
}

fn pad_u32s(out: &mut Vec<u8>, ssz: usize, value: u32) -> Result<()> {
    while out.len() % ssz != 0 {
        out.write_u32::<LittleEndian>(value)?;
    }
    Ok(())
}
