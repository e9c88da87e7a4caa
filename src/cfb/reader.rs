//! Compound file reader.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::directory::DirEntry;
use super::format::*;
use super::header::Header;
use crate::util::{Auid, DecodeErrorKind, Error, Result};

/// Object-safe `Read + Seek`.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Byte source behind a container.
/// The stream variant is guarded so the container can be shared across threads.
enum Source<'s> {
    /// Whole file in memory
    Memory(Cow<'s, [u8]>),
    /// Seekable stream (reads are serialized)
    Stream(Mutex<Box<dyn ReadSeek + Send + 's>>),
}

/// Handle to a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Sector list of one stream, gathered once at open.
#[derive(Debug, Default)]
struct Chain {
    mini: bool,
    sectors: Vec<u32>,
}

#[derive(Debug)]
struct Node {
    entry: DirEntry,
    parent: Option<usize>,
    children: Vec<usize>,
    chain: Chain,
}

/// A read-only compound file.
///
/// Storages form a tree rooted at [`Container::root`]; streams are exposed as
/// random-access byte ranges. Every sector chain is validated while opening,
/// so later reads only fail on I/O errors.
pub struct Container<'s> {
    source: Source<'s>,
    len: u64,
    header: Header,
    nodes: Vec<Node>,
    mini_stream: Vec<u32>,
    by_name: HashMap<(usize, String), usize>,
}

impl std::fmt::Debug for Container<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("len", &self.len)
            .field("sector_size", &self.header.sector_size)
            .field("entries", &self.nodes.len())
            .finish()
    }
}

impl<'s> Container<'s> {
    /// Open a compound file from a seekable stream.
    pub fn open<R: Read + Seek + Send + 's>(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let source = Source::Stream(Mutex::new(Box::new(reader)));
        Self::build(source, len)
    }

    /// Open a compound file held in memory.
    pub fn from_bytes(data: &'s [u8]) -> Result<Self> {
        let len = data.len() as u64;
        Self::build(Source::Memory(Cow::Borrowed(data)), len)
    }

    /// Open a compound file from an owned buffer.
    pub fn from_vec(data: Vec<u8>) -> Result<Container<'static>> {
        let len = data.len() as u64;
        Container::build(Source::Memory(Cow::Owned(data)), len)
    }

    fn build(source: Source<'s>, len: u64) -> Result<Self> {
        let mut c = Self {
            source,
            len,
            header: Header::new(SectorSize::S512),
            nodes: Vec::new(),
            mini_stream: Vec::new(),
            by_name: HashMap::new(),
        };

        if len < HEADER_SIZE as u64 {
            return Err(Error::decode_at(
                DecodeErrorKind::Header,
                format!("file too short for header: {len} bytes"),
                len,
            ));
        }
        let mut hdr = [0u8; HEADER_SIZE];
        c.read_raw(0, &mut hdr)?;
        c.header = Header::parse(&hdr)?;

        let fat = c.load_fat()?;
        let dir_chain = c.walk_chain(c.header.first_dir_sector, &fat, None, "directory")?;
        let entries = c.load_directory(&dir_chain)?;
        let mini_fat = c.load_mini_fat(&fat)?;

        c.assemble_tree(entries, &dir_chain)?;

        let root_entry = &c.nodes[0].entry;
        if root_entry.size > 0 {
            let needed = div_ceil(root_entry.size, c.header.sector_size.size() as u64);
            c.mini_stream = c.walk_chain(root_entry.start_sector, &fat, Some(needed), "mini stream")?;
        }

        c.gather_stream_chains(&fat, &mini_fat)?;

        debug!(
            len,
            version = c.header.sector_size.major_version(),
            entries = c.nodes.len(),
            "opened compound file"
        );
        Ok(c)
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    fn read_raw(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos + buf.len() as u64;
        if end > self.len {
            return Err(Error::decode_at(
                DecodeErrorKind::AllocationTable,
                format!("read of {} bytes past end of file ({} bytes)", buf.len(), self.len),
                pos,
            ));
        }
        match &self.source {
            Source::Memory(data) => {
                buf.copy_from_slice(&data[pos as usize..end as usize]);
                Ok(())
            }
            Source::Stream(stream) => {
                let mut s = stream.lock();
                s.seek(SeekFrom::Start(pos))?;
                s.read_exact(buf)?;
                Ok(())
            }
        }
    }

    /// Read a full sector. A final sector cut short by the end of file is zero-padded.
    fn read_sector(&self, sector: u32) -> Result<Vec<u8>> {
        let shift = self.header.sector_shift();
        let size = self.header.sector_size.size();
        let pos = sector_offset(sector, shift);
        if pos >= self.len {
            return Err(Error::decode_at(
                DecodeErrorKind::AllocationTable,
                format!("sector {sector} lies beyond end of file"),
                pos,
            ));
        }
        let avail = ((self.len - pos) as usize).min(size);
        let mut buf = vec![0u8; size];
        self.read_raw(pos, &mut buf[..avail])?;
        Ok(buf)
    }

    fn sector_u32s(&self, sector: u32) -> Result<Vec<u32>> {
        let buf = self.read_sector(sector)?;
        Ok(buf
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    // ========================================================================
    // Allocation tables
    // ========================================================================

    fn load_fat(&self) -> Result<Vec<u32>> {
        let h = &self.header;
        let shift = h.sector_shift();
        let num_fat = h.num_fat_sectors as usize;
        let mut fat_sectors: Vec<u32> = h
            .difat
            .iter()
            .take(num_fat.min(HEADER_DIFAT_SLOTS))
            .copied()
            .collect();

        let per = h.sector_size.entries_per_sector();
        let mut next = h.first_difat_sector;
        let mut seen = 0u32;
        while fat_sectors.len() < num_fat {
            if next > MAXREGSECT {
                return Err(Error::decode_at(
                    DecodeErrorKind::AllocationTable,
                    format!("DIFAT chain ends after {} of {num_fat} FAT sectors", fat_sectors.len()),
                    FIRST_DIFAT_OFFSET as u64,
                ));
            }
            seen += 1;
            if seen > h.num_difat_sectors.max(1) + (self.len >> shift) as u32 {
                return Err(Error::decode_at(
                    DecodeErrorKind::AllocationTable,
                    "cyclic DIFAT chain",
                    sector_offset(next, shift),
                ));
            }
            let entries = self.sector_u32s(next)?;
            for &s in &entries[..per - 1] {
                if fat_sectors.len() < num_fat {
                    fat_sectors.push(s);
                }
            }
            next = entries[per - 1];
        }

        let mut fat = Vec::with_capacity(num_fat * per);
        for (i, &s) in fat_sectors.iter().enumerate() {
            if s > MAXREGSECT {
                return Err(Error::decode_at(
                    DecodeErrorKind::AllocationTable,
                    format!("FAT sector slot {i} holds marker {s:#x}"),
                    DIFAT_OFFSET as u64 + (i as u64) * 4,
                ));
            }
            fat.extend(self.sector_u32s(s)?);
        }
        trace!(fat_sectors = fat_sectors.len(), entries = fat.len(), "loaded FAT");
        Ok(fat)
    }

    /// Follow a chain from `start`. With `needed`, the chain must hold at least
    /// that many sectors and is cut to exactly that length.
    fn walk_chain(&self, start: u32, table: &[u32], needed: Option<u64>, what: &str) -> Result<Vec<u32>> {
        let shift = self.header.sector_shift();
        let mut out = Vec::new();
        let mut visited = HashSet::with_capacity(needed.map_or(0, |n| n.min(table.len() as u64) as usize));
        let mut cur = start;
        loop {
            if let Some(n) = needed {
                if out.len() as u64 >= n {
                    break;
                }
            }
            if cur == ENDOFCHAIN {
                break;
            }
            if cur > MAXREGSECT {
                return Err(Error::decode_at(
                    DecodeErrorKind::AllocationTable,
                    format!("{what} chain hits marker {cur:#x} after {} sectors", out.len()),
                    out.last().map(|&s| sector_offset(s, shift)).unwrap_or(0),
                ));
            }
            let idx = cur as usize;
            if idx >= table.len() {
                return Err(Error::decode_at(
                    DecodeErrorKind::AllocationTable,
                    format!("{what} chain references sector {cur} outside the allocation table"),
                    sector_offset(cur, shift),
                ));
            }
            if !visited.insert(cur) {
                return Err(Error::decode_at(
                    DecodeErrorKind::AllocationTable,
                    format!("cyclic {what} chain at sector {cur}"),
                    sector_offset(cur, shift),
                ));
            }
            out.push(cur);
            cur = table[idx];
        }
        if let Some(n) = needed {
            if (out.len() as u64) < n {
                return Err(Error::decode_at(
                    DecodeErrorKind::AllocationTable,
                    format!("truncated {what} chain: {} of {n} sectors", out.len()),
                    out.last().map(|&s| sector_offset(s, shift)).unwrap_or(0),
                ));
            }
        }
        Ok(out)
    }

    fn load_mini_fat(&self, fat: &[u32]) -> Result<Vec<u32>> {
        let h = &self.header;
        if h.num_mini_fat_sectors == 0 || h.first_mini_fat_sector == ENDOFCHAIN {
            return Ok(Vec::new());
        }
        let chain = self.walk_chain(
            h.first_mini_fat_sector,
            fat,
            Some(h.num_mini_fat_sectors as u64),
            "mini FAT",
        )?;
        let mut out = Vec::with_capacity(chain.len() * h.sector_size.entries_per_sector());
        for s in chain {
            out.extend(self.sector_u32s(s)?);
        }
        Ok(out)
    }

    // ========================================================================
    // Directory
    // ========================================================================

    fn entry_offset(&self, dir_chain: &[u32], index: usize) -> u64 {
        let per = self.header.sector_size.size() / DIR_ENTRY_SIZE;
        match dir_chain.get(index / per) {
            Some(&s) => {
                sector_offset(s, self.header.sector_shift()) + ((index % per) * DIR_ENTRY_SIZE) as u64
            }
            None => 0,
        }
    }

    fn load_directory(&self, dir_chain: &[u32]) -> Result<Vec<DirEntry>> {
        let ssz = self.header.sector_size;
        let shift = ssz.shift();
        let mut entries = Vec::new();
        for &s in dir_chain {
            let buf = self.read_sector(s)?;
            for (i, chunk) in buf.chunks_exact(DIR_ENTRY_SIZE).enumerate() {
                let offset = sector_offset(s, shift) + (i * DIR_ENTRY_SIZE) as u64;
                entries.push(DirEntry::parse(chunk, offset, ssz)?);
            }
        }
        if entries.is_empty() || entries[0].entry_type != EntryType::Root {
            return Err(Error::decode_at(
                DecodeErrorKind::Directory,
                "first directory entry is not the root",
                self.entry_offset(dir_chain, 0),
            ));
        }
        Ok(entries)
    }

    /// Link entries into a tree, rejecting out-of-range indices and entries
    /// reached twice.
    fn assemble_tree(&mut self, entries: Vec<DirEntry>, dir_chain: &[u32]) -> Result<()> {
        let count = entries.len();
        let mut visited = vec![false; count];
        let mut parent = vec![None; count];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        visited[0] = true;

        let mut storages = vec![0usize];
        while let Some(storage) = storages.pop() {
            let mut stack = Vec::new();
            let first = entries[storage].child;
            if first != NOSTREAM {
                stack.push((first, storage));
            }
            while let Some((idx, referrer)) = stack.pop() {
                let i = idx as usize;
                if i >= count {
                    return Err(Error::decode_at(
                        DecodeErrorKind::Directory,
                        format!("entry {referrer} references nonexistent entry {idx}"),
                        self.entry_offset(dir_chain, referrer),
                    ));
                }
                if visited[i] {
                    return Err(Error::decode_at(
                        DecodeErrorKind::Directory,
                        format!("entry {i} reached twice"),
                        self.entry_offset(dir_chain, i),
                    ));
                }
                let e = &entries[i];
                if e.entry_type == EntryType::Unallocated || e.entry_type == EntryType::Root {
                    return Err(Error::decode_at(
                        DecodeErrorKind::Directory,
                        format!("entry {referrer} links to invalid entry {i}"),
                        self.entry_offset(dir_chain, i),
                    ));
                }
                visited[i] = true;
                parent[i] = Some(storage);
                children[storage].push(i);
                if e.left != NOSTREAM {
                    stack.push((e.left, i));
                }
                if e.right != NOSTREAM {
                    stack.push((e.right, i));
                }
                if e.entry_type.is_storage() {
                    storages.push(i);
                }
            }
        }

        for kids in children.iter_mut() {
            kids.sort_by(|&a, &b| compare_names(&entries[a].name, &entries[b].name));
        }

        self.nodes = entries
            .into_iter()
            .zip(parent)
            .zip(children)
            .map(|((entry, parent), children)| Node { entry, parent, children, chain: Chain::default() })
            .collect();

        for (i, n) in self.nodes.iter().enumerate() {
            if let Some(p) = n.parent {
                self.by_name.insert((p, n.entry.name.clone()), i);
            }
        }
        Ok(())
    }

    fn gather_stream_chains(&mut self, fat: &[u32], mini_fat: &[u32]) -> Result<()> {
        let ssz = self.header.sector_size.size() as u64;
        let mini_len = self.nodes[0].entry.size;
        let mut chains = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let e = &node.entry;
            if e.entry_type != EntryType::Stream || node.parent.is_none() || e.size == 0 {
                chains.push(Chain::default());
                continue;
            }
            if e.size < self.header.mini_stream_cutoff as u64 {
                let needed = div_ceil(e.size, MINI_SECTOR_SIZE as u64);
                let sectors = self.walk_chain(e.start_sector, mini_fat, Some(needed), &e.name)?;
                if let Some(&bad) = sectors
                    .iter()
                    .find(|&&s| (s as u64 + 1) * MINI_SECTOR_SIZE as u64 > mini_len)
                {
                    return Err(Error::decode_at(
                        DecodeErrorKind::AllocationTable,
                        format!("mini sector {bad} of {:?} lies beyond the mini stream", e.name),
                        bad as u64 * MINI_SECTOR_SIZE as u64,
                    ));
                }
                chains.push(Chain { mini: true, sectors });
            } else {
                let needed = div_ceil(e.size, ssz);
                let sectors = self.walk_chain(e.start_sector, fat, Some(needed), &e.name)?;
                let shift = self.header.sector_shift();
                if let Some(&bad) = sectors.iter().find(|&&s| sector_offset(s, shift) >= self.len) {
                    return Err(Error::decode_at(
                        DecodeErrorKind::AllocationTable,
                        format!("sector {bad} of {:?} lies beyond end of file", e.name),
                        sector_offset(bad, shift),
                    ));
                }
                chains.push(Chain { mini: false, sectors });
            }
        }
        for (node, chain) in self.nodes.iter_mut().zip(chains) {
            node.chain = chain;
        }
        Ok(())
    }

    // ========================================================================
    // Tree navigation
    // ========================================================================

    /// Sector size of the file.
    #[inline]
    pub fn sector_size(&self) -> SectorSize {
        self.header.sector_size
    }

    /// Total file length.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// The root storage.
    #[inline]
    pub fn root(&self) -> EntryId {
        EntryId(0)
    }

    /// Look up an entry by `/`-separated path relative to the root.
    pub fn entry(&self, path: &str) -> Option<EntryId> {
        let mut cur = 0usize;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            cur = *self.by_name.get(&(cur, part.to_string()))?;
        }
        Some(EntryId(cur))
    }

    /// Named child of a storage.
    pub fn child(&self, parent: EntryId, name: &str) -> Option<EntryId> {
        self.by_name.get(&(parent.0, name.to_string())).map(|&i| EntryId(i))
    }

    /// Children of a storage, in sibling-tree order.
    pub fn children(&self, id: EntryId) -> impl Iterator<Item = EntryId> + '_ {
        self.nodes[id.0].children.iter().map(|&i| EntryId(i))
    }

    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.nodes[id.0].parent.map(EntryId)
    }

    pub fn name(&self, id: EntryId) -> &str {
        &self.nodes[id.0].entry.name
    }

    pub fn clsid(&self, id: EntryId) -> Auid {
        self.nodes[id.0].entry.clsid
    }

    pub fn entry_type(&self, id: EntryId) -> EntryType {
        self.nodes[id.0].entry.entry_type
    }

    #[inline]
    pub fn is_storage(&self, id: EntryId) -> bool {
        self.entry_type(id).is_storage()
    }

    #[inline]
    pub fn is_stream(&self, id: EntryId) -> bool {
        self.entry_type(id) == EntryType::Stream
    }

    /// Full path of an entry.
    pub fn path_of(&self, id: EntryId) -> String {
        let mut parts = Vec::new();
        let mut cur = id.0;
        while let Some(p) = self.nodes[cur].parent {
            parts.push(self.nodes[cur].entry.name.as_str());
            cur = p;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Number of live entries (root included).
    pub fn entry_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.parent.is_some()).count() + 1
    }

    // ========================================================================
    // Stream access
    // ========================================================================

    /// Length of a stream in bytes.
    pub fn stream_len(&self, id: EntryId) -> u64 {
        let e = &self.nodes[id.0].entry;
        if e.entry_type == EntryType::Stream {
            e.size
        } else {
            0
        }
    }

    /// Read up to `buf.len()` bytes at `offset` within a stream.
    pub fn read_at(&self, id: EntryId, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let node = &self.nodes[id.0];
        if node.entry.entry_type != EntryType::Stream {
            return Err(Error::decode(
                DecodeErrorKind::Stream,
                format!("{:?} is not a stream", self.path_of(id)),
            ));
        }
        let size = node.entry.size;
        if offset >= size {
            return Ok(0);
        }
        let total = ((size - offset) as usize).min(buf.len());
        let shift = self.header.sector_shift();
        let ssz = self.header.sector_size.size() as u64;
        let unit = if node.chain.mini { MINI_SECTOR_SIZE as u64 } else { ssz };

        let mut done = 0usize;
        while done < total {
            let pos = offset + done as u64;
            let k = (pos / unit) as usize;
            let within = pos % unit;
            let n = ((unit - within) as usize).min(total - done);
            let sector = node.chain.sectors[k];
            let file_pos = if node.chain.mini {
                let mpos = sector as u64 * MINI_SECTOR_SIZE as u64 + within;
                let big = self.mini_stream[(mpos / ssz) as usize];
                sector_offset(big, shift) + mpos % ssz
            } else {
                sector_offset(sector, shift) + within
            };
            self.read_raw(file_pos, &mut buf[done..done + n])?;
            done += n;
        }
        Ok(total)
    }

    /// Read a whole stream.
    pub fn read_entry(&self, id: EntryId) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.stream_len(id) as usize];
        let n = self.read_at(id, 0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Read a whole stream by path.
    pub fn read_stream(&self, path: &str) -> Result<Vec<u8>> {
        let id = self
            .entry(path)
            .ok_or_else(|| Error::decode(DecodeErrorKind::Stream, format!("no stream {path:?}")))?;
        self.read_entry(id)
    }
}

#[inline]
fn div_ceil(a: u64, b: u64) -> u64 {
    a.div_ceil(b)
}
