//! Public entry points.
//!
//! ```text
//! decode:  bytes ─> Container ─> version gate ─> ClassTable ─> RawGraph
//!                                                  ─> ResolvedGraph ─> Timeline(s)
//! encode:  Timeline(s) ─> RawGraph + ClassTable ─> ContainerWriter ─> bytes
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::fs::File;
//!
//! let timeline = aaf::Decoder::new(File::open("cut.aaf")?).decode()?;
//! aaf::Encoder::new(File::create("copy.aaf")?).encode(&timeline)?;
//! ```

mod options;

pub use options::*;

use std::io::{Read, Seek, Write};

use interchange::{Collection, SerializableObject, Timeline};
use tracing::debug;

use crate::cfb::{Container, ContainerWriter};
use crate::core::{load_class_dictionary, pid, probe_property, VersionType};
use crate::graph::{load_graph, resolve, write_graph, LoadStats};
use crate::mapper::{decode_timelines, encode_timelines};
use crate::util::{DecodeErrorKind, Error, Result, UnsupportedVersionError};

/// Storage path of the Header object.
const HEADER_PATH: &str = "Header-2";

/// Fail unless the file declares object model version 1.x.
///
/// Reads one raw property; no instance is decoded.
fn check_version(c: &Container) -> Result<()> {
    let Some((_, bytes)) = probe_property(c, HEADER_PATH, pid::VERSION)? else {
        return Ok(());
    };
    let version = match bytes.as_slice() {
        [major, minor, ..] => VersionType { major: *major as i8, minor: *minor as i8 },
        _ => return Err(Error::decode(DecodeErrorKind::PropertyType, "Header.Version is truncated")),
    };
    if version.major != 1 {
        return Err(UnsupportedVersionError { version: version.to_string() }.into());
    }
    Ok(())
}

/// Reads timelines from an AAF byte stream.
pub struct Decoder<R> {
    reader: R,
    stats: LoadStats,
}

impl<R: Read + Seek + Send> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, stats: LoadStats::default() }
    }

    /// Counters of the last decode.
    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// The first top-level composition as a timeline.
    pub fn decode(&mut self) -> Result<Timeline> {
        let mut timelines = self.timelines(&DecodeOptions::default())?;
        if timelines.is_empty() {
            return Err(Error::decode(DecodeErrorKind::NoComposition, "file has no composition mob"));
        }
        Ok(timelines.swap_remove(0))
    }

    /// All top-level compositions. A simplified decode of a file with
    /// exactly one composition yields the bare timeline.
    pub fn decode_with_options(&mut self, opts: &DecodeOptions) -> Result<SerializableObject> {
        let mut timelines = self.timelines(opts)?;
        if opts.simplified && timelines.len() == 1 {
            return Ok(timelines.swap_remove(0).into());
        }
        let mut collection = Collection::new("");
        collection.timelines = timelines;
        Ok(collection.into())
    }

    fn timelines(&mut self, opts: &DecodeOptions) -> Result<Vec<Timeline>> {
        self.stats = LoadStats::default();
        let c = Container::open(&mut self.reader)?;
        debug!(entries = c.entry_count(), "container opened");
        check_version(&c)?;

        let table = load_class_dictionary(&c)?;
        debug!(classes = table.len(), "class table loaded");
        let raw = load_graph(&c, &table, opts.cancel.as_deref(), &self.stats)?;
        let graph = resolve(raw, table)?;
        debug!(objects = graph.len(), "graph resolved");
        decode_timelines(&graph, opts)
    }
}

/// Writes timelines to an AAF byte stream.
pub struct Encoder<W> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn encode(&mut self, timeline: &Timeline) -> Result<()> {
        self.write(&[timeline], &EncodeOptions::default())
    }

    pub fn encode_with_options(&mut self, obj: &SerializableObject, opts: &EncodeOptions) -> Result<()> {
        let timelines = obj.timelines();
        self.write(&timelines, opts)
    }

    /// Lay out the whole container before writing any byte.
    fn write(&mut self, timelines: &[&Timeline], opts: &EncodeOptions) -> Result<()> {
        let (graph, table) = encode_timelines(timelines, opts)?;
        let mut out = ContainerWriter::create();
        write_graph(&graph, &table, &mut out)?;
        let bytes = out.finalize_to_vec()?;
        debug!(bytes = bytes.len(), instances = graph.instances.len(), "container laid out");
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Decode the first composition of `reader`.
pub fn decode<R: Read + Seek + Send>(reader: R) -> Result<Timeline> {
    Decoder::new(reader).decode()
}

/// Encode `timeline` into `writer` with default options.
pub fn encode<W: Write>(timeline: &Timeline, writer: W) -> Result<()> {
    Encoder::new(writer).encode(timeline)
}
