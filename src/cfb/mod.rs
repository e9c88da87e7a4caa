//! Low-level Compound File Binary (Structured Storage) container.
//!
//! AAF files are compound files: a small filesystem of storages and streams
//! packed into fixed-size sectors. This module reads and writes that layer
//! only; object semantics live in [`crate::core`] and [`crate::graph`].
//!
//! ## File Structure
//!
//! ```text
//! +------------------------+
//! | Header (512 bytes)     |  signature, sector shift, FAT/DIFAT/dir starts
//! | (padded to 4096 in v4) |
//! +------------------------+
//! | Sector 0               |  stream data / mini stream / mini FAT /
//! | Sector 1               |  directory / FAT / DIFAT, linked through
//! | ...                    |  the FAT as singly linked chains
//! +------------------------+
//! ```
//!
//! Streams under 4096 bytes are stored in 64-byte mini sectors inside the
//! mini stream, which is itself the root entry's chain.

mod directory;
mod format;
mod header;
mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use directory::*;
pub use format::*;
pub use header::*;
pub use reader::*;
pub use writer::*;
