//! # AAF
//!
//! Rust implementation of the Advanced Authoring Format (.aaf) for editorial
//! interchange: reads and writes the compositions of an AAF file as
//! [`interchange`] timelines.
//!
//! ## Modules
//!
//! - [`util`] - Identifiers and errors
//! - [`cfb`] - Compound File Binary container
//! - [`core`] - Object model: classes, property sets, value codec
//! - [`graph`] - Object graph loading, reference resolution and writing
//! - [`mapper`] - Compositions to timelines and back
//! - [`facade`] - [`Decoder`], [`Encoder`] and their options
//!
//! ## Example
//!
//! ```ignore
//! use std::fs::File;
//!
//! let timeline = aaf::decode(File::open("cut.aaf")?)?;
//! for track in &timeline.tracks {
//!     println!("{} ({} items)", track.name, track.items.len());
//! }
//! ```

pub mod util;
pub mod cfb;
pub mod core;
pub mod graph;
pub mod mapper;
pub mod facade;

pub use facade::{decode, encode, DecodeOptions, Decoder, EncodeOptions, Encoder, MetadataEncoding, OptionValue};
pub use util::{Auid, DecodeErrorKind, EncodeErrorKind, Error, MobId, Result, UnsupportedVersionError};

pub use interchange;
pub use interchange::{
    Clip, Collection, Effect, Gap, Item, Marker, MediaReference, Metadata, MetadataValue, Nested, OpaqueItem,
    Rational, RationalTime, SerializableObject, TimeRange, Timeline, Track, TrackKind, Transition, TransitionType,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::facade::{DecodeOptions, Decoder, EncodeOptions, Encoder};
    pub use crate::util::{Error, Result};
    pub use interchange::*;
}
