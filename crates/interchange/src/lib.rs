//! # Interchange
//!
//! Neutral in-memory editorial timeline model: a [`Timeline`] holds ordered
//! [`Track`]s, each holding ordered [`Item`]s (clips, gaps, transitions,
//! nested compositions and opaque passthrough items) with [`Marker`]s and
//! string-keyed [`Metadata`] on every level.
//!
//! Times are exact: [`RationalTime`] counts integer units of a [`Rational`] rate.
//!
//! Enable the `serde` feature for `Serialize`/`Deserialize` on every type.

mod item;
mod metadata;
mod time;
mod timeline;

pub use item::*;
pub use metadata::*;
pub use time::*;
pub use timeline::*;
