//! Object graph layer.
//!
//! ```text
//! Container ──load_graph──> RawGraph ──resolve──> ResolvedGraph ──> ObjectRef
//!     ^                        ^
//!     └──────write_graph───────┴── GraphBuilder
//! ```
//!
//! A [`RawGraph`] is an arena of decoded instances whose strong references
//! are arena indices. [`resolve`] checks that ownership forms a tree and that
//! every weak reference and MobID reference has a target.

mod builder;
mod loader;
mod object;
mod raw;
mod resolve;
mod writer;

#[cfg(test)]
mod tests;

pub use builder::*;
pub use loader::*;
pub use object::*;
pub use raw::*;
pub use resolve::*;
pub use writer::*;
