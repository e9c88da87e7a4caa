//! Utility types shared by every layer.
//!
//! - [`Auid`] / [`MobId`] - AAF identifiers
//! - [`Error`] / [`Result`] - Error handling

mod auid;
mod error;

pub use auid::*;
pub use error::*;
