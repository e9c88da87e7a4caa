//! Object model layer.
//!
//! This module provides:
//! - [`TypeTag`] and [`Value`] - property types and decoded data
//! - [`StoredForm`] and the on-disk property set, index and weak-key layouts
//! - [`ClassDef`] / [`PropertyDef`] - the built-in object model
//! - [`ClassTable`] - built-in classes merged with a file's MetaDictionary
//! - [`decode_instance`] / [`encode_instance`] - property set codec

mod codec;
mod dictionary;
mod schema;
mod stored;
mod types;
mod value;

pub use codec::*;
pub use dictionary::*;
pub use schema::*;
pub use stored::*;
pub use types::*;
pub use value::*;
