//! String-keyed metadata attached to timelines, tracks, items and markers.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Rational;

/// Ordered metadata dictionary.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A metadata value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Rational(Rational),
    Bytes(Vec<u8>),
    List(Vec<MetadataValue>),
    Map(Metadata),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetadataValue]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Metadata> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Scalars that a plain tagged comment can hold (no floats, lists or maps).
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int(_) | Self::String(_) | Self::Rational(_) | Self::Bytes(_)
        )
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Rational> for MetadataValue {
    fn from(v: Rational) -> Self {
        Self::Rational(v)
    }
}

impl From<Metadata> for MetadataValue {
    fn from(v: Metadata) -> Self {
        Self::Map(v)
    }
}
