//! Decode and encode options.
//!
//! Options arrive either through the typed builder methods or as a string
//! keyed map. Map keys are accepted in camelCase and snake_case; keys that are
//! not recognized are ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use interchange::Rational;
use tracing::{debug, warn};

/// A loosely typed option value.
#[derive(Debug, Clone)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    String(String),
    Rational(Rational),
    /// Shared flag, used for cancellation.
    Flag(Arc<AtomicBool>),
}

impl OptionValue {
    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn as_rational(&self) -> Option<Rational> {
        match self {
            Self::Rational(r) => Some(*r),
            Self::Int(i) => i32::try_from(*i).ok().map(Rational::whole),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Int(i) => usize::try_from(*i).ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Rational> for OptionValue {
    fn from(v: Rational) -> Self {
        Self::Rational(v)
    }
}

impl From<Arc<AtomicBool>> for OptionValue {
    fn from(v: Arc<AtomicBool>) -> Self {
        Self::Flag(v)
    }
}

/// `attachMarkers` and `attach_markers` both become `attachmarkers`.
fn normalize(key: &str) -> String {
    key.chars().filter(|c| *c != '_' && *c != '-').flat_map(char::to_lowercase).collect()
}

fn bad_value(key: &str, v: &OptionValue) {
    warn!(key, value = ?v, "option value has the wrong type, ignored");
}

// ============================================================================
// Decode
// ============================================================================

/// Options of a decode.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Collapse single-track, single-item nested compositions and return a
    /// bare timeline when the file holds exactly one composition.
    pub simplified: bool,
    /// Move track markers onto the clip containing their start.
    pub attach_markers: bool,
    /// Map constant speed changes to clip time warps.
    pub transcribe_linear_speed_effects: bool,
    /// Override the detected timeline rate.
    pub rate: Option<Rational>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            simplified: false,
            attach_markers: false,
            transcribe_linear_speed_effects: true,
            rate: None,
            cancel: None,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &HashMap<String, OptionValue>) -> Self {
        let mut o = Self::default();
        for (key, v) in map {
            match normalize(key).as_str() {
                "simplified" | "simplify" => match v.as_bool() {
                    Some(b) => o.simplified = b,
                    None => bad_value(key, v),
                },
                "attachmarkers" => match v.as_bool() {
                    Some(b) => o.attach_markers = b,
                    None => bad_value(key, v),
                },
                "transcribelinearspeedeffects" => match v.as_bool() {
                    Some(b) => o.transcribe_linear_speed_effects = b,
                    None => bad_value(key, v),
                },
                "rate" => match v.as_rational() {
                    Some(r) => o.rate = Some(r),
                    None => bad_value(key, v),
                },
                "cancel" => match v {
                    OptionValue::Flag(f) => o.cancel = Some(f.clone()),
                    _ => bad_value(key, v),
                },
                _ => debug!(key = %key, "unrecognized decode option"),
            }
        }
        o
    }

    pub fn with_simplified(mut self, v: bool) -> Self {
        self.simplified = v;
        self
    }

    pub fn with_attach_markers(mut self, v: bool) -> Self {
        self.attach_markers = v;
        self
    }

    pub fn with_transcribe_linear_speed_effects(mut self, v: bool) -> Self {
        self.transcribe_linear_speed_effects = v;
        self
    }

    pub fn with_rate(mut self, rate: Rational) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }
}

// ============================================================================
// Encode
// ============================================================================

/// How strings are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataEncoding {
    #[default]
    Utf16,
    /// Non-ASCII characters become `?`.
    Ascii,
}

impl MetadataEncoding {
    /// Apply the encoding to a string about to be written.
    pub fn apply(self, s: &str) -> String {
        match self {
            Self::Utf16 => s.to_string(),
            Self::Ascii => s.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect(),
        }
    }
}

/// Options of an encode.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub metadata_encoding: MetadataEncoding,
    /// Simplify timelines before writing them.
    pub simplify: bool,
    /// Longest clip name written, in characters.
    pub clip_name_limit: Option<usize>,
}

impl EncodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &HashMap<String, OptionValue>) -> Self {
        let mut o = Self::default();
        for (key, v) in map {
            match normalize(key).as_str() {
                "metadataencoding" => match v {
                    OptionValue::String(s) => match s.to_ascii_lowercase().as_str() {
                        "ascii" => o.metadata_encoding = MetadataEncoding::Ascii,
                        "utf-16" | "utf16" | "utf-16le" => o.metadata_encoding = MetadataEncoding::Utf16,
                        _ => bad_value(key, v),
                    },
                    _ => bad_value(key, v),
                },
                "simplify" | "simplified" => match v.as_bool() {
                    Some(b) => o.simplify = b,
                    None => bad_value(key, v),
                },
                "clipnamelimit" => match v.as_usize() {
                    Some(n) => o.clip_name_limit = Some(n),
                    None => bad_value(key, v),
                },
                _ => debug!(key = %key, "unrecognized encode option"),
            }
        }
        o
    }

    pub fn with_metadata_encoding(mut self, e: MetadataEncoding) -> Self {
        self.metadata_encoding = e;
        self
    }

    pub fn with_simplify(mut self, v: bool) -> Self {
        self.simplify = v;
        self
    }

    pub fn with_clip_name_limit(mut self, n: usize) -> Self {
        self.clip_name_limit = Some(n);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_from_map() {
        let flag = Arc::new(AtomicBool::new(false));
        let map: HashMap<String, OptionValue> = [
            ("simplified".to_string(), OptionValue::from(true)),
            ("attach_markers".to_string(), OptionValue::from("yes")),
            ("transcribeLinearSpeedEffects".to_string(), OptionValue::from(false)),
            ("rate".to_string(), OptionValue::from("30000/1001")),
            ("cancel".to_string(), OptionValue::from(flag.clone())),
            ("somethingElse".to_string(), OptionValue::from(1)),
        ]
        .into_iter()
        .collect();
        let o = DecodeOptions::from_map(&map);
        assert!(o.simplified);
        assert!(o.attach_markers);
        assert!(!o.transcribe_linear_speed_effects);
        assert_eq!(o.rate, Some(Rational::new(30000, 1001)));
        assert!(!o.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(o.is_cancelled());
    }

    #[test]
    fn test_encode_from_map() {
        let map: HashMap<String, OptionValue> = [
            ("metadataEncoding".to_string(), OptionValue::from("ascii")),
            ("clip_name_limit".to_string(), OptionValue::from(8)),
            ("simplify".to_string(), OptionValue::from("maybe")),
        ]
        .into_iter()
        .collect();
        let o = EncodeOptions::from_map(&map);
        assert_eq!(o.metadata_encoding, MetadataEncoding::Ascii);
        assert_eq!(o.clip_name_limit, Some(8));
        assert!(!o.simplify);
        assert_eq!(MetadataEncoding::Ascii.apply("Café"), "Caf?");
    }
}
