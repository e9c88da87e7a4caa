//! Error types for the AAF library.

use std::fmt;
use thiserror::Error;

/// Classification of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    /// Malformed compound-file header
    Header,
    /// Corrupt, truncated or cyclic sector chain
    AllocationTable,
    /// Directory entry out of range or reached twice
    Directory,
    /// Stream missing or unreadable
    Stream,
    /// Object storage whose class is neither built in nor declared by the file
    UnknownClass,
    /// Property value that does not match its declared type
    PropertyType,
    /// Required property absent
    MissingProperty,
    /// Malformed property set, index stream or object layout
    Structure,
    /// Strong reference back to an ancestor
    CyclicOwnership,
    /// Object owned by more than one strong reference
    MultipleOwners,
    /// Weak reference or identifier that names nothing
    DanglingReference,
    /// Two objects registered under the same identifier
    DuplicateIdentifier,
    /// Decode interrupted through the cancel flag
    Cancelled,
    /// No composition to return
    NoComposition,
}

impl DecodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::AllocationTable => "allocation table",
            Self::Directory => "directory",
            Self::Stream => "stream",
            Self::UnknownClass => "unknown class",
            Self::PropertyType => "property type",
            Self::MissingProperty => "missing property",
            Self::Structure => "structure",
            Self::CyclicOwnership => "cyclic ownership",
            Self::MultipleOwners => "multiple owners",
            Self::DanglingReference => "dangling reference",
            Self::DuplicateIdentifier => "duplicate identifier",
            Self::Cancelled => "cancelled",
            Self::NoComposition => "no composition",
        }
    }

    /// True for failures of the compound-file layer.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            Self::Header | Self::AllocationTable | Self::Directory | Self::Stream
        )
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal decode failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {detail}{}", fmt_offset(.offset))]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub detail: String,
    /// File offset of the offending bytes, when known.
    pub offset: Option<u64>,
}

fn fmt_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(o) => format!(" (at offset {o:#x})"),
        None => String::new(),
    }
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into(), offset: None }
    }

    /// Attach the file offset.
    pub fn at(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Classification of an encode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeErrorKind {
    /// Timeline construct with no AAF representation
    UnsupportedConstruct,
    /// Zero or negative edit rate
    InvalidRate,
    /// Storage or stream name longer than 31 UTF-16 units
    NameTooLong,
    /// Opaque item payload that cannot be rebuilt
    InvalidOpaquePayload,
    /// Compound-file layout failure
    Layout,
}

impl EncodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsupportedConstruct => "unsupported construct",
            Self::InvalidRate => "invalid rate",
            Self::NameTooLong => "name too long",
            Self::InvalidOpaquePayload => "invalid opaque payload",
            Self::Layout => "layout",
        }
    }
}

impl fmt::Display for EncodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal encode failure. Nothing is written when this is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {detail}")]
pub struct EncodeError {
    pub kind: EncodeErrorKind,
    pub detail: String,
}

impl EncodeError {
    pub fn new(kind: EncodeErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

/// The file declares an object model major version other than 1.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported AAF version: {version}")]
pub struct UnsupportedVersionError {
    pub version: String,
}

/// Main error type for AAF operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Decode failure
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Encode failure
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Unsupported object model version
    #[error(transparent)]
    UnsupportedVersion(#[from] UnsupportedVersionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a decode error.
    pub fn decode(kind: DecodeErrorKind, detail: impl Into<String>) -> Self {
        Self::Decode(DecodeError::new(kind, detail))
    }

    /// Create a decode error at a file offset.
    pub fn decode_at(kind: DecodeErrorKind, detail: impl Into<String>, offset: u64) -> Self {
        Self::Decode(DecodeError::new(kind, detail).at(offset))
    }

    /// Create an encode error.
    pub fn encode(kind: EncodeErrorKind, detail: impl Into<String>) -> Self {
        Self::Encode(EncodeError::new(kind, detail))
    }

    /// Create a structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::decode(DecodeErrorKind::Structure, msg)
    }

    /// Decode kind, if this is a decode error.
    pub fn decode_kind(&self) -> Option<DecodeErrorKind> {
        match self {
            Self::Decode(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Encode kind, if this is an encode error.
    pub fn encode_kind(&self) -> Option<EncodeErrorKind> {
        match self {
            Self::Encode(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Result type alias for AAF operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::decode_at(DecodeErrorKind::Header, "bad signature", 0);
        let s = e.to_string();
        assert!(s.contains("header"));
        assert!(s.contains("bad signature"));
        assert!(s.contains("0x0"));

        let e = Error::encode(EncodeErrorKind::NameTooLong, "abc");
        assert!(e.to_string().contains("name too long"));

        let e: Error = UnsupportedVersionError { version: "2.0".into() }.into();
        assert!(e.to_string().contains("2.0"));
    }

    #[test]
    fn test_error_kinds() {
        let e = Error::decode(DecodeErrorKind::CyclicOwnership, "loop");
        assert_eq!(e.decode_kind(), Some(DecodeErrorKind::CyclicOwnership));
        assert_eq!(e.encode_kind(), None);
        assert!(DecodeErrorKind::AllocationTable.is_container());
        assert!(!DecodeErrorKind::Structure.is_container());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
