use crate::types::{ObjectId, PhysicalAddress, Xid};
use serde::Serialize;
use thiserror::Error;

/// Malformed on-disk structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic { expected: u32, found: u32 },

    #[error("checksum mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    ChecksumMismatch { stored: u64, computed: u64 },

    #[error("unknown object type {object_type:#x} (subtype {subtype:#x})")]
    UnknownType { object_type: u32, subtype: u32 },

    #[error("expected {expected}, found object type {found:#x} (subtype {subtype:#x})")]
    UnexpectedType {
        expected: &'static str,
        found: u32,
        subtype: u32,
    },

    #[error("truncated structure: {len} bytes at offset {offset}, only {available} available")]
    Truncated {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("invalid block size {0}")]
    InvalidBlockSize(u32),
}

/// Versioned object-map lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("object {oid} has no object map entry (requested at xid {xid})")]
    NotFound { oid: ObjectId, xid: Xid },

    #[error("object {oid} has no version at or before xid {xid} (oldest is {oldest})")]
    NoVersionAtOrBefore { oid: ObjectId, xid: Xid, oldest: Xid },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Offset {offset} is out of bounds (max: {max})")]
    OutOfBounds { offset: u64, max: u64 },

    #[error("Short read at block {address}: expected {expected} bytes, got {actual}")]
    ShortRead {
        address: PhysicalAddress,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),
}

/// Coarse classification used when reporting where a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Io,
    Decode,
    Resolution,
}

impl CoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io(_) | Self::OutOfBounds { .. } | Self::ShortRead { .. } => ErrorCategory::Io,
            Self::InvalidFormat(_) | Self::Decode(_) => ErrorCategory::Decode,
            Self::Resolution(_) => ErrorCategory::Resolution,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Io => "io",
            Self::Decode => "decode",
            Self::Resolution => "resolution",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_classification() {
        let io = CoreError::OutOfBounds { offset: 10, max: 5 };
        assert_eq!(io.category(), ErrorCategory::Io);

        let decode = CoreError::from(DecodeError::InvalidBlockSize(3));
        assert_eq!(decode.category(), ErrorCategory::Decode);

        let resolution = CoreError::from(ResolutionError::NotFound {
            oid: ObjectId(1026),
            xid: Xid(4),
        });
        assert_eq!(resolution.category(), ErrorCategory::Resolution);
    }

    #[test]
    fn test_resolution_messages_are_distinct() {
        let missing = ResolutionError::NotFound {
            oid: ObjectId(7),
            xid: Xid(2),
        };
        let too_new = ResolutionError::NoVersionAtOrBefore {
            oid: ObjectId(7),
            xid: Xid(2),
            oldest: Xid(5),
        };
        assert_ne!(missing.to_string(), too_new.to_string());
        assert!(too_new.to_string().contains("oldest is 5"));
    }
}
