//! File-system tree records (`j_key` / value pairs) found in leaf nodes.

use super::{field, read_u16, read_u32, read_u64, trim_nul_padded};
use crate::error::DecodeError;
use crate::types::ObjectId;
use serde::Serialize;

const OBJ_ID_MASK: u64 = 0x0fff_ffff_ffff_ffff;
const OBJ_TYPE_SHIFT: u32 = 60;

const J_KEY_SIZE: usize = 8;
const DREC_LEN_MASK: u32 = 0x0000_03ff;
const DREC_TYPE_MASK: u16 = 0x000f;
const INODE_VAL_MIN_SIZE: usize = 92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    SnapMetadata,
    Extent,
    Inode,
    Xattr,
    SiblingLink,
    DstreamId,
    CryptoState,
    FileExtent,
    DirRecord,
    DirStats,
    SnapName,
    SiblingMap,
    FileInfo,
    Unknown(u8),
}

impl RecordType {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::SnapMetadata,
            2 => Self::Extent,
            3 => Self::Inode,
            4 => Self::Xattr,
            5 => Self::SiblingLink,
            6 => Self::DstreamId,
            7 => Self::CryptoState,
            8 => Self::FileExtent,
            9 => Self::DirRecord,
            10 => Self::DirStats,
            11 => Self::SnapName,
            12 => Self::SiblingMap,
            13 => Self::FileInfo,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        match self {
            Self::SnapMetadata => 1,
            Self::Extent => 2,
            Self::Inode => 3,
            Self::Xattr => 4,
            Self::SiblingLink => 5,
            Self::DstreamId => 6,
            Self::CryptoState => 7,
            Self::FileExtent => 8,
            Self::DirRecord => 9,
            Self::DirStats => 10,
            Self::SnapName => 11,
            Self::SiblingMap => 12,
            Self::FileInfo => 13,
            Self::Unknown(raw) => raw,
        }
    }
}

/// File type nibble of a directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirEntryKind {
    Fifo,
    CharDevice,
    Directory,
    BlockDevice,
    Regular,
    Symlink,
    Socket,
    Whiteout,
    Unknown(u16),
}

impl DirEntryKind {
    #[must_use]
    pub const fn from_flags(flags: u16) -> Self {
        match flags & DREC_TYPE_MASK {
            1 => Self::Fifo,
            2 => Self::CharDevice,
            4 => Self::Directory,
            6 => Self::BlockDevice,
            8 => Self::Regular,
            10 => Self::Symlink,
            12 => Self::Socket,
            14 => Self::Whiteout,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::CharDevice => "char",
            Self::Directory => "dir",
            Self::BlockDevice => "block",
            Self::Regular => "file",
            Self::Symlink => "symlink",
            Self::Socket => "socket",
            Self::Whiteout => "whiteout",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Decoded value of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    DirRecord {
        file_id: ObjectId,
        date_added: u64,
        file_kind: DirEntryKind,
        flags: u16,
    },
    Inode {
        parent_id: ObjectId,
        private_id: ObjectId,
        create_time: u64,
        mod_time: u64,
        owner: u32,
        group: u32,
        mode: u16,
    },
    /// Value bytes of every record type that is carried through undecoded.
    Raw { value: Vec<u8> },
}

/// One leaf record of a file-system tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Object the record belongs to (for a directory record, the parent directory).
    pub object_id: ObjectId,
    pub record_type: RecordType,
    pub name: Option<String>,
    pub record: Record,
}

impl Entry {
    /// Object a directory record points at.
    #[must_use]
    pub fn referenced_id(&self) -> Option<ObjectId> {
        match self.record {
            Record::DirRecord { file_id, .. } => Some(file_id),
            _ => None,
        }
    }

    pub fn parse(key: &[u8], value: &[u8]) -> Result<Self, DecodeError> {
        let header = read_u64(key, 0)?;
        let object_id = ObjectId(header & OBJ_ID_MASK);
        let record_type = RecordType::from_raw((header >> OBJ_TYPE_SHIFT) as u8);

        let (name, record) = match record_type {
            RecordType::DirRecord => (Some(dir_record_name(key)?), dir_record(value)?),
            RecordType::Inode if value.len() >= INODE_VAL_MIN_SIZE => (None, inode(value)?),
            RecordType::Xattr | RecordType::SnapName => (
                Some(short_name(key)?),
                Record::Raw {
                    value: value.to_vec(),
                },
            ),
            _ => (
                None,
                Record::Raw {
                    value: value.to_vec(),
                },
            ),
        };

        Ok(Self {
            object_id,
            record_type,
            name,
            record,
        })
    }
}

/// Directory record keys come hashed (`j_drec_hashed_key`, 10-bit length
/// plus 22-bit hash) or plain (`j_drec_key`, 16-bit length). The layout is
/// recognised by which length field accounts for the key size exactly.
fn dir_record_name(key: &[u8]) -> Result<String, DecodeError> {
    if key.len() >= J_KEY_SIZE + 4 {
        let len = (read_u32(key, J_KEY_SIZE)? & DREC_LEN_MASK) as usize;
        if J_KEY_SIZE + 4 + len == key.len() {
            return Ok(trim_nul_padded(field(key, J_KEY_SIZE + 4, len)?));
        }
    }
    short_name(key)
}

/// Keys carrying a 16-bit name length right after the `j_key` header.
fn short_name(key: &[u8]) -> Result<String, DecodeError> {
    let len = read_u16(key, J_KEY_SIZE)? as usize;
    Ok(trim_nul_padded(field(key, J_KEY_SIZE + 2, len)?))
}

fn dir_record(value: &[u8]) -> Result<Record, DecodeError> {
    let flags = read_u16(value, 16)?;
    Ok(Record::DirRecord {
        file_id: ObjectId(read_u64(value, 0)?),
        date_added: read_u64(value, 8)?,
        file_kind: DirEntryKind::from_flags(flags),
        flags,
    })
}

fn inode(value: &[u8]) -> Result<Record, DecodeError> {
    Ok(Record::Inode {
        parent_id: ObjectId(read_u64(value, 0)?),
        private_id: ObjectId(read_u64(value, 8)?),
        create_time: read_u64(value, 16)?,
        mod_time: read_u64(value, 24)?,
        owner: read_u32(value, 72)?,
        group: read_u32(value, 76)?,
        mode: read_u16(value, 80)?,
    })
}
