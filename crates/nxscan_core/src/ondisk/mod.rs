//! APFS on-disk structures and the schema-driven decoder.
//!
//! All multi-byte fields are little-endian. Every object starts with an
//! [`ObjectHeader`]; the body variant is selected by the header's object
//! type and checked against the [`Schema`] the caller expects.

mod btree;
mod header;
mod records;
mod superblock;

pub use btree::{
    LeafNode, Node, ObjectMapNode, OmapRecord, PointerNode, BTREE_INFO_SIZE,
    BTREE_NODE_DATA_OFFSET,
};
#[cfg(any(test, feature = "test-utils"))]
pub use header::seal;
pub use header::{fletcher64, verify_checksum, ObjectHeader, ObjectType, OBJECT_HEADER_SIZE};
pub use records::{DirEntryKind, Entry, Record, RecordType};
pub use superblock::{
    probe_block_size, CheckpointRing, ContainerSuperblock, ObjectMapPhys, VolumeSuperblock,
    APFS_MAGIC, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, NX_MAGIC,
};

use crate::error::DecodeError;
use crate::traits::StructureDecoder;
use byteorder::{ByteOrder, LittleEndian};

/// What the caller expects to find in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schema {
    ContainerSuperblock,
    ObjectMap,
    ObjectMapNode,
    VolumeSuperblock,
    FsTreeNode,
}

impl Schema {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ContainerSuperblock => "container superblock",
            Self::ObjectMap => "object map",
            Self::ObjectMapNode => "object map node",
            Self::VolumeSuperblock => "volume superblock",
            Self::FsTreeNode => "file-system tree node",
        }
    }

    fn accepts(&self, header: &ObjectHeader) -> bool {
        let is_node = matches!(
            header.object_type,
            ObjectType::Btree | ObjectType::BtreeNode
        );
        match self {
            Self::ContainerSuperblock => header.object_type == ObjectType::NxSuperblock,
            Self::ObjectMap => header.object_type == ObjectType::Omap,
            Self::ObjectMapNode => is_node && header.subtype_is(ObjectType::Omap),
            Self::VolumeSuperblock => header.object_type == ObjectType::Fs,
            Self::FsTreeNode => is_node && header.subtype_is(ObjectType::FsTree),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBody {
    ContainerSuperblock(ContainerSuperblock),
    ObjectMap(ObjectMapPhys),
    ObjectMapNode(ObjectMapNode),
    VolumeSuperblock(VolumeSuperblock),
    FsTreeNode(Node),
}

/// A decoded object: header plus the body variant its type selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub header: ObjectHeader,
    pub body: ObjectBody,
}

impl Object {
    fn unexpected(&self, expected: Schema) -> DecodeError {
        DecodeError::UnexpectedType {
            expected: expected.name(),
            found: self.header.object_type.raw(),
            subtype: self.header.subtype,
        }
    }

    pub fn into_container_superblock(self) -> Result<ContainerSuperblock, DecodeError> {
        match self.body {
            ObjectBody::ContainerSuperblock(sb) => Ok(sb),
            _ => Err(self.unexpected(Schema::ContainerSuperblock)),
        }
    }

    pub fn into_object_map(self) -> Result<ObjectMapPhys, DecodeError> {
        match self.body {
            ObjectBody::ObjectMap(omap) => Ok(omap),
            _ => Err(self.unexpected(Schema::ObjectMap)),
        }
    }

    pub fn into_object_map_node(self) -> Result<ObjectMapNode, DecodeError> {
        match self.body {
            ObjectBody::ObjectMapNode(node) => Ok(node),
            _ => Err(self.unexpected(Schema::ObjectMapNode)),
        }
    }

    pub fn into_volume_superblock(self) -> Result<VolumeSuperblock, DecodeError> {
        match self.body {
            ObjectBody::VolumeSuperblock(sb) => Ok(sb),
            _ => Err(self.unexpected(Schema::VolumeSuperblock)),
        }
    }

    pub fn into_node(self) -> Result<Node, DecodeError> {
        match self.body {
            ObjectBody::FsTreeNode(node) => Ok(node),
            _ => Err(self.unexpected(Schema::FsTreeNode)),
        }
    }
}

/// Decoder for APFS objects.
#[derive(Debug, Clone, Copy)]
pub struct ApfsDecoder {
    verify_checksums: bool,
}

impl Default for ApfsDecoder {
    fn default() -> Self {
        Self {
            verify_checksums: true,
        }
    }
}

impl ApfsDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips Fletcher-64 verification, for inspecting damaged metadata.
    #[must_use]
    pub fn without_checksums(mut self) -> Self {
        self.verify_checksums = false;
        self
    }
}

impl StructureDecoder for ApfsDecoder {
    fn decode(&self, bytes: &[u8], schema: Schema) -> Result<Object, DecodeError> {
        field(bytes, 0, OBJECT_HEADER_SIZE)?;
        if self.verify_checksums {
            verify_checksum(bytes)?;
        }

        let header = ObjectHeader::parse(bytes)?;
        if !schema.accepts(&header) {
            return Err(DecodeError::UnexpectedType {
                expected: schema.name(),
                found: header.object_type.raw(),
                subtype: header.subtype,
            });
        }

        let xid = header.xid;
        let body = match schema {
            Schema::ContainerSuperblock => {
                ObjectBody::ContainerSuperblock(ContainerSuperblock::parse(bytes, xid)?)
            }
            Schema::ObjectMap => ObjectBody::ObjectMap(ObjectMapPhys::parse(bytes, xid)?),
            Schema::ObjectMapNode => ObjectBody::ObjectMapNode(ObjectMapNode::parse(bytes)?),
            Schema::VolumeSuperblock => {
                ObjectBody::VolumeSuperblock(VolumeSuperblock::parse(bytes, xid)?)
            }
            Schema::FsTreeNode => ObjectBody::FsTreeNode(Node::parse(bytes, || {
                DecodeError::UnexpectedType {
                    expected: "variable-size file-system tree node",
                    found: header.object_type.raw(),
                    subtype: header.subtype,
                }
            })?),
        };

        Ok(Object { header, body })
    }

    fn block_size(&self, bytes: &[u8]) -> Result<u32, DecodeError> {
        probe_block_size(bytes)
    }
}

/// Bounds-checked sub-slice.
pub(crate) fn field(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(DecodeError::Truncated {
            offset,
            len,
            available: bytes.len(),
        })
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, DecodeError> {
    field(bytes, offset, 2).map(LittleEndian::read_u16)
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, DecodeError> {
    field(bytes, offset, 4).map(LittleEndian::read_u32)
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, DecodeError> {
    field(bytes, offset, 8).map(LittleEndian::read_u64)
}

pub(crate) fn read_array<const N: usize>(
    bytes: &[u8],
    offset: usize,
) -> Result<[u8; N], DecodeError> {
    let mut out = [0u8; N];
    out.copy_from_slice(field(bytes, offset, N)?);
    Ok(out)
}

/// UTF-8 (lossy) up to the first NUL.
pub(crate) fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
