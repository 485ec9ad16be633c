//! B-tree nodes (`btree_node_phys`).
//!
//! Object maps use fixed-size keys and values (`kvoff` table of contents);
//! file-system trees use variable-size ones (`kvloc`). Both share the same
//! node layout: header, table of contents, key area growing up, value area
//! growing down from the end of the block (minus the `btree_info` trailer
//! on root nodes).

use super::records::Entry;
use super::{field, read_u16, read_u32, read_u64};
use crate::error::DecodeError;
use crate::types::{ObjectId, PhysicalAddress, Xid};
use serde::Serialize;

const BTNODE_ROOT: u16 = 0x0001;
const BTNODE_LEAF: u16 = 0x0002;
const BTNODE_FIXED_KV_SIZE: u16 = 0x0004;

pub const BTREE_NODE_DATA_OFFSET: usize = 56;
pub const BTREE_INFO_SIZE: usize = 40;

const KVOFF_SIZE: usize = 4;
const KVLOC_SIZE: usize = 8;

const OMAP_KEY_SIZE: usize = 16;
const OMAP_VAL_SIZE: usize = 16;
const CHILD_OID_SIZE: usize = 8;

/// Directory-tree node as a closed tagged union.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Pointer(PointerNode),
    Leaf(LeafNode),
}

/// Index node: only child object ids, no records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointerNode {
    pub level: u16,
    pub children: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafNode {
    pub entries: Vec<Entry>,
}

/// One mapping of an object map leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OmapRecord {
    pub oid: ObjectId,
    pub xid: Xid,
    pub flags: u32,
    pub size: u32,
    pub paddr: PhysicalAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ObjectMapNode {
    /// Non-leaf node; children are physical nodes of the same tree.
    Index {
        level: u16,
        children: Vec<PhysicalAddress>,
    },
    Leaf(Vec<OmapRecord>),
}

/// Locations resolved from a node header.
struct NodeLayout<'a> {
    block: &'a [u8],
    flags: u16,
    level: u16,
    nkeys: usize,
    toc_start: usize,
    toc_len: usize,
    key_start: usize,
    val_end: usize,
}

impl<'a> NodeLayout<'a> {
    fn parse(block: &'a [u8]) -> Result<Self, DecodeError> {
        let flags = read_u16(block, 32)?;
        let level = read_u16(block, 34)?;
        let nkeys = read_u32(block, 36)? as usize;
        let toc_off = read_u16(block, 40)? as usize;
        let toc_len = read_u16(block, 42)? as usize;

        let toc_start = BTREE_NODE_DATA_OFFSET + toc_off;
        let key_start = toc_start + toc_len;
        let trailer = if flags & BTNODE_ROOT != 0 {
            BTREE_INFO_SIZE
        } else {
            0
        };
        let val_end = block
            .len()
            .checked_sub(trailer)
            .filter(|end| *end >= key_start)
            .ok_or(DecodeError::Truncated {
                offset: key_start,
                len: trailer,
                available: block.len(),
            })?;

        let layout = Self {
            block,
            flags,
            level,
            nkeys,
            toc_start,
            toc_len,
            key_start,
            val_end,
        };
        let entry_size = if layout.fixed() { KVOFF_SIZE } else { KVLOC_SIZE };
        if nkeys.saturating_mul(entry_size) > toc_len {
            return Err(DecodeError::Truncated {
                offset: toc_start,
                len: nkeys.saturating_mul(entry_size),
                available: toc_len,
            });
        }
        Ok(layout)
    }

    fn is_leaf(&self) -> bool {
        self.flags & BTNODE_LEAF != 0
    }

    fn fixed(&self) -> bool {
        self.flags & BTNODE_FIXED_KV_SIZE != 0
    }

    fn value(&self, v_off: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        let start = self
            .val_end
            .checked_sub(v_off)
            .ok_or(DecodeError::Truncated {
                offset: self.val_end,
                len: v_off,
                available: self.val_end,
            })?;
        field(self.block, start, len)
    }

    /// Key and value of entry `index` in a fixed-size node.
    fn fixed_kv(
        &self,
        index: usize,
        key_len: usize,
        val_len: usize,
    ) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
        let toc = self.toc_start + index * KVOFF_SIZE;
        let k_off = read_u16(self.block, toc)? as usize;
        let v_off = read_u16(self.block, toc + 2)? as usize;
        let key = field(self.block, self.key_start + k_off, key_len)?;
        Ok((key, self.value(v_off, val_len)?))
    }

    /// Key and value of entry `index` in a variable-size node.
    fn variable_kv(&self, index: usize) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
        let toc = self.toc_start + index * KVLOC_SIZE;
        let k_off = read_u16(self.block, toc)? as usize;
        let k_len = read_u16(self.block, toc + 2)? as usize;
        let v_off = read_u16(self.block, toc + 4)? as usize;
        let v_len = read_u16(self.block, toc + 6)? as usize;
        let key = field(self.block, self.key_start + k_off, k_len)?;
        Ok((key, self.value(v_off, v_len)?))
    }

    fn kv(
        &self,
        index: usize,
        key_len: usize,
        val_len: usize,
    ) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
        if self.fixed() {
            self.fixed_kv(index, key_len, val_len)
        } else {
            self.variable_kv(index)
        }
    }
}

impl ObjectMapNode {
    pub(super) fn parse(block: &[u8]) -> Result<Self, DecodeError> {
        let layout = NodeLayout::parse(block)?;

        if layout.is_leaf() {
            let mut records = Vec::with_capacity(layout.nkeys);
            for index in 0..layout.nkeys {
                let (key, value) = layout.kv(index, OMAP_KEY_SIZE, OMAP_VAL_SIZE)?;
                records.push(OmapRecord {
                    oid: ObjectId(read_u64(key, 0)?),
                    xid: Xid(read_u64(key, 8)?),
                    flags: read_u32(value, 0)?,
                    size: read_u32(value, 4)?,
                    paddr: PhysicalAddress(read_u64(value, 8)?),
                });
            }
            return Ok(Self::Leaf(records));
        }

        let mut children = Vec::with_capacity(layout.nkeys);
        for index in 0..layout.nkeys {
            let (_, value) = layout.kv(index, OMAP_KEY_SIZE, CHILD_OID_SIZE)?;
            children.push(PhysicalAddress(read_u64(value, 0)?));
        }
        Ok(Self::Index {
            level: layout.level,
            children,
        })
    }
}

impl Node {
    /// Decodes a file-system tree node. `unexpected` builds the error
    /// returned when the node uses fixed-size entries.
    pub(super) fn parse(
        block: &[u8],
        unexpected: impl FnOnce() -> DecodeError,
    ) -> Result<Self, DecodeError> {
        let layout = NodeLayout::parse(block)?;
        if layout.fixed() {
            return Err(unexpected());
        }

        if layout.is_leaf() {
            let mut entries = Vec::with_capacity(layout.nkeys);
            for index in 0..layout.nkeys {
                let (key, value) = layout.variable_kv(index)?;
                entries.push(Entry::parse(key, value)?);
            }
            return Ok(Self::Leaf(LeafNode { entries }));
        }

        let mut children = Vec::with_capacity(layout.nkeys);
        for index in 0..layout.nkeys {
            let (_, value) = layout.variable_kv(index)?;
            children.push(ObjectId(read_u64(value, 0)?));
        }
        Ok(Self::Pointer(PointerNode {
            level: layout.level,
            children,
        }))
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}
