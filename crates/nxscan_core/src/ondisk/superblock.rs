//! Container (`nx_superblock`), volume (`apfs_superblock`) and object map
//! (`omap_phys`) bodies.

use super::{read_array, read_u16, read_u32, read_u64, trim_nul_padded};
use crate::error::DecodeError;
use crate::types::{ObjectId, PhysicalAddress, Xid};
use serde::Serialize;

/// "NXSB" read as a little-endian u32.
pub const NX_MAGIC: u32 = 0x4253_584e;
/// "APSB" read as a little-endian u32.
pub const APFS_MAGIC: u32 = 0x4253_5041;

pub const MIN_BLOCK_SIZE: u32 = 4096;
pub const MAX_BLOCK_SIZE: u32 = 65536;

const NX_MAX_FILE_SYSTEMS: usize = 100;
const XP_DESC_NONCONTIGUOUS: u32 = 0x8000_0000;

const APFS_FS_UNENCRYPTED: u64 = 0x1;
const APFS_VOLNAME_LEN: usize = 256;

mod nx {
    pub const MAGIC: usize = 32;
    pub const BLOCK_SIZE: usize = 36;
    pub const BLOCK_COUNT: usize = 40;
    pub const UUID: usize = 72;
    pub const NEXT_XID: usize = 96;
    pub const XP_DESC_BLOCKS: usize = 104;
    pub const XP_DESC_BASE: usize = 112;
    pub const XP_DESC_INDEX: usize = 136;
    pub const OMAP_OID: usize = 160;
    pub const MAX_FILE_SYSTEMS: usize = 180;
    pub const FS_OID: usize = 184;
}

mod apsb {
    pub const MAGIC: usize = 32;
    pub const FS_INDEX: usize = 36;
    pub const OMAP_OID: usize = 128;
    pub const ROOT_TREE_OID: usize = 136;
    pub const NUM_FILES: usize = 184;
    pub const NUM_DIRECTORIES: usize = 192;
    pub const VOL_UUID: usize = 240;
    pub const FS_FLAGS: usize = 264;
    pub const VOLNAME: usize = 704;
    pub const ROLE: usize = 964;
}

mod omap {
    pub const FLAGS: usize = 32;
    pub const SNAP_COUNT: usize = 36;
    pub const TREE_TYPE: usize = 40;
    pub const TREE_OID: usize = 48;
}

/// Geometry of the checkpoint descriptor ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckpointRing {
    pub base: PhysicalAddress,
    pub index: u32,
    /// Capacity of the ring in blocks.
    pub length: u32,
    pub contiguous: bool,
}

impl CheckpointRing {
    /// Address of the slot after the current one, wrapped to the ring's
    /// capacity. `None` when the ring is empty, not laid out contiguously, or
    /// the slot lies past the end of the address space.
    #[must_use]
    pub fn previous_superblock(&self) -> Option<PhysicalAddress> {
        if self.length == 0 || !self.contiguous {
            return None;
        }
        let slot = (u64::from(self.index) + 1) % u64::from(self.length);
        self.base.get().checked_add(slot).map(PhysicalAddress)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSuperblock {
    pub xid: Xid,
    pub block_size: u32,
    pub block_count: u64,
    pub uuid: [u8; 16],
    pub next_xid: Xid,
    pub omap_oid: PhysicalAddress,
    pub volume_oids: Vec<ObjectId>,
    pub ring: CheckpointRing,
}

impl ContainerSuperblock {
    pub(super) fn parse(block: &[u8], xid: Xid) -> Result<Self, DecodeError> {
        let block_size = probe_block_size(block)?;

        let max_fs = (read_u32(block, nx::MAX_FILE_SYSTEMS)? as usize).min(NX_MAX_FILE_SYSTEMS);
        let mut volume_oids = Vec::new();
        for slot in 0..max_fs {
            let oid = read_u64(block, nx::FS_OID + slot * 8)?;
            if oid != 0 {
                volume_oids.push(ObjectId(oid));
            }
        }

        let desc_blocks = read_u32(block, nx::XP_DESC_BLOCKS)?;
        let ring = CheckpointRing {
            base: PhysicalAddress(read_u64(block, nx::XP_DESC_BASE)?),
            index: read_u32(block, nx::XP_DESC_INDEX)?,
            length: desc_blocks & !XP_DESC_NONCONTIGUOUS,
            contiguous: desc_blocks & XP_DESC_NONCONTIGUOUS == 0,
        };

        Ok(Self {
            xid,
            block_size,
            block_count: read_u64(block, nx::BLOCK_COUNT)?,
            uuid: read_array(block, nx::UUID)?,
            next_xid: Xid(read_u64(block, nx::NEXT_XID)?),
            omap_oid: PhysicalAddress(read_u64(block, nx::OMAP_OID)?),
            volume_oids,
            ring,
        })
    }
}

/// Validates the container magic and returns its block size.
pub fn probe_block_size(block: &[u8]) -> Result<u32, DecodeError> {
    let magic = read_u32(block, nx::MAGIC)?;
    if magic != NX_MAGIC {
        return Err(DecodeError::BadMagic {
            expected: NX_MAGIC,
            found: magic,
        });
    }
    let block_size = read_u32(block, nx::BLOCK_SIZE)?;
    if !block_size.is_power_of_two() || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        return Err(DecodeError::InvalidBlockSize(block_size));
    }
    Ok(block_size)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeSuperblock {
    pub xid: Xid,
    pub fs_index: u32,
    pub name: String,
    pub uuid: [u8; 16],
    pub role: u16,
    pub fs_flags: u64,
    pub omap_oid: PhysicalAddress,
    pub root_tree_oid: ObjectId,
    pub num_files: u64,
    pub num_directories: u64,
}

impl VolumeSuperblock {
    pub(super) fn parse(block: &[u8], xid: Xid) -> Result<Self, DecodeError> {
        let magic = read_u32(block, apsb::MAGIC)?;
        if magic != APFS_MAGIC {
            return Err(DecodeError::BadMagic {
                expected: APFS_MAGIC,
                found: magic,
            });
        }
        let name: [u8; APFS_VOLNAME_LEN] = read_array(block, apsb::VOLNAME)?;

        Ok(Self {
            xid,
            fs_index: read_u32(block, apsb::FS_INDEX)?,
            name: trim_nul_padded(&name),
            uuid: read_array(block, apsb::VOL_UUID)?,
            role: read_u16(block, apsb::ROLE)?,
            fs_flags: read_u64(block, apsb::FS_FLAGS)?,
            omap_oid: PhysicalAddress(read_u64(block, apsb::OMAP_OID)?),
            root_tree_oid: ObjectId(read_u64(block, apsb::ROOT_TREE_OID)?),
            num_files: read_u64(block, apsb::NUM_FILES)?,
            num_directories: read_u64(block, apsb::NUM_DIRECTORIES)?,
        })
    }

    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.fs_flags & APFS_FS_UNENCRYPTED == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMapPhys {
    pub xid: Xid,
    pub flags: u32,
    pub snapshot_count: u32,
    pub tree_type: u32,
    /// Physical address of the root node of the mapping B-tree.
    pub tree_oid: PhysicalAddress,
}

impl ObjectMapPhys {
    pub(super) fn parse(block: &[u8], xid: Xid) -> Result<Self, DecodeError> {
        Ok(Self {
            xid,
            flags: read_u32(block, omap::FLAGS)?,
            snapshot_count: read_u32(block, omap::SNAP_COUNT)?,
            tree_type: read_u32(block, omap::TREE_TYPE)?,
            tree_oid: PhysicalAddress(read_u64(block, omap::TREE_OID)?),
        })
    }
}
