//! Object header (`obj_phys`) shared by every APFS on-disk object.

use super::{read_u32, read_u64};
use crate::error::DecodeError;
use crate::types::{ObjectId, Xid};
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

pub const OBJECT_HEADER_SIZE: usize = 32;

const OBJECT_TYPE_MASK: u32 = 0x0000_ffff;
const OBJECT_TYPE_FLAGS_MASK: u32 = 0xffff_0000;

const FLETCHER_MODULUS: u64 = 0xffff_ffff;

/// Object types this decoder recognises. Anything else is rejected with
/// [`DecodeError::UnknownType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    NxSuperblock,
    Btree,
    BtreeNode,
    Spaceman,
    SpacemanCab,
    SpacemanCib,
    SpacemanBitmap,
    SpacemanFreeQueue,
    ExtentListTree,
    Omap,
    CheckpointMap,
    Fs,
    FsTree,
    BlockRefTree,
    SnapMetaTree,
    NxReaper,
    NxReapList,
    OmapSnapshot,
    EfiJumpstart,
    FusionMiddleTree,
    NxFusionWbc,
    NxFusionWbcList,
    ErState,
    Gbitmap,
    GbitmapTree,
    GbitmapBlock,
    ErRecoveryBlock,
    SnapMetaExt,
    IntegrityMeta,
    FextTree,
}

impl ObjectType {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        let ty = match raw {
            0x01 => Self::NxSuperblock,
            0x02 => Self::Btree,
            0x03 => Self::BtreeNode,
            0x05 => Self::Spaceman,
            0x06 => Self::SpacemanCab,
            0x07 => Self::SpacemanCib,
            0x08 => Self::SpacemanBitmap,
            0x09 => Self::SpacemanFreeQueue,
            0x0a => Self::ExtentListTree,
            0x0b => Self::Omap,
            0x0c => Self::CheckpointMap,
            0x0d => Self::Fs,
            0x0e => Self::FsTree,
            0x0f => Self::BlockRefTree,
            0x10 => Self::SnapMetaTree,
            0x11 => Self::NxReaper,
            0x12 => Self::NxReapList,
            0x13 => Self::OmapSnapshot,
            0x14 => Self::EfiJumpstart,
            0x15 => Self::FusionMiddleTree,
            0x16 => Self::NxFusionWbc,
            0x17 => Self::NxFusionWbcList,
            0x18 => Self::ErState,
            0x19 => Self::Gbitmap,
            0x1a => Self::GbitmapTree,
            0x1b => Self::GbitmapBlock,
            0x1c => Self::ErRecoveryBlock,
            0x1d => Self::SnapMetaExt,
            0x1e => Self::IntegrityMeta,
            0x1f => Self::FextTree,
            _ => return None,
        };
        Some(ty)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::NxSuperblock => 0x01,
            Self::Btree => 0x02,
            Self::BtreeNode => 0x03,
            Self::Spaceman => 0x05,
            Self::SpacemanCab => 0x06,
            Self::SpacemanCib => 0x07,
            Self::SpacemanBitmap => 0x08,
            Self::SpacemanFreeQueue => 0x09,
            Self::ExtentListTree => 0x0a,
            Self::Omap => 0x0b,
            Self::CheckpointMap => 0x0c,
            Self::Fs => 0x0d,
            Self::FsTree => 0x0e,
            Self::BlockRefTree => 0x0f,
            Self::SnapMetaTree => 0x10,
            Self::NxReaper => 0x11,
            Self::NxReapList => 0x12,
            Self::OmapSnapshot => 0x13,
            Self::EfiJumpstart => 0x14,
            Self::FusionMiddleTree => 0x15,
            Self::NxFusionWbc => 0x16,
            Self::NxFusionWbcList => 0x17,
            Self::ErState => 0x18,
            Self::Gbitmap => 0x19,
            Self::GbitmapTree => 0x1a,
            Self::GbitmapBlock => 0x1b,
            Self::ErRecoveryBlock => 0x1c,
            Self::SnapMetaExt => 0x1d,
            Self::IntegrityMeta => 0x1e,
            Self::FextTree => 0x1f,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectHeader {
    pub checksum: u64,
    pub oid: ObjectId,
    pub xid: Xid,
    pub object_type: ObjectType,
    /// Storage flags (virtual, ephemeral, physical, ...), the high half of `o_type`.
    pub type_flags: u32,
    pub subtype: u32,
}

impl ObjectHeader {
    pub fn parse(block: &[u8]) -> Result<Self, DecodeError> {
        let raw_type = read_u32(block, 24)?;
        let subtype = read_u32(block, 28)?;
        let object_type =
            ObjectType::from_raw(raw_type & OBJECT_TYPE_MASK).ok_or(DecodeError::UnknownType {
                object_type: raw_type & OBJECT_TYPE_MASK,
                subtype,
            })?;

        Ok(Self {
            checksum: read_u64(block, 0)?,
            oid: ObjectId(read_u64(block, 8)?),
            xid: Xid(read_u64(block, 16)?),
            object_type,
            type_flags: raw_type & OBJECT_TYPE_FLAGS_MASK,
            subtype,
        })
    }

    #[must_use]
    pub fn subtype_is(&self, ty: ObjectType) -> bool {
        self.subtype & OBJECT_TYPE_MASK == ty.raw()
    }
}

/// Fletcher-64 over `data` taken as little-endian 32-bit words.
///
/// `data` is the object without its leading checksum field; trailing bytes
/// that do not fill a whole word are ignored.
#[must_use]
pub fn fletcher64(data: &[u8]) -> u64 {
    let mut sum1: u64 = 0;
    let mut sum2: u64 = 0;
    for word in data.chunks_exact(4) {
        sum1 = (sum1 + u64::from(LittleEndian::read_u32(word))) % FLETCHER_MODULUS;
        sum2 = (sum2 + sum1) % FLETCHER_MODULUS;
    }
    let check1 = FLETCHER_MODULUS - ((sum1 + sum2) % FLETCHER_MODULUS);
    let check2 = FLETCHER_MODULUS - ((sum1 + check1) % FLETCHER_MODULUS);
    (check2 << 32) | check1
}

/// Compares the stored checksum with the one computed over the block.
pub fn verify_checksum(block: &[u8]) -> Result<(), DecodeError> {
    let stored = read_u64(block, 0)?;
    let computed = fletcher64(&block[8..]);
    if stored != computed {
        return Err(DecodeError::ChecksumMismatch { stored, computed });
    }
    Ok(())
}

/// Writes the checksum of `block` into its first eight bytes.
#[cfg(any(test, feature = "test-utils"))]
pub fn seal(block: &mut [u8]) {
    let checksum = fletcher64(&block[8..]);
    LittleEndian::write_u64(&mut block[..8], checksum);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_block(raw_type: u32, subtype: u32) -> Vec<u8> {
        let mut block = vec![0u8; 64];
        LittleEndian::write_u64(&mut block[8..16], 1026);
        LittleEndian::write_u64(&mut block[16..24], 9);
        LittleEndian::write_u32(&mut block[24..28], raw_type);
        LittleEndian::write_u32(&mut block[28..32], subtype);
        seal(&mut block);
        block
    }

    #[test]
    fn test_fletcher_of_zero_words_is_nonzero() {
        assert_ne!(fletcher64(&[0u8; 4088]), 0);
    }

    #[test]
    fn test_seal_then_verify() {
        let block = header_block(0x8000_000d, 0);
        assert!(verify_checksum(&block).is_ok());
    }

    #[test]
    fn test_verify_detects_flipped_byte() {
        let mut block = header_block(0x0d, 0);
        block[40] ^= 0xff;
        assert!(matches!(
            verify_checksum(&block),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_parse_splits_type_flags() {
        let block = header_block(0x4000_0002, 0x0b);
        let header = ObjectHeader::parse(&block).unwrap();
        assert_eq!(header.object_type, ObjectType::Btree);
        assert_eq!(header.type_flags, 0x4000_0000);
        assert!(header.subtype_is(ObjectType::Omap));
        assert_eq!(header.oid, ObjectId(1026));
        assert_eq!(header.xid, Xid(9));
    }

    #[test]
    fn test_parse_unknown_type() {
        let block = header_block(0x77, 0);
        assert_eq!(
            ObjectHeader::parse(&block),
            Err(DecodeError::UnknownType {
                object_type: 0x77,
                subtype: 0
            })
        );
    }

    #[test]
    fn test_raw_round_trips_for_every_known_type() {
        for raw in 0..0x40 {
            if let Some(ty) = ObjectType::from_raw(raw) {
                assert_eq!(ty.raw(), raw);
            }
        }
    }
}
