//! Synthetic APFS images for tests.
//!
//! Blocks are laid out by hand at caller-chosen addresses and sealed with a
//! valid Fletcher-64 checksum, so they go through the real decoder.

use crate::ondisk::{seal, RecordType, BTREE_INFO_SIZE, BTREE_NODE_DATA_OFFSET};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;

pub const TEST_BLOCK_SIZE: u32 = 4096;

const OBJ_PHYSICAL: u32 = 0x4000_0000;
const OBJ_EPHEMERAL: u32 = 0x8000_0000;
const TYPE_NX_SUPERBLOCK: u32 = 0x01;
const TYPE_BTREE: u32 = 0x02;
const TYPE_BTREE_NODE: u32 = 0x03;
const TYPE_OMAP: u32 = 0x0b;
const TYPE_FS: u32 = 0x0d;
const TYPE_FSTREE: u32 = 0x0e;

const BTNODE_ROOT: u16 = 0x1;
const BTNODE_LEAF: u16 = 0x2;
const BTNODE_FIXED_KV_SIZE: u16 = 0x4;

#[derive(Debug, Clone)]
pub struct ContainerParams {
    pub xid: u64,
    pub omap: u64,
    pub volumes: Vec<u64>,
    pub ring_base: u64,
    pub ring_index: u32,
    pub ring_length: u32,
}

#[derive(Debug, Clone)]
pub struct VolumeParams {
    pub oid: u64,
    pub xid: u64,
    pub name: String,
    pub omap: u64,
    pub root_tree: u64,
    pub encrypted: bool,
}

/// Key and value bytes of one file-system tree record.
#[derive(Debug, Clone)]
pub struct FsRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

fn j_key(oid: u64, ty: RecordType) -> Vec<u8> {
    ((u64::from(ty.raw()) << 60) | oid).to_le_bytes().to_vec()
}

impl FsRecord {
    fn dir_record(parent: u64, name: &str, file_id: u64, flags: u16) -> Self {
        let mut key = j_key(parent, RecordType::DirRecord);
        let len = name.len() as u32 + 1;
        key.extend_from_slice(&((0x2a5 << 10) | len).to_le_bytes());
        key.extend_from_slice(name.as_bytes());
        key.push(0);

        let mut value = Vec::with_capacity(18);
        value.extend_from_slice(&file_id.to_le_bytes());
        value.extend_from_slice(&1_600_000_000_000_000_000u64.to_le_bytes());
        value.extend_from_slice(&flags.to_le_bytes());
        Self { key, value }
    }

    /// Directory record for a regular file.
    pub fn file(parent: u64, name: &str, file_id: u64) -> Self {
        Self::dir_record(parent, name, file_id, 8)
    }

    /// Directory record for a subdirectory.
    pub fn directory(parent: u64, name: &str, file_id: u64) -> Self {
        Self::dir_record(parent, name, file_id, 4)
    }

    pub fn inode(oid: u64, parent: u64, mode: u16) -> Self {
        let mut value = vec![0u8; 92];
        LittleEndian::write_u64(&mut value[0..8], parent);
        LittleEndian::write_u64(&mut value[8..16], oid);
        LittleEndian::write_u16(&mut value[80..82], mode);
        Self {
            key: j_key(oid, RecordType::Inode),
            value,
        }
    }

    pub fn raw(oid: u64, ty: RecordType, value: &[u8]) -> Self {
        Self {
            key: j_key(oid, ty),
            value: value.to_vec(),
        }
    }
}

pub struct ImageBuilder {
    block_size: u32,
    blocks: BTreeMap<u64, Vec<u8>>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new(TEST_BLOCK_SIZE)
    }
}

impl ImageBuilder {
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            blocks: BTreeMap::new(),
        }
    }

    fn object(&self, oid: u64, xid: u64, raw_type: u32, subtype: u32) -> Vec<u8> {
        let mut block = vec![0u8; self.block_size as usize];
        LittleEndian::write_u64(&mut block[8..16], oid);
        LittleEndian::write_u64(&mut block[16..24], xid);
        LittleEndian::write_u32(&mut block[24..28], raw_type);
        LittleEndian::write_u32(&mut block[28..32], subtype);
        block
    }

    fn put(&mut self, addr: u64, mut block: Vec<u8>) -> &mut Self {
        seal(&mut block);
        self.blocks.insert(addr, block);
        self
    }

    pub fn container(&mut self, addr: u64, params: &ContainerParams) -> &mut Self {
        let mut b = self.object(1, params.xid, OBJ_EPHEMERAL | TYPE_NX_SUPERBLOCK, 0);
        b[32..36].copy_from_slice(b"NXSB");
        LittleEndian::write_u32(&mut b[36..40], self.block_size);
        LittleEndian::write_u64(&mut b[40..48], 1 << 20);
        b[72..88].copy_from_slice(&[0xa5; 16]);
        LittleEndian::write_u64(&mut b[96..104], params.xid + 1);
        LittleEndian::write_u32(&mut b[104..108], params.ring_length);
        LittleEndian::write_u64(&mut b[112..120], params.ring_base);
        LittleEndian::write_u32(&mut b[136..140], params.ring_index);
        LittleEndian::write_u32(&mut b[140..144], 1);
        LittleEndian::write_u64(&mut b[160..168], params.omap);
        LittleEndian::write_u32(&mut b[180..184], 100);
        for (slot, oid) in params.volumes.iter().enumerate() {
            let at = 184 + slot * 8;
            LittleEndian::write_u64(&mut b[at..at + 8], *oid);
        }
        self.put(addr, b)
    }

    pub fn volume(&mut self, addr: u64, params: &VolumeParams) -> &mut Self {
        let mut b = self.object(params.oid, params.xid, TYPE_FS, 0);
        b[32..36].copy_from_slice(b"APSB");
        LittleEndian::write_u64(&mut b[128..136], params.omap);
        LittleEndian::write_u64(&mut b[136..144], params.root_tree);
        LittleEndian::write_u64(&mut b[184..192], 2);
        LittleEndian::write_u64(&mut b[192..200], 1);
        b[240..256].copy_from_slice(&[0x5a; 16]);
        LittleEndian::write_u64(&mut b[264..272], u64::from(!params.encrypted));
        let name = params.name.as_bytes();
        b[704..704 + name.len()].copy_from_slice(name);
        self.put(addr, b)
    }

    /// Object map header whose mapping tree root lives at `tree`.
    pub fn object_map(&mut self, addr: u64, xid: u64, tree: u64) -> &mut Self {
        let mut b = self.object(addr, xid, OBJ_PHYSICAL | TYPE_OMAP, 0);
        LittleEndian::write_u32(&mut b[40..44], OBJ_PHYSICAL | TYPE_BTREE);
        LittleEndian::write_u64(&mut b[48..56], tree);
        self.put(addr, b)
    }

    /// Object map leaf node holding `(oid, xid, paddr)` mappings.
    pub fn omap_leaf(
        &mut self,
        addr: u64,
        xid: u64,
        root: bool,
        records: &[(u64, u64, u64)],
    ) -> &mut Self {
        let kvs: Vec<_> = records
            .iter()
            .map(|(oid, rec_xid, paddr)| {
                let mut key = oid.to_le_bytes().to_vec();
                key.extend_from_slice(&rec_xid.to_le_bytes());
                let mut value = vec![0u8; 8];
                LittleEndian::write_u32(&mut value[4..8], self.block_size);
                value.extend_from_slice(&paddr.to_le_bytes());
                (key, value)
            })
            .collect();
        let b = self.node(addr, xid, OBJ_PHYSICAL, TYPE_OMAP, root, 0, true, &kvs);
        self.put(addr, b)
    }

    /// Object map index node; each child is keyed by its first `(oid, xid)`.
    pub fn omap_index(
        &mut self,
        addr: u64,
        xid: u64,
        root: bool,
        level: u16,
        children: &[(u64, u64, u64)],
    ) -> &mut Self {
        let kvs: Vec<_> = children
            .iter()
            .map(|(oid, key_xid, child)| {
                let mut key = oid.to_le_bytes().to_vec();
                key.extend_from_slice(&key_xid.to_le_bytes());
                (key, child.to_le_bytes().to_vec())
            })
            .collect();
        let b = self.node(addr, xid, OBJ_PHYSICAL, TYPE_OMAP, root, level, true, &kvs);
        self.put(addr, b)
    }

    /// Root leaf of a file-system tree.
    pub fn fs_leaf(&mut self, addr: u64, oid: u64, xid: u64, records: &[FsRecord]) -> &mut Self {
        let kvs: Vec<_> = records
            .iter()
            .map(|r| (r.key.clone(), r.value.clone()))
            .collect();
        let b = self.node(oid, xid, 0, TYPE_FSTREE, true, 0, false, &kvs);
        self.put(addr, b)
    }

    /// Root index node of a file-system tree pointing at virtual children.
    pub fn fs_index(&mut self, addr: u64, oid: u64, xid: u64, children: &[u64]) -> &mut Self {
        let kvs: Vec<_> = children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let key = j_key(i as u64 + 1, RecordType::Inode);
                (key, child.to_le_bytes().to_vec())
            })
            .collect();
        let b = self.node(oid, xid, 0, TYPE_FSTREE, true, 1, false, &kvs);
        self.put(addr, b)
    }

    /// Places `bytes` at `addr` as-is (no checksum).
    pub fn raw(&mut self, addr: u64, mut bytes: Vec<u8>) -> &mut Self {
        bytes.resize(self.block_size as usize, 0);
        self.blocks.insert(addr, bytes);
        self
    }

    /// Flips a body byte of an already written block, breaking its checksum.
    pub fn corrupt(&mut self, addr: u64) -> &mut Self {
        if let Some(block) = self.blocks.get_mut(&addr) {
            block[200] ^= 0xff;
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let bs = self.block_size as usize;
        let count = self.blocks.keys().next_back().map_or(1, |last| last + 1) as usize;
        let mut image = vec![0u8; count * bs];
        for (addr, block) in &self.blocks {
            let start = *addr as usize * bs;
            image[start..start + bs].copy_from_slice(block);
        }
        image
    }

    #[allow(clippy::too_many_arguments)]
    fn node(
        &self,
        oid: u64,
        xid: u64,
        storage: u32,
        subtype: u32,
        root: bool,
        level: u16,
        fixed: bool,
        kvs: &[(Vec<u8>, Vec<u8>)],
    ) -> Vec<u8> {
        let raw_type = storage | if root { TYPE_BTREE } else { TYPE_BTREE_NODE };
        let mut b = self.object(oid, xid, raw_type, subtype);
        let bs = b.len();

        let mut flags = 0u16;
        if root {
            flags |= BTNODE_ROOT;
        }
        if level == 0 {
            flags |= BTNODE_LEAF;
        }
        if fixed {
            flags |= BTNODE_FIXED_KV_SIZE;
        }
        let entry_size = if fixed { 4 } else { 8 };
        let toc_len = kvs.len() * entry_size;

        LittleEndian::write_u16(&mut b[32..34], flags);
        LittleEndian::write_u16(&mut b[34..36], level);
        LittleEndian::write_u32(&mut b[36..40], kvs.len() as u32);
        LittleEndian::write_u16(&mut b[40..42], 0);
        LittleEndian::write_u16(&mut b[42..44], toc_len as u16);

        let toc_start = BTREE_NODE_DATA_OFFSET;
        let key_start = toc_start + toc_len;
        let val_end = bs - if root { BTREE_INFO_SIZE } else { 0 };

        let mut k_off = 0usize;
        let mut v_off = 0usize;
        for (i, (key, value)) in kvs.iter().enumerate() {
            v_off += value.len();
            let toc = toc_start + i * entry_size;
            LittleEndian::write_u16(&mut b[toc..toc + 2], k_off as u16);
            if fixed {
                LittleEndian::write_u16(&mut b[toc + 2..toc + 4], v_off as u16);
            } else {
                LittleEndian::write_u16(&mut b[toc + 2..toc + 4], key.len() as u16);
                LittleEndian::write_u16(&mut b[toc + 4..toc + 6], v_off as u16);
                LittleEndian::write_u16(&mut b[toc + 6..toc + 8], value.len() as u16);
            }
            let key_at = key_start + k_off;
            b[key_at..key_at + key.len()].copy_from_slice(key);
            let val_at = val_end - v_off;
            b[val_at..val_at + value.len()].copy_from_slice(value);
            k_off += key.len();
        }

        if root {
            let info = bs - BTREE_INFO_SIZE;
            LittleEndian::write_u32(&mut b[info + 4..info + 8], bs as u32);
            if fixed {
                LittleEndian::write_u32(&mut b[info + 8..info + 12], 16);
                LittleEndian::write_u32(&mut b[info + 12..info + 16], 16);
            }
            LittleEndian::write_u64(&mut b[info + 24..info + 32], kvs.len() as u64);
            LittleEndian::write_u64(&mut b[info + 32..info + 40], 1);
        }
        b
    }
}

/// Addresses used by [`single_volume_image`].
pub mod layout {
    pub const CONTAINER_OMAP: u64 = 10;
    pub const CONTAINER_OMAP_TREE: u64 = 11;
    pub const VOLUME: u64 = 20;
    pub const VOLUME_OMAP: u64 = 30;
    pub const VOLUME_OMAP_TREE: u64 = 31;
    pub const ROOT_NODE: u64 = 40;

    pub const VOLUME_OID: u64 = 1026;
    pub const ROOT_TREE_OID: u64 = 1028;
    pub const ROOT_DIR_ID: u64 = 2;
}

/// Container at `xid` with one volume whose root leaf lists `names` as
/// regular files of the root directory. The checkpoint ring holds only the
/// current superblock.
pub fn single_volume_image(xid: u64, volume_name: &str, names: &[&str]) -> Vec<u8> {
    use layout::*;

    let records: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| FsRecord::file(ROOT_DIR_ID, name, 100 + i as u64))
        .collect();

    let mut builder = ImageBuilder::default();
    builder
        .container(
            0,
            &ContainerParams {
                xid,
                omap: CONTAINER_OMAP,
                volumes: vec![VOLUME_OID],
                ring_base: 1,
                ring_index: 0,
                ring_length: 1,
            },
        )
        .object_map(CONTAINER_OMAP, xid, CONTAINER_OMAP_TREE)
        .omap_leaf(CONTAINER_OMAP_TREE, xid, true, &[(VOLUME_OID, xid, VOLUME)])
        .volume(
            VOLUME,
            &VolumeParams {
                oid: VOLUME_OID,
                xid,
                name: volume_name.to_string(),
                omap: VOLUME_OMAP,
                root_tree: ROOT_TREE_OID,
                encrypted: false,
            },
        )
        .object_map(VOLUME_OMAP, xid, VOLUME_OMAP_TREE)
        .omap_leaf(VOLUME_OMAP_TREE, xid, true, &[(ROOT_TREE_OID, xid, ROOT_NODE)])
        .fs_leaf(ROOT_NODE, ROOT_TREE_OID, xid, &records);
    builder.build()
}
