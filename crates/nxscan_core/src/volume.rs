//! Root directory node of a volume.

use crate::error::Result;
use crate::omap::ObjectMapResolver;
use crate::ondisk::{Entry, Node, Schema, VolumeSuperblock};
use crate::reader::ObjectReader;
use crate::store::RecoveredEntries;
use crate::traits::{BlockSource, StructureDecoder};
use crate::types::Xid;
use std::collections::BTreeMap;

/// Records of one volume at the volume's own transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEntries {
    pub xid: Xid,
    pub name: String,
    pub entries: Vec<Entry>,
}

impl From<VolumeEntries> for RecoveredEntries {
    fn from(volume: VolumeEntries) -> Self {
        let mut by_name = BTreeMap::new();
        by_name.insert(volume.name, volume.entries);
        let mut by_xid = BTreeMap::new();
        by_xid.insert(volume.xid, by_name);
        by_xid
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeTraverser {
    skip_encrypted: bool,
}

impl Default for VolumeTraverser {
    fn default() -> Self {
        Self {
            skip_encrypted: true,
        }
    }
}

impl VolumeTraverser {
    pub fn new(skip_encrypted: bool) -> Self {
        Self { skip_encrypted }
    }

    /// Resolves the root tree of `volume` through the volume's object map at
    /// the volume's xid and returns the records of the root node.
    ///
    /// A pointer root contributes no records: children are not followed.
    pub fn entries<S, D>(
        &self,
        reader: &mut ObjectReader<S, D>,
        resolver: &mut ObjectMapResolver,
        volume: &VolumeSuperblock,
    ) -> Result<VolumeEntries>
    where
        S: BlockSource,
        D: StructureDecoder,
    {
        let mut result = VolumeEntries {
            xid: volume.xid,
            name: volume.name.clone(),
            entries: Vec::new(),
        };

        if self.skip_encrypted && volume.is_encrypted() {
            tracing::warn!(
                volume = %volume.name,
                xid = volume.xid.get(),
                "skipping encrypted volume"
            );
            return Ok(result);
        }

        let root = resolver.resolve(reader, volume.omap_oid, volume.root_tree_oid, volume.xid)?;
        match reader.read_object(root, Schema::FsTreeNode)?.into_node()? {
            Node::Leaf(leaf) => result.entries = leaf.entries,
            Node::Pointer(pointer) => {
                tracing::warn!(
                    volume = %volume.name,
                    level = pointer.level,
                    children = pointer.children.len(),
                    "root node is an index node, children are not followed"
                );
            }
        }

        tracing::debug!(
            volume = %result.name,
            xid = result.xid.get(),
            entries = result.entries.len(),
            "read volume root"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ResolutionError};
    use crate::ondisk::{ApfsDecoder, Record, RecordType};
    use crate::testing::{layout::*, FsRecord, ImageBuilder, VolumeParams, TEST_BLOCK_SIZE};
    use crate::types::PhysicalAddress;
    use rstest::*;

    fn volume_params(xid: u64, encrypted: bool) -> VolumeParams {
        VolumeParams {
            oid: VOLUME_OID,
            xid,
            name: "Data".to_string(),
            omap: VOLUME_OMAP,
            root_tree: ROOT_TREE_OID,
            encrypted,
        }
    }

    /// Volume at `xid` with its omap mapping the root tree at `mapped_xid`.
    fn image(
        xid: u64,
        mapped_xid: u64,
        encrypted: bool,
        root: impl FnOnce(&mut ImageBuilder),
    ) -> Vec<u8> {
        let mut builder = ImageBuilder::default();
        builder
            .volume(VOLUME, &volume_params(xid, encrypted))
            .object_map(VOLUME_OMAP, xid, VOLUME_OMAP_TREE)
            .omap_leaf(
                VOLUME_OMAP_TREE,
                xid,
                true,
                &[(ROOT_TREE_OID, mapped_xid, ROOT_NODE)],
            );
        root(&mut builder);
        builder.build()
    }

    fn traverse(image: Vec<u8>, traverser: VolumeTraverser) -> Result<VolumeEntries> {
        let mut reader = ObjectReader::new(image, ApfsDecoder::new(), TEST_BLOCK_SIZE);
        let volume = reader
            .read_object(PhysicalAddress(VOLUME), Schema::VolumeSuperblock)?
            .into_volume_superblock()?;
        traverser.entries(&mut reader, &mut ObjectMapResolver::new(), &volume)
    }

    #[fixture]
    fn leaf_records() -> Vec<FsRecord> {
        vec![
            FsRecord::inode(ROOT_DIR_ID, 1, 0o040755),
            FsRecord::file(ROOT_DIR_ID, "notes.txt", 100),
            FsRecord::directory(ROOT_DIR_ID, "Photos", 101),
        ]
    }

    #[rstest]
    fn test_leaf_root_in_disk_order(leaf_records: Vec<FsRecord>) {
        let image = image(6, 6, false, |b| {
            b.fs_leaf(ROOT_NODE, ROOT_TREE_OID, 6, &leaf_records);
        });
        let volume = traverse(image, VolumeTraverser::default()).unwrap();

        assert_eq!(volume.xid, Xid(6));
        assert_eq!(volume.name, "Data");
        let names: Vec<_> = volume.entries.iter().map(|e| e.name.as_deref()).collect();
        assert_eq!(names, [None, Some("notes.txt"), Some("Photos")]);
    }

    #[test]
    fn test_undecoded_records_carried_through() {
        let image = image(6, 6, false, |b| {
            b.fs_leaf(
                ROOT_NODE,
                ROOT_TREE_OID,
                6,
                &[
                    FsRecord::raw(ROOT_DIR_ID, RecordType::DstreamId, &[1, 0, 0, 0]),
                    FsRecord::file(ROOT_DIR_ID, "a", 100),
                ],
            );
        });
        let volume = traverse(image, VolumeTraverser::default()).unwrap();

        assert_eq!(volume.entries.len(), 2);
        assert_eq!(volume.entries[0].record_type, RecordType::DstreamId);
        assert_eq!(
            volume.entries[0].record,
            Record::Raw {
                value: vec![1, 0, 0, 0]
            }
        );
        assert_eq!(volume.entries[1].name.as_deref(), Some("a"));
    }

    #[test]
    fn test_pointer_root_yields_nothing() {
        let image = image(6, 6, false, |b| {
            b.fs_index(ROOT_NODE, ROOT_TREE_OID, 6, &[1100, 1101]);
        });
        let volume = traverse(image, VolumeTraverser::default()).unwrap();
        assert!(volume.entries.is_empty());
    }

    #[test]
    fn test_encrypted_volume_skipped() {
        // No root node at all: reading it would fail.
        let image = image(6, 6, true, |_| {});
        let volume = traverse(image, VolumeTraverser::new(true)).unwrap();
        assert!(volume.entries.is_empty());
    }

    #[test]
    fn test_encrypted_volume_read_when_requested() {
        let image = image(6, 6, true, |b| {
            b.fs_leaf(ROOT_NODE, ROOT_TREE_OID, 6, &[FsRecord::file(ROOT_DIR_ID, "a", 100)]);
        });
        let volume = traverse(image, VolumeTraverser::new(false)).unwrap();
        assert_eq!(volume.entries.len(), 1);
    }

    #[test]
    fn test_root_newer_than_volume_fails() {
        let image = image(6, 8, false, |b| {
            b.fs_leaf(ROOT_NODE, ROOT_TREE_OID, 8, &[]);
        });
        let err = traverse(image, VolumeTraverser::default()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Resolution(ResolutionError::NoVersionAtOrBefore { .. })
        ));
    }

    #[test]
    fn test_into_recovered_entries() {
        let volume = VolumeEntries {
            xid: Xid(3),
            name: "Data".to_string(),
            entries: vec![],
        };
        let recovered = RecoveredEntries::from(volume);
        assert!(recovered[&Xid(3)]["Data"].is_empty());
    }
}
