//! Versioned object-id resolution.
//!
//! An object map is loaded once per physical address into an explicit
//! `(oid, xid)` table; lookups then return the newest mapping that is not
//! newer than the requested transaction.

use crate::error::{CoreError, ResolutionError, Result};
use crate::ondisk::{ObjectMapNode, OmapRecord, Schema};
use crate::reader::ObjectReader;
use crate::traits::{BlockSource, StructureDecoder};
use crate::types::{ObjectId, PhysicalAddress, Xid};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Deepest object-map B-tree accepted before the tree is considered corrupt.
const MAX_TREE_DEPTH: u16 = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMap {
    records: BTreeMap<(ObjectId, Xid), OmapRecord>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: OmapRecord) {
        self.records.insert((record.oid, record.xid), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All stored versions of `oid`, oldest first.
    pub fn versions(&self, oid: ObjectId) -> impl Iterator<Item = &OmapRecord> {
        self.records
            .range((oid, Xid(0))..=(oid, Xid(u64::MAX)))
            .map(|(_, record)| record)
    }

    /// Physical address of the newest version of `oid` with an xid at or
    /// before `xid`.
    pub fn resolve(
        &self,
        oid: ObjectId,
        xid: Xid,
    ) -> std::result::Result<PhysicalAddress, ResolutionError> {
        if let Some((_, record)) = self.records.range((oid, Xid(0))..=(oid, xid)).next_back() {
            return Ok(record.paddr);
        }
        match self.versions(oid).next() {
            Some(oldest) => Err(ResolutionError::NoVersionAtOrBefore {
                oid,
                xid,
                oldest: oldest.xid,
            }),
            None => Err(ResolutionError::NotFound { oid, xid }),
        }
    }
}

impl FromIterator<OmapRecord> for ObjectMap {
    fn from_iter<I: IntoIterator<Item = OmapRecord>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl Extend<OmapRecord> for ObjectMap {
    fn extend<I: IntoIterator<Item = OmapRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

/// Loads object maps on demand and caches them by physical address.
#[derive(Debug, Default)]
pub struct ObjectMapResolver {
    maps: HashMap<PhysicalAddress, ObjectMap>,
}

impl ObjectMapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the object map stored at `address`, loading it first if needed.
    pub fn object_map<S, D>(
        &mut self,
        reader: &mut ObjectReader<S, D>,
        address: PhysicalAddress,
    ) -> Result<&ObjectMap>
    where
        S: BlockSource,
        D: StructureDecoder,
    {
        match self.maps.entry(address) {
            MapEntry::Occupied(entry) => Ok(entry.into_mut()),
            MapEntry::Vacant(entry) => {
                let map = load(reader, address)?;
                Ok(entry.insert(map))
            }
        }
    }

    /// Resolves `oid` at `xid` through the object map at `omap_address`.
    pub fn resolve<S, D>(
        &mut self,
        reader: &mut ObjectReader<S, D>,
        omap_address: PhysicalAddress,
        oid: ObjectId,
        xid: Xid,
    ) -> Result<PhysicalAddress>
    where
        S: BlockSource,
        D: StructureDecoder,
    {
        let address = self.object_map(reader, omap_address)?.resolve(oid, xid)?;
        tracing::debug!(
            omap = omap_address.get(),
            oid = oid.get(),
            xid = xid.get(),
            address = address.get(),
            "resolved object"
        );
        Ok(address)
    }

    pub fn cached_maps(&self) -> usize {
        self.maps.len()
    }
}

/// Reads the object map header and every leaf of its mapping tree.
fn load<S, D>(reader: &mut ObjectReader<S, D>, address: PhysicalAddress) -> Result<ObjectMap>
where
    S: BlockSource,
    D: StructureDecoder,
{
    let header = reader
        .read_object(address, Schema::ObjectMap)?
        .into_object_map()?;

    let mut map = ObjectMap::new();
    let mut visited = HashSet::new();
    let mut pending = vec![(header.tree_oid, 0u16)];

    while let Some((node_address, depth)) = pending.pop() {
        if depth > MAX_TREE_DEPTH {
            return Err(CoreError::InvalidFormat(format!(
                "object map at {address} is deeper than {MAX_TREE_DEPTH} levels"
            )));
        }
        if !visited.insert(node_address) {
            return Err(CoreError::InvalidFormat(format!(
                "object map at {address} revisits node {node_address}"
            )));
        }

        match reader
            .read_object(node_address, Schema::ObjectMapNode)?
            .into_object_map_node()?
        {
            ObjectMapNode::Leaf(records) => map.extend(records),
            ObjectMapNode::Index { children, .. } => {
                pending.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
            }
        }
    }

    tracing::debug!(
        omap = address.get(),
        mappings = map.len(),
        "loaded object map"
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ondisk::ApfsDecoder;
    use crate::testing::{ImageBuilder, TEST_BLOCK_SIZE};
    use proptest::prelude::*;
    use rstest::*;

    fn record(oid: u64, xid: u64, paddr: u64) -> OmapRecord {
        OmapRecord {
            oid: ObjectId(oid),
            xid: Xid(xid),
            flags: 0,
            size: TEST_BLOCK_SIZE,
            paddr: PhysicalAddress(paddr),
        }
    }

    fn reader(image: Vec<u8>) -> ObjectReader<Vec<u8>, ApfsDecoder> {
        ObjectReader::new(image, ApfsDecoder::new(), TEST_BLOCK_SIZE)
    }

    #[fixture]
    fn versioned() -> ObjectMap {
        [record(1026, 5, 500), record(1026, 9, 900), record(1027, 7, 700)]
            .into_iter()
            .collect()
    }

    #[rstest]
    #[case(5, 500)]
    #[case(8, 500)]
    #[case(9, 900)]
    #[case(1000, 900)]
    fn test_resolve_picks_newest_not_after(
        versioned: ObjectMap,
        #[case] xid: u64,
        #[case] expected: u64,
    ) {
        assert_eq!(
            versioned.resolve(ObjectId(1026), Xid(xid)),
            Ok(PhysicalAddress(expected))
        );
    }

    #[rstest]
    fn test_resolve_before_first_version(versioned: ObjectMap) {
        assert_eq!(
            versioned.resolve(ObjectId(1026), Xid(4)),
            Err(ResolutionError::NoVersionAtOrBefore {
                oid: ObjectId(1026),
                xid: Xid(4),
                oldest: Xid(5),
            })
        );
    }

    #[rstest]
    fn test_resolve_unknown_oid(versioned: ObjectMap) {
        assert_eq!(
            versioned.resolve(ObjectId(4242), Xid(100)),
            Err(ResolutionError::NotFound {
                oid: ObjectId(4242),
                xid: Xid(100),
            })
        );
    }

    #[test]
    fn test_load_single_leaf() {
        let mut builder = ImageBuilder::default();
        builder
            .object_map(10, 3, 11)
            .omap_leaf(11, 3, true, &[(1026, 3, 20), (1028, 2, 21)]);
        let mut reader = reader(builder.build());

        let mut resolver = ObjectMapResolver::new();
        let map = resolver.object_map(&mut reader, PhysicalAddress(10)).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            resolver
                .resolve(&mut reader, PhysicalAddress(10), ObjectId(1028), Xid(3))
                .unwrap(),
            PhysicalAddress(21)
        );
        assert_eq!(resolver.cached_maps(), 1);
    }

    #[test]
    fn test_load_two_level_tree() {
        let mut builder = ImageBuilder::default();
        builder
            .object_map(10, 6, 11)
            .omap_index(11, 6, true, 1, &[(1026, 1, 12), (1100, 1, 13)])
            .omap_leaf(12, 6, false, &[(1026, 1, 30), (1026, 6, 31)])
            .omap_leaf(13, 6, false, &[(1100, 4, 40)]);
        let mut reader = reader(builder.build());

        let mut resolver = ObjectMapResolver::new();
        let omap = PhysicalAddress(10);
        assert_eq!(
            resolver.resolve(&mut reader, omap, ObjectId(1026), Xid(5)).unwrap(),
            PhysicalAddress(30)
        );
        assert_eq!(
            resolver.resolve(&mut reader, omap, ObjectId(1100), Xid(6)).unwrap(),
            PhysicalAddress(40)
        );
        let err = resolver
            .resolve(&mut reader, omap, ObjectId(1100), Xid(3))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Resolution(ResolutionError::NoVersionAtOrBefore { .. })
        ));
    }

    #[test]
    fn test_load_rejects_cycle() {
        let mut builder = ImageBuilder::default();
        builder
            .object_map(10, 2, 11)
            .omap_index(11, 2, true, 1, &[(1026, 1, 11)]);
        let mut reader = reader(builder.build());

        let err = ObjectMapResolver::new()
            .object_map(&mut reader, PhysicalAddress(10))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat(_)));
    }

    #[test]
    fn test_load_propagates_corrupt_leaf() {
        let mut builder = ImageBuilder::default();
        builder
            .object_map(10, 2, 11)
            .omap_leaf(11, 2, true, &[(1026, 2, 20)])
            .corrupt(11);
        let mut reader = reader(builder.build());

        let err = ObjectMapResolver::new()
            .resolve(&mut reader, PhysicalAddress(10), ObjectId(1026), Xid(2))
            .unwrap_err();
        assert!(matches!(err, CoreError::Decode(_)));
    }

    proptest! {
        #[test]
        fn prop_never_returns_newer_version(
            xids in prop::collection::btree_set(1u64..1_000, 1..12),
            query in 0u64..1_100,
        ) {
            let map: ObjectMap = xids
                .iter()
                .map(|xid| record(77, *xid, xid * 10))
                .collect();

            match map.resolve(ObjectId(77), Xid(query)) {
                Ok(address) => {
                    let found = address.get() / 10;
                    prop_assert!(found <= query);
                    prop_assert!(!xids.iter().any(|x| *x > found && *x <= query));
                }
                Err(ResolutionError::NoVersionAtOrBefore { oldest, .. }) => {
                    prop_assert!(xids.iter().all(|x| *x > query));
                    prop_assert_eq!(Some(&oldest.get()), xids.iter().next());
                }
                Err(other) => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn prop_stable_between_versions(
            xids in prop::collection::btree_set(1u64..1_000, 1..12),
            low in 0u64..1_000,
            span in 0u64..200,
        ) {
            let map: ObjectMap = xids
                .iter()
                .map(|xid| record(77, *xid, xid * 10))
                .collect();
            let high = low + span;
            prop_assume!(!xids.iter().any(|x| *x > low && *x <= high));

            prop_assert_eq!(
                map.resolve(ObjectId(77), Xid(low)),
                map.resolve(ObjectId(77), Xid(high)).map_err(|e| match e {
                    ResolutionError::NoVersionAtOrBefore { oid, oldest, .. } => {
                        ResolutionError::NoVersionAtOrBefore { oid, xid: Xid(low), oldest }
                    }
                    other => other,
                })
            );
        }

        #[test]
        fn prop_absent_oid_is_not_found(
            xids in prop::collection::btree_set(1u64..1_000, 0..12),
            query in 0u64..2_000,
        ) {
            let map: ObjectMap = xids.iter().map(|xid| record(77, *xid, 1)).collect();
            prop_assert_eq!(
                map.resolve(ObjectId(78), Xid(query)),
                Err(ResolutionError::NotFound { oid: ObjectId(78), xid: Xid(query) })
            );
        }
    }
}
