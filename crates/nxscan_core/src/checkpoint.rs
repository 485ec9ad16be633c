//! Current and historical container superblocks.
//!
//! The walker merges the volumes of the superblock at block 0, then follows
//! the checkpoint descriptor ring to older superblocks. Failures on the
//! current superblock are returned to the caller; a failure on a historical
//! one ends the walk and keeps whatever was merged before it.

use crate::error::{CoreError, Result};
use crate::omap::ObjectMapResolver;
use crate::ondisk::{ApfsDecoder, ContainerSuperblock, Schema, MIN_BLOCK_SIZE};
use crate::options::WalkOptions;
use crate::reader::ObjectReader;
use crate::report::{CheckpointSummary, StopReason, WalkReport};
use crate::store::FileEntryStore;
use crate::traits::{BlockSource, StructureDecoder};
use crate::types::PhysicalAddress;
use crate::volume::VolumeTraverser;
use std::collections::HashSet;

/// Block 0 always holds a copy of the latest container superblock.
pub const CURRENT_SUPERBLOCK: PhysicalAddress = PhysicalAddress(0);

pub struct CheckpointWalker<S, D = ApfsDecoder> {
    reader: ObjectReader<S, D>,
    resolver: ObjectMapResolver,
    traverser: VolumeTraverser,
    options: WalkOptions,
    label: String,
}

impl<S: BlockSource> CheckpointWalker<S, ApfsDecoder> {
    pub fn new(source: S, label: impl Into<String>, options: WalkOptions) -> Self {
        let decoder = if options.verify_checksums {
            ApfsDecoder::new()
        } else {
            ApfsDecoder::new().without_checksums()
        };
        Self::with_decoder(source, decoder, label, options)
    }
}

impl<S: BlockSource, D: StructureDecoder> CheckpointWalker<S, D> {
    pub fn with_decoder(
        source: S,
        decoder: D,
        label: impl Into<String>,
        options: WalkOptions,
    ) -> Self {
        Self {
            reader: ObjectReader::new(source, decoder, MIN_BLOCK_SIZE),
            resolver: ObjectMapResolver::new(),
            traverser: VolumeTraverser::new(options.skip_encrypted_volumes),
            options,
            label: label.into(),
        }
    }

    pub fn walk(mut self) -> Result<WalkReport> {
        let current = self.load_current()?;
        tracing::info!(
            label = %self.label,
            xid = current.xid.get(),
            block_size = current.block_size,
            volumes = current.volume_oids.len(),
            ring_length = current.ring.length,
            "reading current container superblock"
        );

        let mut store = FileEntryStore::new();
        let mut checkpoints = Vec::new();
        let step = self.collect(&current)?;
        commit(&mut store, &mut checkpoints, CURRENT_SUPERBLOCK, &current, step);

        let stop = self.walk_history(&current, &mut store, &mut checkpoints);
        tracing::info!(
            label = %self.label,
            checkpoints = checkpoints.len(),
            entries = store.entry_count(),
            stop = %stop,
            "walk finished"
        );

        Ok(WalkReport {
            label: self.label,
            block_size: current.block_size,
            container_uuid: current.uuid,
            entries: store,
            checkpoints,
            stop,
        })
    }

    /// Probes the block size at block 0, then decodes the whole superblock.
    fn load_current(&mut self) -> Result<ContainerSuperblock> {
        let block = self.reader.read_block(CURRENT_SUPERBLOCK)?;
        let block_size = self.reader.decoder().block_size(&block)?;
        self.reader.set_block_size(block_size);
        self.superblock(CURRENT_SUPERBLOCK)
    }

    fn superblock(&mut self, address: PhysicalAddress) -> Result<ContainerSuperblock> {
        let superblock = self
            .reader
            .read_object(address, Schema::ContainerSuperblock)?
            .into_container_superblock()?;
        if superblock.block_size != self.reader.block_size() {
            return Err(CoreError::InvalidFormat(format!(
                "superblock at {address} declares block size {}, container uses {}",
                superblock.block_size,
                self.reader.block_size()
            )));
        }
        Ok(superblock)
    }

    /// Records of every volume of `container`, keyed by the container's xid.
    fn collect(&mut self, container: &ContainerSuperblock) -> Result<FileEntryStore> {
        let mut step = FileEntryStore::new();
        for oid in &container.volume_oids {
            let address =
                self.resolver
                    .resolve(&mut self.reader, container.omap_oid, *oid, container.xid)?;
            let volume = self
                .reader
                .read_object(address, Schema::VolumeSuperblock)?
                .into_volume_superblock()?;
            let entries = self
                .traverser
                .entries(&mut self.reader, &mut self.resolver, &volume)?;
            step.merge(entries.into(), container.xid, None);
        }
        Ok(step)
    }

    fn walk_history(
        &mut self,
        current: &ContainerSuperblock,
        store: &mut FileEntryStore,
        checkpoints: &mut Vec<CheckpointSummary>,
    ) -> StopReason {
        let ring_length = current.ring.length;
        if !self.options.include_history || ring_length <= 1 {
            return StopReason::CurrentOnly;
        }

        let budget = self.options.history_budget(ring_length);
        let mut ring = current.ring;
        let mut visited = HashSet::new();
        for _ in 0..budget {
            if !ring.contiguous {
                tracing::warn!(
                    base = ring.base.get(),
                    length = ring.length,
                    "checkpoint ring is not contiguous, history unavailable"
                );
                return StopReason::NonContiguousRing;
            }
            let Some(address) = ring.previous_superblock() else {
                let err = CoreError::OutOfBounds {
                    offset: ring.base.get(),
                    max: self.reader.source_size(),
                };
                tracing::warn!(
                    base = ring.base.get(),
                    index = ring.index,
                    length = ring.length,
                    "checkpoint ring slot is not addressable, stopping walk"
                );
                return StopReason::corrupted(ring.base, &err);
            };
            if !visited.insert(address) {
                tracing::debug!(address = address.get(), "checkpoint ring loops back");
                return StopReason::RingExhausted;
            }

            let step = self
                .superblock(address)
                .and_then(|container| self.collect(&container).map(|step| (container, step)));
            match step {
                Ok((container, _)) if checkpoints.iter().any(|c| c.xid == container.xid) => {
                    tracing::debug!(
                        address = address.get(),
                        xid = container.xid.get(),
                        "checkpoint already merged"
                    );
                    ring = container.ring;
                }
                Ok((container, step)) => {
                    commit(store, checkpoints, address, &container, step);
                    ring = container.ring;
                }
                Err(err) => {
                    tracing::warn!(
                        address = address.get(),
                        category = %err.category(),
                        error = %err,
                        "historical checkpoint unreadable, stopping walk"
                    );
                    return StopReason::corrupted(address, &err);
                }
            }
        }

        if budget < ring_length - 1 {
            StopReason::LimitReached
        } else {
            StopReason::RingExhausted
        }
    }
}

fn commit(
    store: &mut FileEntryStore,
    checkpoints: &mut Vec<CheckpointSummary>,
    address: PhysicalAddress,
    container: &ContainerSuperblock,
    step: FileEntryStore,
) {
    let summary = CheckpointSummary {
        address,
        xid: container.xid,
        volumes: container.volume_oids.len(),
        entries: step.entry_count(),
    };
    tracing::info!(
        address = address.get(),
        xid = summary.xid.get(),
        volumes = summary.volumes,
        entries = summary.entries,
        "merged checkpoint"
    );
    store.merge(step.into_entries(), container.xid, None);
    checkpoints.push(summary);
}
