//! Outcome of a checkpoint walk.

use crate::error::{CoreError, ErrorCategory};
use crate::store::{FileEntryStore, RecoveredEntries};
use crate::types::{PhysicalAddress, Xid};
use serde::Serialize;

/// Why the walk over historical superblocks ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// History was not requested, or the ring holds a single slot.
    CurrentOnly,
    /// The ring is not laid out contiguously, so older slots cannot be located.
    NonContiguousRing,
    /// Every slot of the ring was visited.
    RingExhausted,
    /// The configured checkpoint limit was reached before the ring was.
    LimitReached,
    /// A historical superblock or one of its volumes could not be read.
    Corrupted {
        address: PhysicalAddress,
        category: ErrorCategory,
        message: String,
    },
}

impl StopReason {
    pub(crate) fn corrupted(address: PhysicalAddress, err: &CoreError) -> Self {
        Self::Corrupted {
            address,
            category: err.category(),
            message: err.to_string(),
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, Self::Corrupted { .. })
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CurrentOnly => f.write_str("current superblock only"),
            Self::NonContiguousRing => f.write_str("checkpoint ring is not contiguous"),
            Self::RingExhausted => f.write_str("checkpoint ring exhausted"),
            Self::LimitReached => f.write_str("checkpoint limit reached"),
            Self::Corrupted {
                address,
                category,
                message,
            } => write!(f, "{category} failure at block {address}: {message}"),
        }
    }
}

/// One container superblock whose volumes were merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointSummary {
    pub address: PhysicalAddress,
    pub xid: Xid,
    pub volumes: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    /// Display label of the image; not used for parsing.
    pub label: String,
    pub block_size: u32,
    #[serde(serialize_with = "hex_uuid")]
    pub container_uuid: [u8; 16],
    pub entries: FileEntryStore,
    /// Newest first.
    pub checkpoints: Vec<CheckpointSummary>,
    pub stop: StopReason,
}

impl WalkReport {
    pub fn into_entries(self) -> RecoveredEntries {
        self.entries.into_entries()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.entry_count()
    }

    /// Transaction id of the current superblock.
    pub fn current_xid(&self) -> Option<Xid> {
        self.checkpoints.first().map(|c| c.xid)
    }
}

fn hex_uuid<S: serde::Serializer>(uuid: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(uuid))
}
