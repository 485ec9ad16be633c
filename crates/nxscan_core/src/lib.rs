pub mod checkpoint;
mod error;
pub mod omap;
pub mod ondisk;
mod options;
mod reader;
mod report;
mod store;
mod traits;
mod types;
pub mod volume;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use checkpoint::CheckpointWalker;
pub use error::{CoreError, DecodeError, ErrorCategory, ResolutionError, Result};
pub use omap::{ObjectMap, ObjectMapResolver};
pub use ondisk::{ApfsDecoder, Entry, Schema};
pub use options::WalkOptions;
pub use reader::ObjectReader;
pub use report::{CheckpointSummary, StopReason, WalkReport};
pub use store::{FileEntryStore, RecoveredEntries};
pub use traits::{BlockSource, StructureDecoder};
pub use types::{ObjectId, PhysicalAddress, Xid};
pub use volume::{VolumeEntries, VolumeTraverser};
