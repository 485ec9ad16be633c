mod mmap_reader;
mod reader;

pub use mmap_reader::MmapReader;
pub use reader::DiskReader;

use nxscan_core::{BlockSource, Result};
use std::path::Path;

/// Opens `path` as a boxed block source, preferring a memory map.
pub fn create_reader(path: impl AsRef<Path>) -> Result<Box<dyn BlockSource>> {
    Ok(match Reader::new(path)? {
        Reader::Mmap(r) => Box::new(r),
        Reader::Disk(r) => Box::new(r),
    })
}

pub enum Reader {
    Mmap(MmapReader),
    Disk(DiskReader),
}

impl Reader {
    /// Memory-maps `path`, falling back to seek and read when mapping fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        match MmapReader::new(path_ref) {
            Ok(r) => Ok(Reader::Mmap(r)),
            Err(err) => {
                tracing::debug!(
                    path = %path_ref.display(),
                    error = %err,
                    "mmap unavailable, using disk reader"
                );
                Ok(Reader::Disk(DiskReader::new(path_ref)?))
            }
        }
    }

    /// Seek and read only.
    pub fn disk(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Reader::Disk(DiskReader::new(path)?))
    }

    #[inline]
    pub fn is_mmap(&self) -> bool {
        matches!(self, Reader::Mmap(_))
    }
}

impl BlockSource for Reader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        match self {
            Reader::Mmap(r) => r.read_chunk(offset, buffer),
            Reader::Disk(r) => r.read_chunk(offset, buffer),
        }
    }

    fn size(&self) -> u64 {
        match self {
            Reader::Mmap(r) => r.size(),
            Reader::Disk(r) => r.size(),
        }
    }
}
