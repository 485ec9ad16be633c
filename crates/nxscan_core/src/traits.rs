//! Ports between the recovery core and its collaborators.
//!
//! The checkpoint walker never touches a file or parses bytes itself: it
//! fetches blocks through [`BlockSource`] and turns them into typed
//! structures through [`StructureDecoder`]. Infrastructure crates provide
//! the concrete adapters.

use crate::error::{CoreError, DecodeError, Result};
use crate::ondisk::{Object, Schema};
use crate::types::PhysicalAddress;

/// A source of raw block data, typically a disk image file.
///
/// Reads are read-only and idempotent; callers may issue them at any
/// address in any order.
pub trait BlockSource {
    /// Reads up to `buffer.len()` bytes starting at byte `offset`.
    ///
    /// Returns the number of bytes actually read, which may be less than
    /// `buffer.len()` if the end of the source is reached.
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the total size of the source in bytes.
    fn size(&self) -> u64;

    /// Reads exactly one block at `address`.
    ///
    /// Fails with [`CoreError::OutOfBounds`] when the block does not lie
    /// entirely inside the source and [`CoreError::ShortRead`] when the
    /// medium returns fewer bytes than requested.
    fn read_block(&mut self, address: PhysicalAddress, block_size: u32) -> Result<Vec<u8>> {
        let max = self.size();
        let offset = address
            .byte_offset(block_size)
            .ok_or(CoreError::OutOfBounds {
                offset: u64::MAX,
                max,
            })?;
        let end = offset.checked_add(u64::from(block_size));
        if !matches!(end, Some(end) if end <= max) {
            return Err(CoreError::OutOfBounds { offset, max });
        }

        let mut buffer = vec![0u8; block_size as usize];
        let mut filled = 0usize;
        while filled < buffer.len() {
            let n = self.read_chunk(offset + filled as u64, &mut buffer[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled != buffer.len() {
            return Err(CoreError::ShortRead {
                address,
                expected: buffer.len(),
                actual: filled,
            });
        }
        Ok(buffer)
    }
}

/// Schema-driven decoder for on-disk structures.
///
/// The decoder reads the object header, validates it against `schema` and
/// returns the matching [`Object`] body variant.
pub trait StructureDecoder {
    fn decode(&self, bytes: &[u8], schema: Schema) -> std::result::Result<Object, DecodeError>;

    /// Extracts the container block size from the first bytes of block 0,
    /// before the full block can be read and verified.
    fn block_size(&self, bytes: &[u8]) -> std::result::Result<u32, DecodeError>;
}

impl<T: BlockSource + ?Sized> BlockSource for Box<T> {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        (**self).read_chunk(offset, buffer)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

impl<T: BlockSource + ?Sized> BlockSource for &mut T {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        (**self).read_chunk(offset, buffer)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }
}

impl BlockSource for Vec<u8> {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        self.as_slice().read_chunk(offset, buffer)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl BlockSource for &[u8] {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let len = buffer.len().min(self.len() - start);
        buffer[..len].copy_from_slice(&self[start..start + len]);
        Ok(len)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `step` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        step: usize,
    }

    impl BlockSource for Trickle {
        fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
            let limit = buffer.len().min(self.step);
            self.data.as_slice().read_chunk(offset, &mut buffer[..limit])
        }

        fn size(&self) -> u64 {
            self.data.len() as u64
        }
    }

    #[test]
    fn test_read_block_in_range() {
        let mut data: Vec<u8> = (0..=255u8).cycle().take(1024).collect();
        let block = data.read_block(PhysicalAddress(2), 256).unwrap();
        assert_eq!(block.len(), 256);
        assert_eq!(block[0], 0);
        assert_eq!(block[255], 255);
    }

    #[test]
    fn test_read_block_past_end() {
        let mut data = vec![0u8; 1000];
        let err = data.read_block(PhysicalAddress(3), 256).unwrap_err();
        assert!(matches!(err, CoreError::OutOfBounds { offset: 768, max: 1000 }));
    }

    #[test]
    fn test_read_block_overflowing_address() {
        let mut data = vec![0u8; 16];
        let err = data.read_block(PhysicalAddress(u64::MAX), 4096).unwrap_err();
        assert!(matches!(err, CoreError::OutOfBounds { .. }));
    }

    #[test]
    fn test_read_block_assembles_partial_reads() {
        let mut source = Trickle {
            data: (0..64u8).collect(),
            step: 5,
        };
        let block = source.read_block(PhysicalAddress(1), 32).unwrap();
        assert_eq!(block, (32..64u8).collect::<Vec<_>>());
    }

    #[test]
    fn test_boxed_source() {
        let mut boxed: Box<dyn BlockSource> = Box::new(vec![7u8; 64]);
        assert_eq!(boxed.size(), 64);
        assert_eq!(boxed.read_block(PhysicalAddress(1), 32).unwrap(), vec![7u8; 32]);
    }
}
