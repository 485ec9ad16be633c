use memmap2::Mmap;
use nxscan_core::{BlockSource, CoreError, Result};
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

/// Memory-mapped image. Block devices usually cannot be mapped; callers
/// fall back to [`crate::DiskReader`].
pub struct MmapReader {
    mmap: Mmap,
    size: u64,
}

impl MmapReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;

        let size = file.seek(SeekFrom::End(0))?;

        if size == 0 {
            return Err(CoreError::InvalidFormat(
                "Cannot mmap empty file".to_string(),
            ));
        }

        // SAFETY: the mapping is read-only; the image is not expected to be
        // modified while it is being examined.
        let mmap =
            unsafe { Mmap::map(&file) }.map_err(|e| CoreError::Io(std::io::Error::other(e)))?;

        if mmap.len() == 0 {
            return Err(CoreError::InvalidFormat(
                "mmap returned empty mapping (block device not supported)".to_string(),
            ));
        }

        #[cfg(unix)]
        {
            use memmap2::Advice;
            let _ = mmap.advise(Advice::Random);
        }

        Ok(Self { mmap, size })
    }

    /// Bytes in `offset..offset + len`, clipped to the end of the mapping.
    #[inline]
    pub fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset).ok()?;
        if start >= self.mmap.len() {
            return None;
        }
        let end = start.saturating_add(len).min(self.mmap.len());
        Some(&self.mmap[start..end])
    }
}

impl BlockSource for MmapReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        if let Some(slice) = self.slice(offset, buffer.len()) {
            let len = slice.len();
            buffer[..len].copy_from_slice(slice);
            Ok(len)
        } else {
            Ok(0)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nxscan_core::PhysicalAddress;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mmap_reader_slices() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let test_data = b"NXSB container image for MmapReader.";
        temp_file.write_all(test_data).unwrap();
        temp_file.flush().unwrap();

        let reader = MmapReader::new(temp_file.path()).unwrap();

        assert_eq!(reader.size(), test_data.len() as u64);
        assert_eq!(reader.slice(0, 4).unwrap(), b"NXSB");
        assert_eq!(reader.slice(5, 9).unwrap(), b"container");
    }

    #[test]
    fn test_mmap_reader_read_block() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&[0u8; 4096]).unwrap();
        temp_file.write_all(&[7u8; 4096]).unwrap();
        temp_file.flush().unwrap();

        let mut reader = MmapReader::new(temp_file.path()).unwrap();
        let block = reader.read_block(PhysicalAddress(1), 4096).unwrap();
        assert_eq!(block, vec![7u8; 4096]);
        assert!(reader.read_block(PhysicalAddress(2), 4096).is_err());
    }

    #[test]
    fn test_mmap_reader_beyond_eof() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Short").unwrap();
        temp_file.flush().unwrap();

        let mut reader = MmapReader::new(temp_file.path()).unwrap();

        assert_eq!(reader.slice(0, 100).unwrap().len(), 5);
        assert!(reader.slice(100, 10).is_none());

        let mut buffer = [0u8; 8];
        assert_eq!(reader.read_chunk(100, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn test_mmap_reader_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let result = MmapReader::new(temp_file.path());
        assert!(matches!(result, Err(CoreError::InvalidFormat(_))));
    }
}
