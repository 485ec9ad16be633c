//! Block reader for disk image files and raw devices.

use nxscan_core::{BlockSource, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// A read-only block source over a file or device, using seek and read.
///
/// Container metadata is scattered across the image and the checkpoint
/// walker jumps between object maps, volume superblocks and tree nodes, so
/// the kernel is told to expect random access.
///
/// # Example
///
/// ```ignore
/// use nxscan_io::DiskReader;
/// use nxscan_core::{BlockSource, PhysicalAddress};
///
/// let mut reader = DiskReader::new("/dev/disk2s2")?;
/// let superblock = reader.read_block(PhysicalAddress(0), 4096)?;
/// ```
pub struct DiskReader {
    file: File,
    size: u64,
}

impl DiskReader {
    /// Opens `path` read-only and records its size.
    ///
    /// Fails if the path does not exist, permission is denied, or the size
    /// cannot be determined by seeking to the end.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(false)
            .open(path.as_ref())?;

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};

            let _ = fadvise(&file, 0, None, Advice::Random);
        }

        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        Ok(Self { file, size })
    }
}

impl BlockSource for DiskReader {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        let bytes_read = self.file.read(buffer)?;

        Ok(bytes_read)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nxscan_core::{CoreError, PhysicalAddress};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image(blocks: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        for fill in blocks {
            temp_file.write_all(&[*fill; 4096]).unwrap();
        }
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_disk_reader_blocks() {
        let temp_file = image(&[0x11, 0x22, 0x33]);
        let mut reader = DiskReader::new(temp_file.path()).unwrap();

        assert_eq!(reader.size(), 3 * 4096);
        let block = reader.read_block(PhysicalAddress(2), 4096).unwrap();
        assert!(block.iter().all(|b| *b == 0x33));
        let block = reader.read_block(PhysicalAddress(0), 4096).unwrap();
        assert!(block.iter().all(|b| *b == 0x11));
    }

    #[test]
    fn test_disk_reader_block_past_end() {
        let temp_file = image(&[0x11]);
        let mut reader = DiskReader::new(temp_file.path()).unwrap();

        let err = reader.read_block(PhysicalAddress(1), 4096).unwrap_err();
        assert!(matches!(err, CoreError::OutOfBounds { .. }));
    }

    #[test]
    fn test_disk_reader_read_beyond_end() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Short").unwrap();
        temp_file.flush().unwrap();

        let mut reader = DiskReader::new(temp_file.path()).unwrap();

        let mut buffer = vec![0u8; 100];
        let bytes_read = reader.read_chunk(0, &mut buffer).unwrap();
        assert_eq!(bytes_read, 5);
    }

    #[test]
    fn test_disk_reader_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = DiskReader::new(dir.path().join("absent.img"));
        assert!(matches!(result, Err(CoreError::Io(_))));
    }
}
