use nxscan_core::testing::single_volume_image;
use nxscan_core::{CheckpointWalker, StopReason, WalkOptions, Xid};
use nxscan_io::{DiskReader, MmapReader, Reader};
use rstest::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[fixture]
fn image_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&single_volume_image(7, "TestVol", &["a", "b"]))
        .unwrap();
    file.flush().unwrap();
    file
}

fn names(entries: &nxscan_core::RecoveredEntries) -> Vec<String> {
    entries[&Xid(7)]["TestVol"]
        .iter()
        .filter_map(|e| e.name.clone())
        .collect()
}

#[rstest]
fn test_walk_through_disk_reader(image_file: NamedTempFile) {
    let source = DiskReader::new(image_file.path()).unwrap();
    let report = CheckpointWalker::new(source, "disk", WalkOptions::default())
        .walk()
        .unwrap();

    assert_eq!(report.stop, StopReason::CurrentOnly);
    assert_eq!(names(&report.into_entries()), ["a", "b"]);
}

#[rstest]
fn test_walk_through_mmap_reader(image_file: NamedTempFile) {
    let source = MmapReader::new(image_file.path()).unwrap();
    let report = CheckpointWalker::new(source, "mmap", WalkOptions::default())
        .walk()
        .unwrap();
    assert_eq!(names(&report.into_entries()), ["a", "b"]);
}

#[rstest]
fn test_walk_through_boxed_reader(image_file: NamedTempFile) {
    let source = nxscan_io::create_reader(image_file.path()).unwrap();
    let report = CheckpointWalker::new(source, "boxed", WalkOptions::default())
        .walk()
        .unwrap();
    assert_eq!(report.label, "boxed");
    assert_eq!(report.entry_count(), 2);
}

#[rstest]
fn test_truncated_image_is_fatal(image_file: NamedTempFile) {
    let full = std::fs::read(image_file.path()).unwrap();
    let mut truncated = NamedTempFile::new().unwrap();
    truncated.write_all(&full[..full.len() - 4096]).unwrap();
    truncated.flush().unwrap();

    let source = Reader::new(truncated.path()).unwrap();
    let err = CheckpointWalker::new(source, "truncated", WalkOptions::default())
        .walk()
        .unwrap_err();
    assert_eq!(err.category(), nxscan_core::ErrorCategory::Io);
}
