#![no_main]

use libfuzzer_sys::fuzz_target;
use nxscan_core::{CheckpointWalker, WalkOptions};

fuzz_target!(|data: &[u8]| {
    let options = WalkOptions::new().without_checksums().include_encrypted();
    let _ = CheckpointWalker::new(data, "fuzz", options).walk();
});
