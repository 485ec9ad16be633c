#![no_main]

use libfuzzer_sys::fuzz_target;
use nxscan_core::{ApfsDecoder, Schema, StructureDecoder};

const SCHEMAS: [Schema; 5] = [
    Schema::ContainerSuperblock,
    Schema::ObjectMap,
    Schema::ObjectMapNode,
    Schema::VolumeSuperblock,
    Schema::FsTreeNode,
];

fuzz_target!(|data: &[u8]| {
    let decoder = ApfsDecoder::new().without_checksums();
    for schema in SCHEMAS {
        let _ = decoder.decode(data, schema);
    }
    let _ = decoder.block_size(data);
});
