use crate::error::Result;
use crate::ondisk::{Object, Schema};
use crate::traits::{BlockSource, StructureDecoder};
use crate::types::PhysicalAddress;

/// Reads whole blocks from a [`BlockSource`] and decodes them.
pub struct ObjectReader<S, D> {
    source: S,
    decoder: D,
    block_size: u32,
}

impl<S: BlockSource, D: StructureDecoder> ObjectReader<S, D> {
    pub fn new(source: S, decoder: D, block_size: u32) -> Self {
        Self {
            source,
            decoder,
            block_size,
        }
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size;
    }

    pub fn source_size(&self) -> u64 {
        self.source.size()
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn read_block(&mut self, address: PhysicalAddress) -> Result<Vec<u8>> {
        self.source.read_block(address, self.block_size)
    }

    pub fn read_object(&mut self, address: PhysicalAddress, schema: Schema) -> Result<Object> {
        let block = self.read_block(address)?;
        let object = self.decoder.decode(&block, schema)?;
        tracing::trace!(
            address = address.get(),
            schema = schema.name(),
            oid = object.header.oid.get(),
            xid = object.header.xid.get(),
            "decoded object"
        );
        Ok(object)
    }
}
