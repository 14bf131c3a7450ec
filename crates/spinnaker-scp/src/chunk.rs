// crates/spinnaker-scp/src/chunk.rs
//! Splits a memory transfer into packets no larger than the negotiated payload size.

use crate::command::DataType;

/// One packet's worth of a larger read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Remote start address of this chunk.
    pub address: u32,
    /// Offset of this chunk within the whole transfer.
    pub offset: usize,
    pub length: usize,
    /// Access size chosen from this chunk's own alignment and length.
    pub data_type: DataType,
}

/// Iterator over the chunks of a transfer, in ascending address order.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    address: u32,
    length: usize,
    max_payload: usize,
    offset: usize,
}

impl ChunkPlan {
    /// Plans a transfer of `length` bytes at `address`, `max_payload` bytes per packet.
    pub fn new(address: u32, length: usize, max_payload: usize) -> Self {
        Self {
            address,
            length,
            max_payload: max_payload.max(1),
            offset: 0,
        }
    }

    /// Number of chunks the transfer needs.
    pub fn chunk_count(&self) -> usize {
        self.length.div_ceil(self.max_payload)
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.length {
            return None;
        }
        let length = (self.length - self.offset).min(self.max_payload);
        let address = self.address.wrapping_add(self.offset as u32);
        let chunk = Chunk {
            address,
            offset: self.offset,
            length,
            data_type: DataType::for_transfer(address, length),
        };
        self.offset += length;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.length - self.offset.min(self.length)).div_ceil(self.max_payload);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}
