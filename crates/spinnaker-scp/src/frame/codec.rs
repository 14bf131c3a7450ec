// crates/spinnaker-scp/src/frame/codec.rs
use crate::hal::ScpError;

/// A trait for objects that can be serialized into and deserialized from a byte buffer.
pub trait Codec: Sized {
    /// Number of bytes `serialize` writes.
    fn encoded_len(&self) -> usize;

    /// Serializes the object into the start of the provided buffer.
    /// Returns the number of bytes written.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, ScpError>;

    /// Deserializes an object from the start of the provided buffer.
    fn deserialize(buffer: &[u8]) -> Result<Self, ScpError>;
}

/// Little-endian field helpers shared by the SDP and SCP layers.
pub struct CodecHelpers;

impl CodecHelpers {
    /// Reads a little-endian `u16` at `offset`. The caller guarantees the bounds.
    pub fn read_u16_le(buffer: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([buffer[offset], buffer[offset + 1]])
    }

    /// Reads a little-endian `u32` at `offset`. The caller guarantees the bounds.
    pub fn read_u32_le(buffer: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            buffer[offset],
            buffer[offset + 1],
            buffer[offset + 2],
            buffer[offset + 3],
        ])
    }

    /// Reads a little-endian `u32` at `offset` if at least four bytes remain.
    pub fn try_read_u32_le(buffer: &[u8], offset: usize) -> Option<u32> {
        if buffer.len() >= offset + 4 {
            Some(Self::read_u32_le(buffer, offset))
        } else {
            None
        }
    }

    pub fn write_u16_le(buffer: &mut [u8], offset: usize, value: u16) {
        buffer[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32_le(buffer: &mut [u8], offset: usize, value: u32) {
        buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
