// crates/spinnaker-scp/src/version.rs
//! Decoding of software version (`sver`) replies.

use crate::frame::ScpPacket;
use crate::hal::ScpError;
use alloc::string::String;

fn version_args(packet: &ScpPacket) -> Result<(u32, u32, u32), ScpError> {
    match packet.args() {
        [Some(arg1), Some(arg2), Some(arg3)] => Ok((arg1, arg2, arg3)),
        _ => Err(ScpError::MalformedPacket {
            length: packet.encoded_len(),
        }),
    }
}

fn version_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .into()
}

/// Information about the software running on a SpiNNaker core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreInfo {
    /// Position of the chip in the machine's peer-to-peer network.
    pub position: (u8, u8),
    pub physical_cpu: u8,
    pub virtual_cpu: u8,
    /// Software version in hundredths (e.g. 128 for 1.28).
    pub version_hundredths: u16,
    /// Largest SCP data field the core accepts, in bytes.
    pub buffer_size: u16,
    /// Build date as a Unix timestamp.
    pub build_date: u32,
    pub version_string: String,
}

impl CoreInfo {
    pub fn from_packet(packet: &ScpPacket) -> Result<Self, ScpError> {
        let (arg1, arg2, arg3) = version_args(packet)?;
        let p2p = arg1 >> 16;
        Ok(Self {
            position: ((p2p >> 8) as u8, (p2p & 0xff) as u8),
            physical_cpu: ((arg1 >> 8) & 0xff) as u8,
            virtual_cpu: (arg1 & 0xff) as u8,
            version_hundredths: (arg2 >> 16) as u16,
            buffer_size: (arg2 & 0xffff) as u16,
            build_date: arg3,
            version_string: version_string(&packet.data),
        })
    }

    pub fn version(&self) -> f32 {
        f32::from(self.version_hundredths) / 100.0
    }
}

/// Information about the software running on a board management processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BmpInfo {
    pub code_block: u8,
    pub frame_id: u8,
    pub can_id: u8,
    pub board_id: u8,
    pub version_hundredths: u16,
    pub buffer_size: u16,
    pub build_date: u32,
    pub version_string: String,
}

impl BmpInfo {
    pub fn from_packet(packet: &ScpPacket) -> Result<Self, ScpError> {
        let (arg1, arg2, arg3) = version_args(packet)?;
        Ok(Self {
            code_block: (arg1 >> 24) as u8,
            frame_id: ((arg1 >> 16) & 0xff) as u8,
            can_id: ((arg1 >> 8) & 0xff) as u8,
            board_id: (arg1 & 0xff) as u8,
            version_hundredths: (arg2 >> 16) as u16,
            buffer_size: (arg2 & 0xffff) as u16,
            build_date: arg3,
            version_string: version_string(&packet.data),
        })
    }

    pub fn version(&self) -> f32 {
        f32::from(self.version_hundredths) / 100.0
    }
}
