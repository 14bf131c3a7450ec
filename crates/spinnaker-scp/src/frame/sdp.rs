// crates/spinnaker-scp/src/frame/sdp.rs
use crate::frame::codec::Codec;
use crate::hal::ScpError;
use crate::types::{
    CoreAddress, HOST_SOURCE_CPU, HOST_SOURCE_PORT, SCP_REPLY_TAG, SDP_HEADER_LENGTH, SDP_MAX_CPU,
    SDP_MAX_PORT,
};

const FLAG_REPLY_EXPECTED: u8 = 0x87;
const FLAG_NO_REPLY: u8 = 0x07;

/// The 8-byte logical SDP header.
///
/// Port fields are 3 bits wide and CPU fields 5 bits wide on the wire; the
/// validating constructor rejects values that would not survive the packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpHeader {
    pub reply_expected: bool,
    pub tag: u8,
    pub dest_port: u8,
    pub dest_cpu: u8,
    pub src_port: u8,
    pub src_cpu: u8,
    pub dest_x: u8,
    pub dest_y: u8,
    pub src_x: u8,
    pub src_y: u8,
}

impl SdpHeader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reply_expected: bool,
        tag: u8,
        dest_port: u8,
        dest_cpu: u8,
        src_port: u8,
        src_cpu: u8,
        dest: (u8, u8),
        src: (u8, u8),
    ) -> Result<Self, ScpError> {
        for port in [dest_port, src_port] {
            if port > SDP_MAX_PORT {
                return Err(ScpError::InvalidPort(port));
            }
        }
        for cpu in [dest_cpu, src_cpu] {
            if cpu > SDP_MAX_CPU {
                return Err(ScpError::InvalidCpu(cpu));
            }
        }
        Ok(Self {
            reply_expected,
            tag,
            dest_port,
            dest_cpu,
            src_port,
            src_cpu,
            dest_x: dest.0,
            dest_y: dest.1,
            src_x: src.0,
            src_y: src.1,
        })
    }

    /// Header of a host-originated request to port 0 (SC&MP) of `target`.
    ///
    /// Replies go back to the sender (tag 0xFF) from source port 7, CPU 31, chip (0, 0).
    pub const fn for_request(target: CoreAddress) -> Self {
        Self {
            reply_expected: true,
            tag: SCP_REPLY_TAG,
            dest_port: 0,
            dest_cpu: target.p,
            src_port: HOST_SOURCE_PORT,
            src_cpu: HOST_SOURCE_CPU,
            dest_x: target.x,
            dest_y: target.y,
            src_x: 0,
            src_y: 0,
        }
    }

    pub const fn destination(&self) -> CoreAddress {
        CoreAddress {
            x: self.dest_x,
            y: self.dest_y,
            p: self.dest_cpu,
        }
    }
}

impl Codec for SdpHeader {
    fn encoded_len(&self) -> usize {
        SDP_HEADER_LENGTH
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, ScpError> {
        if buffer.len() < SDP_HEADER_LENGTH {
            return Err(ScpError::MalformedPacket {
                length: buffer.len(),
            });
        }
        buffer[0] = if self.reply_expected {
            FLAG_REPLY_EXPECTED
        } else {
            FLAG_NO_REPLY
        };
        buffer[1] = self.tag;
        buffer[2] = ((self.dest_port & SDP_MAX_PORT) << 5) | (self.dest_cpu & SDP_MAX_CPU);
        buffer[3] = ((self.src_port & SDP_MAX_PORT) << 5) | (self.src_cpu & SDP_MAX_CPU);
        buffer[4] = self.dest_y;
        buffer[5] = self.dest_x;
        buffer[6] = self.src_y;
        buffer[7] = self.src_x;
        Ok(SDP_HEADER_LENGTH)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, ScpError> {
        if buffer.len() < SDP_HEADER_LENGTH {
            return Err(ScpError::MalformedPacket {
                length: buffer.len(),
            });
        }
        Ok(Self {
            reply_expected: buffer[0] == FLAG_REPLY_EXPECTED,
            tag: buffer[1],
            dest_port: buffer[2] >> 5,
            dest_cpu: buffer[2] & SDP_MAX_CPU,
            src_port: buffer[3] >> 5,
            src_cpu: buffer[3] & SDP_MAX_CPU,
            dest_y: buffer[4],
            dest_x: buffer[5],
            src_y: buffer[6],
            src_x: buffer[7],
        })
    }
}
