// crates/spinnaker-scp/src/frame/scp.rs
use crate::frame::codec::{Codec, CodecHelpers};
use crate::frame::sdp::SdpHeader;
use crate::hal::ScpError;
use crate::types::{SCP_ARG_LENGTH, SCP_MIN_DATAGRAM_LENGTH, SDP_HEADER_LENGTH, SDP_PAD_LENGTH};
use alloc::vec;
use alloc::vec::Vec;

const CMD_RC_OFFSET: usize = SDP_PAD_LENGTH + SDP_HEADER_LENGTH;
const SEQ_OFFSET: usize = CMD_RC_OFFSET + 2;
const ARGS_OFFSET: usize = SEQ_OFFSET + 2;

/// Largest number of argument words an SCP packet may carry.
pub const MAX_SCP_ARGS: u8 = 3;

/// An SDP datagram carrying an SCP command or response.
///
/// The wire format has no argument count: present arguments are packed in
/// order directly after the sequence number and the receiver must know how
/// many to expect. Arguments should therefore be present as a prefix
/// (`arg1`, then `arg2`, then `arg3`); absent slots are simply not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpPacket {
    pub header: SdpHeader,
    pub cmd_rc: u16,
    pub seq: u16,
    pub arg1: Option<u32>,
    pub arg2: Option<u32>,
    pub arg3: Option<u32>,
    pub data: Vec<u8>,
}

impl ScpPacket {
    pub fn args(&self) -> [Option<u32>; 3] {
        [self.arg1, self.arg2, self.arg3]
    }

    /// Number of argument words present.
    pub fn n_args(&self) -> u8 {
        self.args().iter().filter(|a| a.is_some()).count() as u8
    }

    /// Total datagram length, including the two pad bytes.
    pub fn encoded_len(&self) -> usize {
        SCP_MIN_DATAGRAM_LENGTH + self.n_args() as usize * SCP_ARG_LENGTH + self.data.len()
    }

    /// Serializes the full datagram (pad, SDP header, SCP payload) into `buffer`.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, ScpError> {
        let total = self.encoded_len();
        if buffer.len() < total {
            return Err(ScpError::MalformedPacket {
                length: buffer.len(),
            });
        }
        buffer[..SDP_PAD_LENGTH].fill(0);
        self.header.serialize(&mut buffer[SDP_PAD_LENGTH..])?;
        CodecHelpers::write_u16_le(buffer, CMD_RC_OFFSET, self.cmd_rc);
        CodecHelpers::write_u16_le(buffer, SEQ_OFFSET, self.seq);

        let mut offset = ARGS_OFFSET;
        for arg in self.args().into_iter().flatten() {
            CodecHelpers::write_u32_le(buffer, offset, arg);
            offset += SCP_ARG_LENGTH;
        }
        buffer[offset..offset + self.data.len()].copy_from_slice(&self.data);
        Ok(offset + self.data.len())
    }

    /// Serializes the packet into a freshly allocated datagram.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; self.encoded_len()];
        // The buffer is sized by encoded_len so serialization cannot run short.
        let written = self.serialize(&mut buffer).unwrap_or(0);
        buffer.truncate(written);
        buffer
    }

    /// Decodes a datagram, reading up to `n_args` argument words.
    ///
    /// An argument is only decoded if the datagram still holds four bytes
    /// for it; otherwise it and every later argument are `None` and whatever
    /// remains is returned as data.
    pub fn decode(bytes: &[u8], n_args: u8) -> Result<Self, ScpError> {
        if n_args > MAX_SCP_ARGS {
            return Err(ScpError::InvalidArgumentCount(n_args));
        }
        if bytes.len() < SCP_MIN_DATAGRAM_LENGTH {
            return Err(ScpError::MalformedPacket {
                length: bytes.len(),
            });
        }
        let header = SdpHeader::deserialize(&bytes[SDP_PAD_LENGTH..])?;
        let cmd_rc = CodecHelpers::read_u16_le(bytes, CMD_RC_OFFSET);
        let seq = CodecHelpers::read_u16_le(bytes, SEQ_OFFSET);

        let mut args = [None; 3];
        let mut offset = ARGS_OFFSET;
        for slot in args.iter_mut().take(n_args as usize) {
            match CodecHelpers::try_read_u32_le(bytes, offset) {
                Some(value) => {
                    *slot = Some(value);
                    offset += SCP_ARG_LENGTH;
                }
                None => break,
            }
        }
        let [arg1, arg2, arg3] = args;

        Ok(Self {
            header,
            cmd_rc,
            seq,
            arg1,
            arg2,
            arg3,
            data: bytes[offset..].to_vec(),
        })
    }
}

/// Encodes an SCP request datagram.
#[allow(clippy::too_many_arguments)]
pub fn encode_request(
    header: SdpHeader,
    command: u16,
    seq: u16,
    arg1: Option<u32>,
    arg2: Option<u32>,
    arg3: Option<u32>,
    data: &[u8],
) -> Vec<u8> {
    ScpPacket {
        header,
        cmd_rc: command,
        seq,
        arg1,
        arg2,
        arg3,
        data: data.to_vec(),
    }
    .to_bytes()
}

/// Decodes an SCP response datagram (see [`ScpPacket::decode`]).
pub fn decode_response(bytes: &[u8], expected_args: u8) -> Result<ScpPacket, ScpError> {
    ScpPacket::decode(bytes, expected_args)
}

/// Extracts `(cmd_rc, seq)` without decoding the rest of the datagram.
pub fn peek_response(bytes: &[u8]) -> Result<(u16, u16), ScpError> {
    if bytes.len() < SCP_MIN_DATAGRAM_LENGTH {
        return Err(ScpError::MalformedPacket {
            length: bytes.len(),
        });
    }
    Ok((
        CodecHelpers::read_u16_le(bytes, CMD_RC_OFFSET),
        CodecHelpers::read_u16_le(bytes, SEQ_OFFSET),
    ))
}
