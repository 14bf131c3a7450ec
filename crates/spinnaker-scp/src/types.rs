// crates/spinnaker-scp/src/types.rs
use crate::hal::ScpError;
use core::fmt;

// --- Protocol Constants ---

/// UDP port on which SC&MP (and the BMP firmware) listens for SCP traffic.
pub const SCP_PORT: u16 = 17893;

/// The smallest power of two large enough to hold the largest packet the
/// SpiNNaker SDP implementation produces with its default buffers (256+8 bytes).
pub const SCP_RECEIVE_LENGTH: usize = 512;

/// Two reserved bytes which prefix every SDP packet carried over UDP.
pub const SDP_PAD_LENGTH: usize = 2;

/// Size of the logical SDP header (flags, tag, ports/CPUs, addresses).
pub const SDP_HEADER_LENGTH: usize = 8;

/// Command/response code (2 bytes) + sequence number (2 bytes).
pub const SCP_HEADER_LENGTH: usize = 4;

/// Size of one SCP argument word.
pub const SCP_ARG_LENGTH: usize = 4;

/// Smallest datagram which can be interpreted as an SCP response.
pub const SCP_MIN_DATAGRAM_LENGTH: usize = SDP_PAD_LENGTH + SDP_HEADER_LENGTH + SCP_HEADER_LENGTH;

/// Worst-case framing overhead around the SCP data field.
pub const SCP_MAX_OVERHEAD: usize = SCP_MIN_DATAGRAM_LENGTH + 3 * SCP_ARG_LENGTH;

/// Upper bound on the outstanding window. Kept far below the 16-bit sequence
/// space so that a wrapped sequence number always lands on a freed slot.
pub const MAX_WINDOW_SIZE: usize = 64;

/// Additional reply allowance (µs) for a BMP powering a board on (FPGAs must load).
pub const BMP_POWER_ON_TIMEOUT_US: u64 = 5_000_000;

/// IP tag 0xFF asks SC&MP to reply to the sender of the request.
pub const SCP_REPLY_TAG: u8 = 0xFF;

/// SDP source port used for packets originating from the host.
pub const HOST_SOURCE_PORT: u8 = 7;

/// SDP source "CPU" used for packets originating from the host (Ethernet).
pub const HOST_SOURCE_CPU: u8 = 31;

/// Highest value which fits in the 3-bit SDP port field.
pub const SDP_MAX_PORT: u8 = 0x07;

/// Highest value which fits in the 5-bit SDP CPU field.
pub const SDP_MAX_CPU: u8 = 0x1F;

/// Addresses a single core: chip (x, y) and processor `p`.
///
/// The processor number occupies the 5-bit CPU field of the SDP header, so
/// values above 31 cannot be expressed on the wire and are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CoreAddress {
    pub x: u8,
    pub y: u8,
    pub p: u8,
}

impl CoreAddress {
    /// Creates a `CoreAddress`, validating the processor number.
    pub fn new(x: u8, y: u8, p: u8) -> Result<Self, ScpError> {
        if p > SDP_MAX_CPU {
            return Err(ScpError::InvalidCpu(p));
        }
        Ok(Self { x, y, p })
    }

    /// Addresses the monitor processor (core 0) of chip (x, y).
    pub const fn chip(x: u8, y: u8) -> Self {
        Self { x, y, p: 0 }
    }
}

impl TryFrom<(u8, u8, u8)> for CoreAddress {
    type Error = ScpError;

    fn try_from((x, y, p): (u8, u8, u8)) -> Result<Self, Self::Error> {
        Self::new(x, y, p)
    }
}

impl fmt::Display for CoreAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.p)
    }
}

/// Coordinates of a board's management processor: (cabinet, frame, board).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BoardCoord {
    pub cabinet: u8,
    pub frame: u8,
    pub board: u8,
}

impl BoardCoord {
    pub const fn new(cabinet: u8, frame: u8, board: u8) -> Self {
        Self {
            cabinet,
            frame,
            board,
        }
    }
}

impl fmt::Display for BoardCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.cabinet, self.frame, self.board)
    }
}
