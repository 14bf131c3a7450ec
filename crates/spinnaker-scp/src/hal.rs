// crates/spinnaker-scp/src/hal.rs
use crate::command::ProtocolError;
use crate::engine::RequestSummary;
use crate::types::BoardCoord;
use alloc::string::String;
use core::fmt;

/// Defines a portable, descriptive Error type for the SCP stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScpError {
    /// A datagram is too short to contain the SDP header, command code and sequence number.
    MalformedPacket { length: usize },
    /// A value does not fit in the 3-bit SDP port field.
    InvalidPort(u8),
    /// A value does not fit in the 5-bit SDP CPU field.
    InvalidCpu(u8),
    /// More than three SCP arguments were requested.
    InvalidArgumentCount(u8),
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
    /// The remote end rejected the request with a registered (or unrecognised) return code.
    Response {
        error: ProtocolError,
        request: RequestSummary,
    },
    /// No reply arrived within the retry budget.
    Timeout {
        attempts: u32,
        request: RequestSummary,
    },
    /// The request was cancelled before it resolved.
    Cancelled,
    /// The connection was closed (explicitly or by a fatal transport error).
    ConnectionClosed(String),
    /// A fatal error reported by the underlying transport.
    Io(String),
    /// A freshly allocated sequence number is still in use by an outstanding request.
    SequenceCollision(u16),
    /// A read reply carried a different amount of data than was requested.
    UnexpectedResponseLength { expected: usize, actual: usize },
    /// No connection is known for the given board.
    UnknownBoard(BoardCoord),
    /// SC&MP could not satisfy an SDRAM allocation.
    SdramAllocationFailed { size: u32, x: u8, y: u8, tag: u8 },
}

impl fmt::Display for ScpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedPacket { length } => {
                write!(f, "Malformed SCP packet: {length} bytes is too short")
            }
            Self::InvalidPort(v) => write!(f, "Invalid SDP port value: {v} (must be 0-7)"),
            Self::InvalidCpu(v) => write!(f, "Invalid SDP CPU value: {v} (must be 0-31)"),
            Self::InvalidArgumentCount(n) => {
                write!(f, "Invalid SCP argument count: {n} (must be 0-3)")
            }
            Self::InvalidConfig(s) => write!(f, "Invalid configuration: {s}"),
            Self::Response { error, request } => {
                write!(f, "{error}: error in response to packet with arguments: {request}")
            }
            Self::Timeout { attempts, request } => write!(
                f,
                "No response after {attempts} attempts to transmit packet: {request}"
            ),
            Self::Cancelled => write!(f, "Request was cancelled"),
            Self::ConnectionClosed(reason) => write!(f, "Connection closed: {reason}"),
            Self::Io(s) => write!(f, "Transport I/O error: {s}"),
            Self::SequenceCollision(seq) => {
                write!(f, "Sequence number {seq} is already outstanding")
            }
            Self::UnexpectedResponseLength { expected, actual } => write!(
                f,
                "Unexpected response length: expected {expected} bytes, got {actual}"
            ),
            Self::UnknownBoard(coord) => write!(f, "No connection available to board {coord}"),
            Self::SdramAllocationFailed { size, x, y, tag } => write!(
                f,
                "Failed to allocate {size} bytes of SDRAM on chip ({x}, {y}) with tag {tag}"
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ScpError {}

/// Abstracts the connected datagram socket which carries SCP traffic,
/// keeping the engine itself platform-agnostic (no_std).
pub trait DatagramTransport {
    /// Sends one complete datagram (including the 2-byte SDP pad).
    ///
    /// Any error returned here is treated as fatal for the connection.
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), ScpError>;

    /// Waits up to `timeout_us` microseconds for a datagram and copies it into `buffer`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time or the platform reported a
    /// transient receive error. `Err` is reserved for fatal failures (socket closed,
    /// unrecoverable OS error) and closes the connection.
    fn receive_datagram(
        &mut self,
        buffer: &mut [u8],
        timeout_us: u64,
    ) -> Result<Option<usize>, ScpError>;
}

/// A monotonic time source, in microseconds.
pub trait Clock {
    fn now_us(&self) -> u64;
}

impl<T: DatagramTransport + ?Sized> DatagramTransport for &mut T {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), ScpError> {
        (**self).send_datagram(datagram)
    }

    fn receive_datagram(
        &mut self,
        buffer: &mut [u8],
        timeout_us: u64,
    ) -> Result<Option<usize>, ScpError> {
        (**self).receive_datagram(buffer, timeout_us)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}
