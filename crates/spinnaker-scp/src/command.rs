// crates/spinnaker-scp/src/command.rs
//! Static command table: SCP opcodes, transfer-size selectors, sub-command
//! selectors and the classification of response codes.

use core::fmt;

/// SCP command codes understood by SC&MP and the BMP firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ScpCommand {
    /// Get the software version.
    Sver = 0,
    /// Read memory.
    Read = 2,
    /// Write memory.
    Write = 3,
    /// Read a neighbouring chip's memory over a link.
    LinkRead = 17,
    /// Write a neighbouring chip's memory over a link.
    LinkWrite = 18,
    /// Send a nearest-neighbour packet (flood-fill control).
    NearestNeighbourPacket = 20,
    /// Send a signal to the cores of an application.
    Signal = 22,
    /// Flood-fill data block.
    FloodFillData = 23,
    /// Change the state of LEDs.
    Led = 25,
    /// Set, get or clear an IP tag.
    Iptag = 26,
    /// Allocate or free SDRAM and routing table entries.
    AllocFree = 28,
    /// Routing table manipulation.
    Router = 29,
    /// Chip information.
    Info = 31,
    /// BMP-specific information.
    BmpInfo = 48,
    /// BMP board power control.
    Power = 57,
}

impl From<ScpCommand> for u16 {
    fn from(cmd: ScpCommand) -> Self {
        cmd as u16
    }
}

impl TryFrom<u16> for ScpCommand {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Sver),
            2 => Ok(Self::Read),
            3 => Ok(Self::Write),
            17 => Ok(Self::LinkRead),
            18 => Ok(Self::LinkWrite),
            20 => Ok(Self::NearestNeighbourPacket),
            22 => Ok(Self::Signal),
            23 => Ok(Self::FloodFillData),
            25 => Ok(Self::Led),
            26 => Ok(Self::Iptag),
            28 => Ok(Self::AllocFree),
            29 => Ok(Self::Router),
            31 => Ok(Self::Info),
            48 => Ok(Self::BmpInfo),
            57 => Ok(Self::Power),
            other => Err(other),
        }
    }
}

/// Size of the individual accesses the remote end performs for a read/write.
///
/// This only affects execution speed at the remote end; the amount of data on
/// the wire is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataType {
    Byte = 0,
    Short = 1,
    Word = 2,
}

impl DataType {
    /// Selects the widest access usable for a transfer of `length` bytes at `address`.
    ///
    /// Word accesses need a word-aligned address and a length multiple of 4,
    /// half-word accesses need both to be even, everything else is done bytewise.
    pub const fn for_transfer(address: u32, length: usize) -> Self {
        let address_mod = address % 4;
        let length_mod = length % 4;
        if address_mod == 0 && length_mod == 0 {
            DataType::Word
        } else if address_mod % 2 == 0 && length_mod % 2 == 0 {
            DataType::Short
        } else {
            DataType::Byte
        }
    }
}

impl From<DataType> for u32 {
    fn from(dtype: DataType) -> Self {
        dtype as u32
    }
}

/// Action applied to an LED by the `Led` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LedAction {
    Toggle = 1,
    Off = 2,
    On = 3,
}

impl LedAction {
    /// Maps `Some(true)` to on, `Some(false)` to off and `None` to toggle.
    pub const fn from_state(state: Option<bool>) -> Self {
        match state {
            Some(true) => LedAction::On,
            Some(false) => LedAction::Off,
            None => LedAction::Toggle,
        }
    }
}

/// Sub-commands of the `Iptag` command (placed in the top half of arg1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IpTagCommand {
    Set = 1,
    Get = 2,
    Clear = 3,
}

/// Operations of the `AllocFree` command (placed in the low byte of arg1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AllocOperation {
    /// Allocate a region of SDRAM.
    AllocSdram = 0,
    /// Free a region of SDRAM by pointer.
    FreeSdramByPtr = 1,
    /// Free a region of SDRAM by tag and app ID.
    FreeSdramByTag = 2,
    /// Allocate a block of routing table entries.
    AllocRtr = 3,
    /// Free routing table entries by index.
    FreeRtrByPos = 4,
    /// Free routing table entries by app ID.
    FreeRtrByApp = 5,
}

/// Return codes used by SC&MP in the cmd_rc field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ReturnCode {
    Ok = 0x80,
    Len = 0x81,
    Sum = 0x82,
    Cmd = 0x83,
    Arg = 0x84,
    Port = 0x85,
    Timeout = 0x86,
    Route = 0x87,
    Cpu = 0x88,
    Dead = 0x89,
    Buf = 0x8A,
    P2pNoReply = 0x8B,
    P2pReject = 0x8C,
    P2pBusy = 0x8D,
    P2pTimeout = 0x8E,
    PktTx = 0x8F,
}

impl ReturnCode {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x80 => Self::Ok,
            0x81 => Self::Len,
            0x82 => Self::Sum,
            0x83 => Self::Cmd,
            0x84 => Self::Arg,
            0x85 => Self::Port,
            0x86 => Self::Timeout,
            0x87 => Self::Route,
            0x88 => Self::Cpu,
            0x89 => Self::Dead,
            0x8A => Self::Buf,
            0x8B => Self::P2pNoReply,
            0x8C => Self::P2pReject,
            0x8D => Self::P2pBusy,
            0x8E => Self::P2pTimeout,
            0x8F => Self::PktTx,
            _ => return None,
        })
    }

    /// Human readable description, as used by SC&MP's own tooling.
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "Command completed successfully",
            Self::Len => "Bad packet length",
            Self::Sum => "Bad checksum",
            Self::Cmd => "Bad/invalid command",
            Self::Arg => "Invalid arguments",
            Self::Port => "Bad port number",
            Self::Timeout => "Timeout waiting for the command to complete",
            Self::Route => "No route to the requested core",
            Self::Cpu => "Bad CPU number",
            Self::Dead => "SHM destination dead",
            Self::Buf => "No free shared memory buffers",
            Self::P2pNoReply => "No reply to open",
            Self::P2pReject => "Open rejected",
            Self::P2pBusy => "Destination busy",
            Self::P2pTimeout => "Dest did not respond",
            Self::PktTx => "Pkt transmission failed",
        }
    }
}

/// The typed failure reported when a reply carries a non-OK return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// 0x81: the packet length was wrong for the command.
    BadPacketLength,
    /// 0x83: the command code was not recognised.
    InvalidCommand,
    /// 0x84: one of the arguments was invalid.
    InvalidArguments,
    /// 0x87: there is no route to the requested core.
    NoRoute,
    /// Any other non-OK return code.
    Unrecognised(u16),
}

impl ProtocolError {
    /// The cmd_rc value this error was raised for.
    pub const fn code(self) -> u16 {
        match self {
            Self::BadPacketLength => ReturnCode::Len as u16,
            Self::InvalidCommand => ReturnCode::Cmd as u16,
            Self::InvalidArguments => ReturnCode::Arg as u16,
            Self::NoRoute => ReturnCode::Route as u16,
            Self::Unrecognised(code) => code,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPacketLength => write!(f, "RC_LEN: Bad packet length"),
            Self::InvalidCommand => write!(f, "RC_CMD: Bad/invalid command"),
            Self::InvalidArguments => write!(f, "RC_ARG: Invalid arguments"),
            Self::NoRoute => write!(f, "RC_ROUTE: No route to the requested core"),
            Self::Unrecognised(code) => match ReturnCode::from_code(*code) {
                Some(rc) => write!(f, "Unrecognised return code {code:#04X} ({})", rc.description()),
                None => write!(f, "Unrecognised return code {code:#04X}"),
            },
        }
    }
}

/// Classifies a reply's cmd_rc field.
///
/// Returns `None` for `RC_OK` and a `ProtocolError` for every other value.
pub const fn classify(code: u16) -> Option<ProtocolError> {
    match code {
        0x80 => None,
        0x81 => Some(ProtocolError::BadPacketLength),
        0x83 => Some(ProtocolError::InvalidCommand),
        0x84 => Some(ProtocolError::InvalidArguments),
        0x87 => Some(ProtocolError::NoRoute),
        other => Some(ProtocolError::Unrecognised(other)),
    }
}
