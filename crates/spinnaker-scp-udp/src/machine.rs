// crates/spinnaker-scp-udp/src/machine.rs
//! High-level control of a SpiNNaker machine over its Ethernet-attached chip.

use crate::clock::SystemClock;
use crate::config::MachineConfig;
use crate::transport::UdpTransport;
use log::info;
use spinnaker_scp::command::{AllocOperation, IpTagCommand, LedAction};
use spinnaker_scp::{
    Clock, CoreAddress, CoreInfo, DatagramTransport, ScpCommand, ScpConnection, ScpError,
    ScpPacket, ScpRequest,
};
use std::net::Ipv4Addr;

/// Application signals understood by SARK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AppSignal {
    Init = 0,
    PowerDown = 1,
    Stop = 2,
    Start = 3,
    Sync0 = 4,
    Sync1 = 5,
    Pause = 6,
    Cont = 7,
    Exit = 8,
    Timer = 9,
    Usr0 = 10,
    Usr1 = 11,
    Usr2 = 12,
    Usr3 = 13,
}

/// How SC&MP distributes a signal through the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SignalType {
    Multicast = 0,
    PeerToPeer = 1,
    NearestNeighbour = 2,
}

impl AppSignal {
    pub const fn signal_type(self) -> SignalType {
        match self {
            Self::Init | Self::PowerDown | Self::Start | Self::Stop | Self::Exit => {
                SignalType::NearestNeighbour
            }
            _ => SignalType::Multicast,
        }
    }
}

/// An IP tag entry as read back from a chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpTag {
    pub addr: Ipv4Addr,
    pub mac: [u8; 6],
    pub port: u16,
    pub timeout: u16,
    pub flags: u16,
    pub count: u32,
    pub rx_port: u16,
    pub spin_addr: u16,
    pub spin_port: u8,
}

const IPTAG_LENGTH: usize = 25;

impl IpTag {
    pub fn from_bytes(data: &[u8]) -> Result<Self, ScpError> {
        if data.len() < IPTAG_LENGTH {
            return Err(ScpError::UnexpectedResponseLength {
                expected: IPTAG_LENGTH,
                actual: data.len(),
            });
        }
        let u16_at = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[4..10]);
        Ok(Self {
            addr: Ipv4Addr::new(data[0], data[1], data[2], data[3]),
            mac,
            port: u16_at(10),
            timeout: u16_at(12),
            flags: u16_at(14),
            count: u32::from_le_bytes([data[16], data[17], data[18], data[19]]),
            rx_port: u16_at(20),
            spin_addr: u16_at(22),
            spin_port: data[24],
        })
    }
}

/// Builds the LED argument: two action bits per LED number.
pub(crate) fn led_bits(leds: &[u8], action: Option<bool>) -> Result<u32, ScpError> {
    let action = LedAction::from_state(action) as u32;
    leds.iter().try_fold(0u32, |bits, led| {
        action
            .checked_shl(u32::from(*led) * 2)
            .map(|b| bits | b)
            .ok_or(ScpError::InvalidConfig("LED number out of range"))
    })
}

/// Controls a machine through one SCP connection.
///
/// Chip-level commands are sent to the monitor processor (core 0) of the
/// addressed chip.
pub struct MachineController<T: DatagramTransport = UdpTransport, C: Clock = SystemClock> {
    connection: ScpConnection<T, C>,
}

impl MachineController {
    /// Opens a UDP connection as described by `config`.
    pub fn connect(config: &MachineConfig) -> Result<Self, ScpError> {
        let transport = UdpTransport::connect(&config.host, config.scp.port)?;
        let mut connection = ScpConnection::new(transport, SystemClock::new(), config.scp)?;
        if let Some(length) = config.scp_data_length {
            connection.set_scp_data_length(length);
        }
        info!("Connected to SpiNNaker machine at {}", config.host);
        Ok(Self::new(connection))
    }
}

impl<T: DatagramTransport, C: Clock> MachineController<T, C> {
    pub fn new(connection: ScpConnection<T, C>) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ScpConnection<T, C> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ScpConnection<T, C> {
        &mut self.connection
    }

    pub fn into_connection(self) -> ScpConnection<T, C> {
        self.connection
    }

    /// The maximum SCP data length, queried from chip (0, 0) on first use.
    pub fn scp_data_length(&mut self) -> Result<usize, ScpError> {
        self.connection.scp_data_length()
    }

    /// Sends a raw request and waits for its reply.
    pub fn send_scp(&mut self, request: ScpRequest) -> Result<ScpPacket, ScpError> {
        self.connection.send_scp(request)
    }

    pub fn get_software_version(&mut self, core: CoreAddress) -> Result<CoreInfo, ScpError> {
        self.connection.get_software_version(core)
    }

    pub fn read(&mut self, core: CoreAddress, address: u32, length: usize) -> Result<Vec<u8>, ScpError> {
        self.connection.read(core, address, length)
    }

    pub fn write(&mut self, core: CoreAddress, address: u32, data: &[u8]) -> Result<(), ScpError> {
        self.connection.write(core, address, data)
    }

    /// Sets (`Some(true)`), clears (`Some(false)`) or toggles (`None`) LEDs 0-3 of a chip.
    pub fn set_led(&mut self, chip: CoreAddress, leds: &[u8], action: Option<bool>) -> Result<(), ScpError> {
        let arg1 = led_bits(leds, action)?;
        self.connection.send_scp(ScpRequest::new(monitor(chip), ScpCommand::Led).with_arg1(arg1))?;
        Ok(())
    }

    /// Directs SDP packets with tag `iptag` to `addr:port`.
    pub fn iptag_set(&mut self, chip: CoreAddress, iptag: u8, addr: Ipv4Addr, port: u16) -> Result<(), ScpError> {
        let request = ScpRequest::new(monitor(chip), ScpCommand::Iptag)
            .with_arg1(((IpTagCommand::Set as u32) << 16) | u32::from(iptag))
            .with_arg2(u32::from(port))
            .with_arg3(u32::from_le_bytes(addr.octets()));
        self.connection.send_scp(request)?;
        Ok(())
    }

    pub fn iptag_get(&mut self, chip: CoreAddress, iptag: u8) -> Result<IpTag, ScpError> {
        let request = ScpRequest::new(monitor(chip), ScpCommand::Iptag)
            .with_arg1(((IpTagCommand::Get as u32) << 16) | u32::from(iptag))
            .with_arg2(1);
        let reply = self.connection.send_scp(request)?;
        IpTag::from_bytes(&reply.data)
    }

    pub fn iptag_clear(&mut self, chip: CoreAddress, iptag: u8) -> Result<(), ScpError> {
        let request = ScpRequest::new(monitor(chip), ScpCommand::Iptag)
            .with_arg1(((IpTagCommand::Clear as u32) << 16) | u32::from(iptag));
        self.connection.send_scp(request)?;
        Ok(())
    }

    /// Allocates `size` bytes of SDRAM on a chip for application `app_id`.
    ///
    /// A non-zero `tag` lets the application look the block up. Returns the
    /// start address of the block.
    pub fn sdram_alloc(&mut self, chip: CoreAddress, size: u32, tag: u8, app_id: u8) -> Result<u32, ScpError> {
        let request = ScpRequest::new(monitor(chip), ScpCommand::AllocFree)
            .with_arg1((u32::from(app_id) << 8) | AllocOperation::AllocSdram as u32)
            .with_arg2(size)
            .with_arg3(u32::from(tag))
            .with_expected_args(1);
        let reply = self.connection.send_scp(request)?;
        match reply.arg1 {
            Some(address) if address != 0 => Ok(address),
            _ => Err(ScpError::SdramAllocationFailed {
                size,
                x: chip.x,
                y: chip.y,
                tag,
            }),
        }
    }

    /// Frees a block previously returned by [`sdram_alloc`](Self::sdram_alloc).
    pub fn sdram_free(&mut self, chip: CoreAddress, ptr: u32) -> Result<(), ScpError> {
        let request = ScpRequest::new(monitor(chip), ScpCommand::AllocFree)
            .with_arg1(AllocOperation::FreeSdramByPtr as u32)
            .with_arg2(ptr);
        self.connection.send_scp(request)?;
        Ok(())
    }

    /// Sends `signal` to every core running application `app_id`.
    pub fn send_signal(&mut self, signal: AppSignal, app_id: u8) -> Result<(), ScpError> {
        info!("Sending signal {:?} to application {}", signal, app_id);
        let request = ScpRequest::new(CoreAddress::chip(0, 0), ScpCommand::Signal)
            .with_arg1(signal.signal_type() as u32)
            .with_arg2(((signal as u32) << 16) | 0xff00 | u32::from(app_id))
            // All chips.
            .with_arg3(0x0000_ffff);
        self.connection.send_scp(request)?;
        Ok(())
    }
}

fn monitor(chip: CoreAddress) -> CoreAddress {
    CoreAddress::chip(chip.x, chip.y)
}
