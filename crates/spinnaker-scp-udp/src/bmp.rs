// crates/spinnaker-scp-udp/src/bmp.rs
//! Control of the Board Management Processors of a machine.
//!
//! A BMP is addressed as core `board` of chip (0, 0) on its own SCP
//! connection. Frames usually have one BMP speaking for every board in the
//! frame; a board-specific connection takes precedence when one is known.

use crate::clock::SystemClock;
use crate::config::BmpEndpoint;
use crate::machine::led_bits;
use crate::transport::UdpTransport;
use log::{debug, info};
use spinnaker_scp::types::BMP_POWER_ON_TIMEOUT_US;
use spinnaker_scp::{
    BmpInfo, BoardCoord, Clock, CoreAddress, DatagramTransport, ScpCommand, ScpConfig,
    ScpConnection, ScpError, ScpPacket, ScpRequest,
};
use std::collections::BTreeMap;
use std::time::Duration;

type BmpKey = (u8, u8, Option<u8>);

pub struct BmpController<T: DatagramTransport = UdpTransport, C: Clock = SystemClock> {
    connections: BTreeMap<BmpKey, ScpConnection<T, C>>,
}

impl BmpController {
    /// Opens one UDP connection per endpoint.
    pub fn connect(endpoints: &[BmpEndpoint], config: ScpConfig) -> Result<Self, ScpError> {
        let mut controller = Self::new();
        for endpoint in endpoints {
            let transport = UdpTransport::connect(&endpoint.host, config.port)?;
            let connection = ScpConnection::new(transport, SystemClock::new(), config)?;
            match endpoint.board {
                Some(board) => controller.add_board(endpoint.cabinet, endpoint.frame, board, connection),
                None => controller.add_frame(endpoint.cabinet, endpoint.frame, connection),
            }
            info!("Connected to BMP {} at {}", endpoint.coord(), endpoint.host);
        }
        Ok(controller)
    }
}

impl<T: DatagramTransport, C: Clock> Default for BmpController<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DatagramTransport, C: Clock> BmpController<T, C> {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
        }
    }

    /// Registers the BMP speaking for a whole frame.
    pub fn add_frame(&mut self, cabinet: u8, frame: u8, connection: ScpConnection<T, C>) {
        self.connections.insert((cabinet, frame, None), connection);
    }

    /// Registers the BMP of a single board.
    pub fn add_board(&mut self, cabinet: u8, frame: u8, board: u8, connection: ScpConnection<T, C>) {
        self.connections.insert((cabinet, frame, Some(board)), connection);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn connection_for(&mut self, coord: BoardCoord) -> Result<&mut ScpConnection<T, C>, ScpError> {
        let BoardCoord { cabinet, frame, board } = coord;
        let key = if self.connections.contains_key(&(cabinet, frame, Some(board))) {
            (cabinet, frame, Some(board))
        } else {
            (cabinet, frame, None)
        };
        self.connections
            .get_mut(&key)
            .ok_or(ScpError::UnknownBoard(coord))
    }

    /// Sends `request` to the BMP of `coord`, overriding its target.
    pub fn send_scp(&mut self, coord: BoardCoord, mut request: ScpRequest) -> Result<ScpPacket, ScpError> {
        request.target = CoreAddress {
            x: 0,
            y: 0,
            p: coord.board,
        };
        debug!("Sending command {} to BMP {}", request.command, coord);
        self.connection_for(coord)?.send_scp(request)
    }

    pub fn get_software_version(&mut self, coord: BoardCoord) -> Result<BmpInfo, ScpError> {
        let request = ScpRequest::new(CoreAddress::chip(0, 0), ScpCommand::Sver).with_expected_args(3);
        let reply = self.send_scp(coord, request)?;
        BmpInfo::from_packet(&reply)
    }

    /// Switches the power of `boards` in one frame on or off.
    ///
    /// The command goes to the BMP of the first board in `boards`.
    /// `delay` is applied by the BMP between successive boards. Powering on
    /// waits for the boards to boot before replying, so the request gets a
    /// longer timeout.
    pub fn set_power(
        &mut self,
        cabinet: u8,
        frame: u8,
        boards: &[u8],
        state: bool,
        delay: Duration,
    ) -> Result<(), ScpError> {
        let mask = board_mask(boards)?;
        let delay_ms = u32::try_from(delay.as_millis())
            .ok()
            .filter(|ms| *ms <= u32::from(u16::MAX))
            .ok_or(ScpError::InvalidConfig("power delay too long"))?;
        let mut request = ScpRequest::new(CoreAddress::chip(0, 0), ScpCommand::Power)
            .with_arg1((delay_ms << 16) | u32::from(state))
            .with_arg2(mask);
        if state {
            request = request.with_additional_timeout_us(BMP_POWER_ON_TIMEOUT_US);
        }
        info!(
            "Powering {} boards {:?} in cabinet {}, frame {}",
            if state { "on" } else { "off" },
            boards,
            cabinet,
            frame
        );
        self.send_scp(BoardCoord::new(cabinet, frame, boards[0]), request)?;
        Ok(())
    }

    /// Sets, clears or toggles front-panel LEDs of `boards` in one frame,
    /// through the BMP of the first board.
    pub fn set_led(
        &mut self,
        cabinet: u8,
        frame: u8,
        boards: &[u8],
        leds: &[u8],
        action: Option<bool>,
    ) -> Result<(), ScpError> {
        let request = ScpRequest::new(CoreAddress::chip(0, 0), ScpCommand::Led)
            .with_arg1(led_bits(leds, action)?)
            .with_arg2(board_mask(boards)?);
        self.send_scp(BoardCoord::new(cabinet, frame, boards[0]), request)?;
        Ok(())
    }
}

fn board_mask(boards: &[u8]) -> Result<u32, ScpError> {
    if boards.is_empty() {
        return Err(ScpError::InvalidConfig("no boards given"));
    }
    boards.iter().try_fold(0u32, |mask, board| {
        1u32.checked_shl(u32::from(*board))
            .map(|bit| mask | bit)
            .ok_or(ScpError::InvalidConfig("board number out of range"))
    })
}
