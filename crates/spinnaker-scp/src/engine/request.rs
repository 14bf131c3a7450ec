// crates/spinnaker-scp/src/engine/request.rs
use crate::frame::{MAX_SCP_ARGS, SdpHeader, encode_request};
use crate::hal::ScpError;
use crate::logging::LogMetadata;
use crate::types::CoreAddress;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Opaque identifier of a submitted request, used to collect its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestHandle(pub(crate) u64);

impl RequestHandle {
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// A single SCP command waiting to be transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpRequest {
    pub target: CoreAddress,
    pub command: u16,
    pub arg1: Option<u32>,
    pub arg2: Option<u32>,
    pub arg3: Option<u32>,
    pub data: Vec<u8>,
    /// Number of argument words the reply is expected to carry (0-3).
    pub expected_args: u8,
    /// Extra reply allowance on top of the connection's base timeout.
    pub additional_timeout_us: u64,
}

impl ScpRequest {
    pub fn new(target: CoreAddress, command: impl Into<u16>) -> Self {
        Self {
            target,
            command: command.into(),
            arg1: None,
            arg2: None,
            arg3: None,
            data: Vec::new(),
            expected_args: 0,
            additional_timeout_us: 0,
        }
    }

    pub fn with_args(mut self, arg1: Option<u32>, arg2: Option<u32>, arg3: Option<u32>) -> Self {
        self.arg1 = arg1;
        self.arg2 = arg2;
        self.arg3 = arg3;
        self
    }

    pub fn with_arg1(mut self, arg1: u32) -> Self {
        self.arg1 = Some(arg1);
        self
    }

    pub fn with_arg2(mut self, arg2: u32) -> Self {
        self.arg2 = Some(arg2);
        self
    }

    pub fn with_arg3(mut self, arg3: u32) -> Self {
        self.arg3 = Some(arg3);
        self
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_expected_args(mut self, expected_args: u8) -> Self {
        self.expected_args = expected_args;
        self
    }

    pub fn with_additional_timeout_us(mut self, additional_timeout_us: u64) -> Self {
        self.additional_timeout_us = additional_timeout_us;
        self
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            x: self.target.x,
            y: self.target.y,
            p: self.target.p,
            cmd: self.command,
            arg1: self.arg1,
            arg2: self.arg2,
            arg3: self.arg3,
        }
    }

    /// Rejects requests the codec could not express unambiguously.
    pub fn validate(&self) -> Result<(), ScpError> {
        if self.expected_args > MAX_SCP_ARGS {
            return Err(ScpError::InvalidArgumentCount(self.expected_args));
        }
        if self.target.p > crate::types::SDP_MAX_CPU {
            return Err(ScpError::InvalidCpu(self.target.p));
        }
        // A gap would shift later arguments into an earlier slot.
        let gap = (self.arg1.is_none() && (self.arg2.is_some() || self.arg3.is_some()))
            || (self.arg2.is_none() && self.arg3.is_some());
        if gap {
            return Err(ScpError::InvalidArgumentCount(
                [self.arg1, self.arg2, self.arg3]
                    .iter()
                    .filter(|a| a.is_some())
                    .count() as u8,
            ));
        }
        Ok(())
    }

    pub(crate) fn encode(&self, seq: u16) -> Vec<u8> {
        encode_request(
            SdpHeader::for_request(self.target),
            self.command,
            seq,
            self.arg1,
            self.arg2,
            self.arg3,
            &self.data,
        )
    }
}

/// The coordinates, command and arguments of a request, as reported in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSummary {
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub cmd: u16,
    pub arg1: Option<u32>,
    pub arg2: Option<u32>,
    pub arg3: Option<u32>,
}

struct OptionalArg(Option<u32>);

impl fmt::Display for OptionalArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:#010x}"),
            None => write!(f, "None"),
        }
    }
}

impl fmt::Display for RequestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cmd_rc={}, arg1={}, arg2={}, arg3={}; sent to core ({}, {}, {})",
            self.cmd,
            OptionalArg(self.arg1),
            OptionalArg(self.arg2),
            OptionalArg(self.arg3),
            self.x,
            self.y,
            self.p
        )
    }
}

impl LogMetadata for RequestSummary {
    fn meta(&self) -> String {
        format!("core=({},{},{}), cmd={}", self.x, self.y, self.p, self.cmd)
    }
}
