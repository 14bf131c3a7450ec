// crates/spinnaker-scp-udp/src/config.rs
//! JSON configuration of machine and BMP connections.

use serde::{Deserialize, Serialize};
use spinnaker_scp::types::SDP_MAX_CPU;
use spinnaker_scp::{BoardCoord, ScpConfig, ScpError};
use std::fmt;
use std::fs;
use std::path::Path;

/// Errors raised while loading a configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The file could not be read.
    Io(String),
    /// The contents were not valid JSON for the configuration.
    Parse(String),
    /// The configuration parsed but holds unusable values.
    Invalid(ScpError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Failed to read configuration: {e}"),
            Self::Parse(e) => write!(f, "Failed to parse configuration: {e}"),
            Self::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Network address of a board management processor.
///
/// Without a `board` the address serves every board in the frame that has
/// no address of its own (the BMP relays over the backplane CAN bus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BmpEndpoint {
    pub host: String,
    pub cabinet: u8,
    pub frame: u8,
    #[serde(default)]
    pub board: Option<u8>,
}

impl BmpEndpoint {
    /// The coordinate used when talking to this BMP itself.
    pub fn coord(&self) -> BoardCoord {
        BoardCoord::new(self.cabinet, self.frame, self.board.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Hostname or IP address of the Ethernet-attached chip (0, 0).
    pub host: String,
    #[serde(default)]
    pub scp: ScpConfig,
    /// Known SCP data length; queried from the machine when absent.
    #[serde(default)]
    pub scp_data_length: Option<usize>,
    #[serde(default)]
    pub bmps: Vec<BmpEndpoint>,
}

impl MachineConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            scp: ScpConfig::default(),
            scp_data_length: None,
            bmps: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Loading machine configuration from {}", path.display());
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scp.validate().map_err(ConfigError::Invalid)?;
        if self.scp_data_length == Some(0) {
            return Err(ConfigError::Invalid(ScpError::InvalidConfig(
                "SCP data length must be non-zero",
            )));
        }
        for bmp in &self.bmps {
            // BMPs are addressed as core `board` of chip (0, 0).
            if let Some(board) = bmp.board.filter(|b| *b > SDP_MAX_CPU) {
                return Err(ConfigError::Invalid(ScpError::InvalidCpu(board)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = MachineConfig::from_json(r#"{ "host": "spinn-4" }"#).unwrap();
        assert_eq!(config, MachineConfig::new("spinn-4"));
        assert_eq!(config.scp.port, 17893);
    }

    #[test]
    fn test_partial_scp_section() {
        let config = MachineConfig::from_json(
            r#"{
                "host": "192.168.240.253",
                "scp": { "window_size": 8, "timeout_us": 250000 },
                "bmps": [
                    { "host": "192.168.240.0", "cabinet": 0, "frame": 0 },
                    { "host": "192.168.240.3", "cabinet": 0, "frame": 0, "board": 3 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.scp.window_size, 8);
        assert_eq!(config.scp.timeout_us, 250_000);
        assert_eq!(config.scp.n_tries, 5);
        assert_eq!(config.bmps.len(), 2);
        assert_eq!(config.bmps[0].board, None);
        assert_eq!(config.bmps[1].coord(), BoardCoord::new(0, 0, 3));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = MachineConfig::from_json(r#"{ "host": "h", "scp": { "n_tries": 0 } }"#);
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
        let err = MachineConfig::from_json(r#"{ "host": 5 }"#);
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = MachineConfig::new("localhost");
        config.scp_data_length = Some(256);
        let json = config.to_json().unwrap();
        assert_eq!(MachineConfig::from_json(&json).unwrap(), config);
    }
}
