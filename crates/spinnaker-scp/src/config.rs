// crates/spinnaker-scp/src/config.rs
use crate::hal::ScpError;
use crate::types::{MAX_WINDOW_SIZE, SCP_MIN_DATAGRAM_LENGTH, SCP_PORT, SCP_RECEIVE_LENGTH};

/// Tunables of a single SCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScpConfig {
    /// Remote UDP port.
    pub port: u16,
    /// Base reply timeout per attempt, in microseconds.
    pub timeout_us: u64,
    /// Total transmission attempts per request before it times out.
    pub n_tries: u32,
    /// Maximum number of requests in flight at once.
    pub window_size: usize,
    /// Initial receive buffer size in bytes.
    pub receive_length: usize,
}

impl Default for ScpConfig {
    fn default() -> Self {
        Self {
            port: SCP_PORT,
            timeout_us: 500_000,
            n_tries: 5,
            window_size: 1,
            receive_length: SCP_RECEIVE_LENGTH,
        }
    }
}

impl ScpConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout_us(mut self, timeout_us: u64) -> Self {
        self.timeout_us = timeout_us;
        self
    }

    pub fn with_n_tries(mut self, n_tries: u32) -> Self {
        self.n_tries = n_tries;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_receive_length(mut self, receive_length: usize) -> Self {
        self.receive_length = receive_length;
        self
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ScpError> {
        if self.n_tries == 0 {
            return Err(ScpError::InvalidConfig("n_tries must be at least 1"));
        }
        if self.timeout_us == 0 {
            return Err(ScpError::InvalidConfig("timeout must be non-zero"));
        }
        if self.window_size == 0 {
            return Err(ScpError::InvalidConfig("window size must be at least 1"));
        }
        if self.window_size > MAX_WINDOW_SIZE {
            return Err(ScpError::InvalidConfig("window size exceeds the maximum of 64"));
        }
        if self.receive_length < SCP_MIN_DATAGRAM_LENGTH {
            return Err(ScpError::InvalidConfig(
                "receive length cannot hold an SCP header",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScpConfig::default();
        assert_eq!(config.port, 17893);
        assert_eq!(config.n_tries, 5);
        assert_eq!(config.window_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = ScpConfig::default();
        assert!(base.with_n_tries(0).validate().is_err());
        assert!(base.with_timeout_us(0).validate().is_err());
        assert!(base.with_window_size(0).validate().is_err());
        assert!(base.with_window_size(65).validate().is_err());
        assert!(base.with_window_size(64).validate().is_ok());
        assert!(base.with_receive_length(8).validate().is_err());
    }
}
