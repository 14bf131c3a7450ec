// crates/spinnaker-scp-udp/src/lib.rs
//! UDP transport and blocking controllers for `spinnaker-scp`.

pub mod bmp;
pub mod clock;
pub mod config;
pub mod machine;
pub mod transport;
pub mod worker;

pub use bmp::BmpController;
pub use clock::SystemClock;
pub use config::{BmpEndpoint, ConfigError, MachineConfig};
pub use machine::{AppSignal, IpTag, MachineController, SignalType};
pub use transport::UdpTransport;
pub use worker::ScpWorker;

use spinnaker_scp::{ScpConfig, ScpConnection, ScpError};

/// An SCP connection over a real UDP socket.
pub type UdpConnection = ScpConnection<UdpTransport, SystemClock>;

/// Opens an SCP connection to `host` using the port in `config`.
pub fn connect(host: &str, config: ScpConfig) -> Result<UdpConnection, ScpError> {
    let transport = UdpTransport::connect(host, config.port)?;
    ScpConnection::new(transport, SystemClock::new(), config)
}
