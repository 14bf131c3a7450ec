// crates/spinnaker-scp-udp/src/transport.rs
use log::{info, warn};
use spinnaker_scp::{DatagramTransport, ScpError};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// A connected UDP socket carrying SCP datagrams.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    nonblocking: bool,
}

fn io_error(e: io::Error) -> ScpError {
    ScpError::Io(e.to_string())
}

/// Errors after which the socket is still usable; the datagram is just lost.
fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
    )
}

impl UdpTransport {
    /// Binds an ephemeral local port and connects it to `host:port`.
    pub fn connect(host: &str, port: u16) -> Result<Self, ScpError> {
        let peer = (host, port)
            .to_socket_addrs()
            .map_err(io_error)?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| ScpError::Io(format!("No IPv4 address found for '{host}'")))?;
        let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(io_error)?;
        socket.connect(peer).map_err(io_error)?;
        info!(
            "SCP transport connected: {} -> {}",
            socket.local_addr().map_err(io_error)?,
            peer
        );
        Self::from_socket(socket)
    }

    /// Wraps an already connected socket.
    pub fn from_socket(socket: UdpSocket) -> Result<Self, ScpError> {
        let peer = socket.peer_addr().map_err(io_error)?;
        Ok(Self {
            socket,
            peer,
            nonblocking: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ScpError> {
        self.socket.local_addr().map_err(io_error)
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        if self.nonblocking != nonblocking {
            self.socket.set_nonblocking(nonblocking)?;
            self.nonblocking = nonblocking;
        }
        Ok(())
    }
}

impl DatagramTransport for UdpTransport {
    fn send_datagram(&mut self, datagram: &[u8]) -> Result<(), ScpError> {
        match self.socket.send(datagram) {
            Ok(_) => Ok(()),
            // An ICMP error from an earlier datagram; this one is simply lost.
            Err(e) if is_transient(e.kind()) => {
                warn!("Transient send error to {}: {}", self.peer, e);
                Ok(())
            }
            Err(e) => Err(io_error(e)),
        }
    }

    fn receive_datagram(
        &mut self,
        buffer: &mut [u8],
        timeout_us: u64,
    ) -> Result<Option<usize>, ScpError> {
        // A zero read timeout is rejected by the OS, so polling uses non-blocking mode.
        if timeout_us == 0 {
            self.set_nonblocking(true).map_err(io_error)?;
        } else {
            self.set_nonblocking(false).map_err(io_error)?;
            self.socket
                .set_read_timeout(Some(Duration::from_micros(timeout_us)))
                .map_err(io_error)?;
        }

        match self.socket.recv(buffer) {
            Ok(length) => Ok(Some(length)),
            Err(e) if is_transient(e.kind()) => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }
}
