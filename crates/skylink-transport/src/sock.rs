use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::sys;

/// Kernel send/receive buffer size requested for the data socket.
pub const SOCKET_BUFFER_LEN: usize = 64 * 1024;

// DSCP classes written into IP_TOS when QoS mode is on. Hardcoded because
// the CS constants are not exposed on every platform's headers.
const DSCP_CS6: u32 = 0xc0;
const DSCP_CS4: u32 = 0x80;

/// Socket role, selecting the DSCP traffic class in QoS mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Command,
    Video,
}

/// Non-blocking UDP socket with an owned RX buffer.
///
/// Created bound: binding happens at construction so that port allocation
/// failures surface early. When the requested RX port is taken, falls back
/// once to dynamic allocation and records the effective port.
pub struct DataSocket {
    sock: Socket,
    kind: SocketKind,
    rx_port: u16,
    rx_buf: Vec<u8>,
    rx_enabled: bool,
    tx_enabled: bool,
}

impl DataSocket {
    pub fn open(rx_port: u16, rx_enabled: bool, tx_enabled: bool, kind: SocketKind) -> Result<Self> {
        // CLOEXEC is set by socket2 at creation.
        let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        sock.set_nonblocking(true)?;

        let mut bound_port = 0u16;
        let mut rx_buf = Vec::new();

        if rx_enabled {
            let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, rx_port);
            if let Err(err) = sock.bind(&addr.into()) {
                if err.kind() == io::ErrorKind::AddrInUse && rx_port != 0 {
                    let fallback = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
                    sock.bind(&fallback.into())
                        .map_err(|source| TransportError::Bind { port: 0, source })?;
                } else {
                    return Err(TransportError::Bind {
                        port: rx_port,
                        source: err,
                    });
                }
            }

            // Read the address back: the port may have been dynamically
            // allocated, either on request (0) or on the fallback path.
            bound_port = sock
                .local_addr()?
                .as_socket()
                .map(|a| a.port())
                .unwrap_or(0);
            if bound_port != rx_port {
                info!(
                    fd = sock.as_raw_fd(),
                    requested = rx_port,
                    bound = bound_port,
                    "using dynamic udp port"
                );
            }

            sock.set_recv_buffer_size(SOCKET_BUFFER_LEN)?;
            let usable = sys::recv_buffer_size(sock.as_raw_fd())?;
            rx_buf = vec![0u8; usable];
        }

        if tx_enabled {
            sock.set_send_buffer_size(SOCKET_BUFFER_LEN)?;
        }

        debug!(fd = sock.as_raw_fd(), ?kind, rx_port = bound_port, "udp socket ready");
        Ok(Self {
            sock,
            kind,
            rx_port: bound_port,
            rx_buf,
            rx_enabled,
            tx_enabled,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Effective RX port after binding (non-zero once bound).
    pub fn rx_port(&self) -> u16 {
        self.rx_port
    }

    pub fn rx_enabled(&self) -> bool {
        self.rx_enabled
    }

    pub fn tx_enabled(&self) -> bool {
        self.tx_enabled
    }

    /// Capacity of the owned RX buffer (the usable kernel buffer size).
    pub fn rx_buf_len(&self) -> usize {
        self.rx_buf.len()
    }

    /// Read one datagram into the owned RX buffer.
    pub fn recv(&mut self) -> io::Result<usize> {
        let fd = self.sock.as_raw_fd();
        sys::recv(fd, &mut self.rx_buf)
    }

    /// The first `len` bytes of the RX buffer, as filled by [`recv`].
    ///
    /// [`recv`]: DataSocket::recv
    pub fn rx_bytes(&self, len: usize) -> &[u8] {
        &self.rx_buf[..len]
    }

    /// Apply the DSCP traffic class for this socket's role.
    pub fn apply_qos(&self) -> io::Result<()> {
        let tos = match self.kind {
            SocketKind::Command => DSCP_CS6,
            SocketKind::Video => DSCP_CS4,
        };
        self.sock.set_tos(tos)
    }
}
