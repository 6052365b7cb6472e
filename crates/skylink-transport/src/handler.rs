use std::os::fd::RawFd;

use skylink_frame::FrameHeader;

use crate::sock::SocketKind;

/// Binary link-health flag owned by the upper transport layer.
///
/// This core only reads it to decide whether an I/O error is worth
/// logging, and flips it `Ok` → `Ko` on the first fatal error. Recovery
/// (KO → OK) is the upper layer's call, typically on a PONG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Ok,
    Ko,
}

/// Direction of a frame passing through the tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// Upcalls from the transport into its parent.
///
/// All calls happen on the event loop's thread. Payload slices borrow the
/// socket's RX buffer (or the caller's send buffers) and are only valid
/// for the duration of the call; retain by copying.
pub trait LinkHandler {
    /// One decoded frame, in wire order within its datagram.
    fn recv_frame(&mut self, header: &FrameHeader, payload: &[u8]);

    /// Current link status, owned by the upper layer.
    fn link_status(&self) -> LinkStatus;

    /// Link status transition requested by the transport (OK → KO only).
    fn set_link_status(&mut self, status: LinkStatus);

    /// Frame tap for command logging. Default: no tap.
    fn log_frame(&mut self, _header: &FrameHeader, _payload: &[u8], _dir: Direction) {}

    /// Fired once the data socket is bound, so observers can hook the
    /// descriptor (e.g. packet capture). Default: ignored.
    fn socket_created(&mut self, _fd: RawFd, _kind: SocketKind) {}
}
