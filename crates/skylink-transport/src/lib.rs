//! UDP datagram transport for the skylink command link.
//!
//! This is the wire-level substrate under the protocol engine. It binds a
//! UDP endpoint, multiplexes send/receive through a cooperative event loop,
//! parses concatenated frames out of each datagram and pushes them up
//! through the [`LinkHandler`] callbacks.
//!
//! The layer is deliberately thin: link health decisions (PING/PONG timing,
//! retransmission, routing) belong to the upper transport object. This core
//! only reads and writes frames and flips the link status OK→KO on fatal
//! socket errors.
//!
//! Everything runs single-threaded on the loop's thread; nothing here is
//! internally synchronized.

pub mod error;

#[cfg(unix)]
pub mod evloop;
#[cfg(unix)]
pub mod handler;
#[cfg(unix)]
pub mod net;
#[cfg(unix)]
pub mod sock;
#[cfg(unix)]
mod sys;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use evloop::{EventLoop, PollLoop};
#[cfg(unix)]
pub use handler::{Direction, LinkHandler, LinkStatus};
#[cfg(unix)]
pub use net::{LinkCfg, UdpLink, PING_PERIOD};
#[cfg(unix)]
pub use sock::SocketKind;
