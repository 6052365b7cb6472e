//! UDP frame transport for drone command links.
//!
//! skylink carries the command-and-control traffic between a controller
//! application and a drone: small frames with a 7-byte header, batched
//! into UDP datagrams, multiplexed over numbered channels.
//!
//! # Crate Structure
//!
//! - [`frame`] — Wire codec and the channel-id catalog
//! - [`transport`] — UDP socket, event loop glue, and the link object

/// Re-export frame types.
pub mod frame {
    pub use skylink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use skylink_transport::*;
}
