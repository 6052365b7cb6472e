//! Wire format of the skylink command link.
//!
//! Every frame on the link is a fixed 7-byte header followed by its payload:
//! - 1 byte frame type
//! - 1 byte channel id
//! - 1 byte per-channel sequence number
//! - 4 bytes little-endian total frame size (header included)
//!
//! One UDP datagram carries one or more concatenated frames with no trailing
//! bytes. There is no checksum at this level; UDP's is relied upon.

pub mod channel;
pub mod codec;
pub mod error;

pub use channel::{ack_id, channel_name, Medium};
pub use codec::{encode_frame, encode_header, frames, Frame, FrameHeader, FrameIter, FrameType, HEADER_SIZE};
pub use error::{FrameError, Result};
