/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The datagram residue is shorter than a frame header.
    #[error("partial header ({remaining} bytes left)")]
    PartialHeader { remaining: usize },

    /// The size field is smaller than the header or points past the
    /// end of the datagram.
    #[error("bad frame (size {size}, {available} bytes available)")]
    BadFrame { size: u32, available: usize },

    /// The frame is too large to represent in the 4-byte size field.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: u32 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
