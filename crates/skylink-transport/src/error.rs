/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `start` was called on a transport that is already running.
    #[error("transport already started")]
    AlreadyStarted,

    /// A send was attempted before `start` (or after `stop`).
    #[error("transport not started")]
    NotStarted,

    /// Failed to bind the RX socket.
    #[error("failed to bind udp port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    /// The kernel would block, or accepted only part of the datagram.
    /// Retryable; the frame was not sent. Never affects link status.
    #[error("operation would block")]
    WouldBlock,

    /// The frame is too large to represent in the 4-byte size field.
    #[error("frame too large ({size} bytes)")]
    FrameTooLarge { size: usize },

    /// A config update tried to change RX fields of a bound socket.
    #[error("rx fields of a bound transport cannot change")]
    RxCfgImmutable,

    /// An I/O error on the socket.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
