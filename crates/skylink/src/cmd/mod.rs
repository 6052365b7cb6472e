use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use skylink_frame::FrameType;

use crate::exit::CliResult;
use crate::output::OutputFormat;

#[cfg(unix)]
pub mod listen;
#[cfg(unix)]
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single frame to a peer.
    Send(SendArgs),
    /// Bind a local port and print received frames.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

#[cfg(unix)]
pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[cfg(not(unix))]
pub fn run(command: Command, _format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        _ => Err(crate::exit::CliError::new(
            crate::exit::INTERNAL,
            "udp transport is not supported on this platform yet",
        )),
    }
}

/// Frame kind selector mirroring the wire type byte.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum FrameKind {
    Ack,
    Data,
    LowLatency,
    DataWithAck,
}

impl From<FrameKind> for FrameType {
    fn from(kind: FrameKind) -> FrameType {
        match kind {
            FrameKind::Ack => FrameType::Ack,
            FrameKind::Data => FrameType::Data,
            FrameKind::LowLatency => FrameType::LowLatencyData,
            FrameKind::DataWithAck => FrameType::DataWithAck,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Peer IPv4 address.
    pub addr: Ipv4Addr,
    /// Peer UDP port.
    #[arg(long, short = 'p')]
    pub port: u16,
    /// Channel id to send on.
    #[arg(long, short = 'c', default_value = "10")]
    pub channel: u8,
    /// Sequence number to stamp on the frame.
    #[arg(long, default_value = "0")]
    pub seq: u8,
    /// Frame type.
    #[arg(long, value_enum, default_value = "data")]
    pub frame_type: FrameKind,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Tag the datagram with a DSCP traffic class.
    #[arg(long)]
    pub qos: bool,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local UDP port to bind; 0 picks a free port.
    #[arg(default_value = "0")]
    pub port: u16,
    /// Filter to specific channel ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<u8>>,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
