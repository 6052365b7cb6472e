use std::fs;
use std::rc::Rc;

use serde::Serialize;
use skylink_frame::{FrameHeader, FrameType};
use skylink_transport::{EventLoop, LinkCfg, LinkHandler, LinkStatus, PollLoop, UdpLink};

use crate::cmd::SendArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

// The send path needs a handler but never receives; link status is
// write-only here.
struct SinkHandler {
    status: LinkStatus,
}

impl LinkHandler for SinkHandler {
    fn recv_frame(&mut self, _header: &FrameHeader, _payload: &[u8]) {}

    fn link_status(&self) -> LinkStatus {
        self.status
    }

    fn set_link_status(&mut self, status: LinkStatus) {
        self.status = status;
    }
}

#[derive(Serialize)]
struct SendOutput {
    bytes: usize,
    channel: u8,
    seq: u8,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;

    let evloop = Rc::new(PollLoop::new());
    let cfg = LinkCfg {
        rx_port: 0,
        tx_addr: args.addr,
        tx_port: args.port,
        qos_mode: args.qos,
        ..LinkCfg::default()
    };
    let handler = SinkHandler {
        status: LinkStatus::Ok,
    };
    let mut link = UdpLink::new(evloop as Rc<dyn EventLoop>, cfg, handler)
        .map_err(|err| transport_error("socket setup failed", err))?;
    link.start()
        .map_err(|err| transport_error("start failed", err))?;

    let ty: FrameType = args.frame_type.into();
    let header = FrameHeader::new(ty, args.channel, args.seq);
    let written = link
        .send(&header, &payload, None)
        .map_err(|err| transport_error("send failed", err))?;

    match format {
        OutputFormat::Json => {
            let out = SendOutput {
                bytes: written,
                channel: args.channel,
                seq: args.seq,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Pretty => {
            println!(
                "sent {written} bytes to {}:{} on channel {}",
                args.addr, args.port, args.channel
            );
        }
        OutputFormat::Raw => {}
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}
