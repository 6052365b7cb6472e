use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use skylink_frame::FrameHeader;
use skylink_transport::{
    Direction, EventLoop, LinkCfg, LinkHandler, LinkStatus, PollLoop, UdpLink,
};

use crate::cmd::ListenArgs;
use crate::exit::{io_error, transport_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_frame, OutputFormat};

struct PrintHandler {
    format: OutputFormat,
    channels: Option<Vec<u8>>,
    printed: usize,
    status: LinkStatus,
}

impl LinkHandler for PrintHandler {
    fn recv_frame(&mut self, header: &FrameHeader, payload: &[u8]) {
        if let Some(channels) = &self.channels {
            if !channels.contains(&header.id) {
                return;
            }
        }
        print_frame(header, payload, self.format);
        self.printed = self.printed.saturating_add(1);
    }

    fn link_status(&self) -> LinkStatus {
        self.status
    }

    fn set_link_status(&mut self, status: LinkStatus) {
        self.status = status;
    }

    fn log_frame(&mut self, header: &FrameHeader, payload: &[u8], dir: Direction) {
        tracing::debug!(
            ?dir,
            channel = header.id,
            seq = header.seq,
            len = payload.len(),
            "frame"
        );
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let handler = PrintHandler {
        format,
        channels: args.channels.clone(),
        printed: 0,
        status: LinkStatus::Ok,
    };

    let evloop = Rc::new(PollLoop::new());
    let cfg = LinkCfg {
        rx_port: args.port,
        ..LinkCfg::default()
    };
    let mut link = UdpLink::new(evloop.clone() as Rc<dyn EventLoop>, cfg, handler)
        .map_err(|err| transport_error("bind failed", err))?;
    link.start()
        .map_err(|err| transport_error("start failed", err))?;

    eprintln!("listening on udp port {}", link.cfg().rx_port);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let ready = evloop
            .wait(Some(Duration::from_millis(200)))
            .map_err(|err| io_error("poll failed", err))?;
        if ready.is_empty() {
            continue;
        }

        link.process_rx()
            .map_err(|err| transport_error("receive failed", err))?;

        if link.handler().status == LinkStatus::Ko {
            return Ok(FAILURE);
        }
        if let Some(count) = args.count {
            if link.handler().printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
