//! Link probe: sends a PING every ping period and prints the PONGs that
//! come back.
//!
//! ```text
//! cargo run --example link-probe -- 192.168.42.1 54321
//! ```

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::rc::Rc;
    use std::time::Instant;

    use skylink::frame::{channel, FrameHeader, FrameType};
    use skylink::transport::{
        EventLoop, LinkCfg, LinkHandler, LinkStatus, PollLoop, UdpLink, PING_PERIOD,
    };

    struct PongPrinter {
        status: LinkStatus,
    }

    impl LinkHandler for PongPrinter {
        fn recv_frame(&mut self, header: &FrameHeader, payload: &[u8]) {
            if header.id == channel::PONG {
                println!("pong seq={} ({} bytes)", header.seq, payload.len());
            }
        }

        fn link_status(&self) -> LinkStatus {
            self.status
        }

        fn set_link_status(&mut self, status: LinkStatus) {
            self.status = status;
            if status == LinkStatus::Ko {
                eprintln!("link went KO");
            }
        }
    }

    let mut args = std::env::args().skip(1);
    let addr = args
        .next()
        .ok_or("usage: link-probe <addr> <port>")?
        .parse()?;
    let port: u16 = args.next().ok_or("usage: link-probe <addr> <port>")?.parse()?;

    let evloop = Rc::new(PollLoop::new());
    let cfg = LinkCfg {
        tx_addr: addr,
        tx_port: port,
        ..LinkCfg::default()
    };
    let handler = PongPrinter {
        status: LinkStatus::Ok,
    };
    let mut link = UdpLink::new(evloop.clone() as Rc<dyn EventLoop>, cfg, handler)?;
    link.start()?;
    println!("probing {addr}:{port} from udp port {}", link.cfg().rx_port);

    let mut seq = 0u8;
    let mut last_ping: Option<Instant> = None;
    loop {
        if last_ping.is_none_or(|t| t.elapsed() >= PING_PERIOD) {
            let header = FrameHeader::new(FrameType::Data, channel::PING, seq);
            link.send(&header, &[], None)?;
            seq = seq.wrapping_add(1);
            last_ping = Some(Instant::now());
        }

        let elapsed = last_ping.map(|t| t.elapsed()).unwrap_or_default();
        let ready = evloop.wait(Some(PING_PERIOD.saturating_sub(elapsed)))?;
        if !ready.is_empty() {
            link.process_rx()?;
        }
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("this example needs a unix platform");
}
