use std::io::{self, IoSlice};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use skylink_frame::{encode_header, FrameHeader, HEADER_SIZE};

use crate::error::{Result, TransportError};
use crate::evloop::EventLoop;
use crate::handler::{Direction, LinkHandler, LinkStatus};
use crate::sock::{DataSocket, SocketKind};
use crate::sys;

/// Cadence at which the upper layer is expected to PING the peer. The
/// transport itself does not ping; the constant lives here so both sides
/// of the API agree on the link-probe period.
pub const PING_PERIOD: Duration = Duration::from_secs(2);

/// Loss-injection hooks for robustness testing. A percentage in 0..=100;
/// unset or unparsable means no injected loss.
pub const RX_DROP_RATIO_ENV: &str = "ARSDK_TRANSPORT_NET_RX_DROP_RATIO";
pub const TX_DROP_RATIO_ENV: &str = "ARSDK_TRANSPORT_NET_TX_DROP_RATIO";

/// Endpoint configuration for a [`UdpLink`].
///
/// RX fields are consumed at construction and frozen once the socket is
/// bound; TX fields may change at runtime (the peer announces its ports
/// during connection establishment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCfg {
    /// Local UDP port to receive on; 0 requests dynamic allocation. After
    /// construction this holds the effective bound port.
    pub rx_port: u16,
    /// Peer address to send to.
    pub tx_addr: Ipv4Addr,
    /// Peer UDP port to send to.
    pub tx_port: u16,
    /// Tag outgoing datagrams with a DSCP traffic class.
    pub qos_mode: bool,
    /// Socket role, selecting the traffic class used in QoS mode.
    pub kind: SocketKind,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            rx_port: 0,
            tx_addr: Ipv4Addr::LOCALHOST,
            tx_port: 0,
            qos_mode: false,
            kind: SocketKind::Command,
        }
    }
}

/// UDP link: one bound socket plus the frame codec glue around it.
///
/// `new` binds; `start` registers the descriptor with the event loop and
/// opens the send path. The application routes readiness back into
/// [`process_rx`], which decodes the datagram and pushes each frame into
/// the [`LinkHandler`].
///
/// [`process_rx`]: UdpLink::process_rx
pub struct UdpLink<H: LinkHandler> {
    evloop: Rc<dyn EventLoop>,
    cfg: LinkCfg,
    handler: H,
    sock: DataSocket,
    started: bool,
    rx_drop_ratio: u8,
    tx_drop_ratio: u8,
    // Consecutive sends swallowed by kernel buffer exhaustion, for the
    // recovery log.
    tx_fail: u32,
}

impl<H: LinkHandler> UdpLink<H> {
    /// Bind the socket per `cfg` and wire up the handler.
    ///
    /// On return `cfg.rx_port` reflects the effective bound port, which
    /// differs from the requested one when the request was 0 or the port
    /// was already taken.
    pub fn new(evloop: Rc<dyn EventLoop>, mut cfg: LinkCfg, mut handler: H) -> Result<Self> {
        let sock = DataSocket::open(cfg.rx_port, true, true, cfg.kind)?;
        cfg.rx_port = sock.rx_port();
        handler.socket_created(sock.fd(), sock.kind());

        let rx_drop_ratio = drop_ratio_from_env(RX_DROP_RATIO_ENV);
        let tx_drop_ratio = drop_ratio_from_env(TX_DROP_RATIO_ENV);

        Ok(Self {
            evloop,
            cfg,
            handler,
            sock,
            started: false,
            rx_drop_ratio,
            tx_drop_ratio,
            tx_fail: 0,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.sock.fd()
    }

    pub fn cfg(&self) -> &LinkCfg {
        &self.cfg
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Register with the event loop and open the send path.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(TransportError::AlreadyStarted);
        }
        if self.cfg.qos_mode {
            self.sock.apply_qos()?;
        }
        self.evloop.add(self.sock.fd())?;
        self.started = true;
        debug!(fd = self.sock.fd(), rx_port = self.cfg.rx_port, "link started");
        Ok(())
    }

    /// Deregister from the event loop. Idempotent; the socket stays bound
    /// and can be restarted.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.evloop.remove(self.sock.fd())?;
        self.started = false;
        debug!(fd = self.sock.fd(), "link stopped");
        Ok(())
    }

    /// Replace the TX side of the configuration.
    ///
    /// RX fields are frozen at bind time; a change there is rejected
    /// without touching the current configuration.
    pub fn update_cfg(&mut self, cfg: LinkCfg) -> Result<()> {
        if cfg.rx_port != self.cfg.rx_port || cfg.kind != self.cfg.kind {
            return Err(TransportError::RxCfgImmutable);
        }
        let qos_turned_on = cfg.qos_mode && !self.cfg.qos_mode;
        self.cfg = cfg;
        if self.started && qos_turned_on {
            self.sock.apply_qos()?;
        }
        Ok(())
    }

    /// Read and dispatch one pending datagram.
    ///
    /// Call when the event loop reports the descriptor readable. Decoded
    /// frames go to the handler in wire order; a malformed residue is
    /// logged and the rest of the datagram discarded. A fatal socket error
    /// flips the link status OK → KO before being returned.
    pub fn process_rx(&mut self) -> Result<()> {
        let len = match self.sock.recv() {
            Ok(0) => {
                debug!(fd = self.sock.fd(), "eof on udp socket");
                return Ok(());
            }
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(err) => {
                self.fatal_error("udp read error", &err);
                return Err(err.into());
            }
        };

        if self.rx_drop_ratio > 0 && rand::thread_rng().gen_range(0..100) < self.rx_drop_ratio {
            debug!(len, "rx drop injection, datagram discarded");
            return Ok(());
        }

        let buf = self.sock.rx_bytes(len);
        for frame in skylink_frame::frames(buf) {
            match frame {
                Ok(frame) => {
                    self.handler
                        .log_frame(&frame.header, frame.payload, Direction::Rx);
                    self.handler.recv_frame(&frame.header, frame.payload);
                }
                Err(err) => {
                    error!(len, %err, "bad frame in datagram, dropping residue");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Send one frame, optionally with an extra header block between the
    /// frame header and the payload.
    ///
    /// The three parts go to the kernel as one gathered datagram; nothing
    /// is copied. Returns the number of bytes handed off.
    pub fn send(
        &mut self,
        header: &FrameHeader,
        payload: &[u8],
        extra_hdr: Option<&[u8]>,
    ) -> Result<usize> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }

        let extra = extra_hdr.unwrap_or(&[]);
        let total = HEADER_SIZE + extra.len() + payload.len();
        let size =
            u32::try_from(total).map_err(|_| TransportError::FrameTooLarge { size: total })?;

        let mut hdr = [0u8; HEADER_SIZE];
        encode_header(header, size, &mut hdr);

        self.handler.log_frame(header, payload, Direction::Tx);

        if self.tx_drop_ratio > 0 && rand::thread_rng().gen_range(0..100) < self.tx_drop_ratio {
            debug!(total, "tx drop injection, frame not sent");
            return Ok(total);
        }

        let mut segs = [IoSlice::new(&hdr), IoSlice::new(extra), IoSlice::new(payload)];
        let mut used = 1;
        for part in [extra, payload] {
            if !part.is_empty() {
                segs[used] = IoSlice::new(part);
                used += 1;
            }
        }

        let dst = SocketAddrV4::new(self.cfg.tx_addr, self.cfg.tx_port);
        let res = sys::send_gather(self.sock.fd(), dst, &segs[..used]);
        self.finish_send(res, total)
    }

    /// Interpret a datagram write result.
    ///
    /// Kernel buffer exhaustion is absorbed: the frame is counted lost and
    /// the send reported successful, since the upper layer's retransmission
    /// covers it. Anything else fatal flips the link status.
    fn finish_send(&mut self, res: io::Result<usize>, total: usize) -> Result<usize> {
        match res {
            Ok(written) if written == total => {
                if self.tx_fail > 0 {
                    info!(dropped = self.tx_fail, "udp send path recovered");
                    self.tx_fail = 0;
                }
                Ok(total)
            }
            Ok(written) => {
                error!(written, expected = total, "partial udp write");
                Err(TransportError::WouldBlock)
            }
            Err(err) if err.raw_os_error() == Some(libc::ENOBUFS) => {
                self.tx_fail += 1;
                warn!(dropped = self.tx_fail, "kernel buffers full, frame dropped");
                Ok(total)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                Err(TransportError::WouldBlock)
            }
            Err(err) => {
                self.fatal_error("udp write error", &err);
                Err(err.into())
            }
        }
    }

    // Log and flip OK -> KO on the first fatal error only. While the
    // link is already KO the error is not even logged, so an outage does
    // not flood the log.
    fn fatal_error(&mut self, what: &str, err: &io::Error) {
        if self.handler.link_status() != LinkStatus::Ok {
            return;
        }
        error!(fd = self.sock.fd(), %err, "{what}, marking link KO");
        self.handler.set_link_status(LinkStatus::Ko);
    }
}

impl<H: LinkHandler> Drop for UdpLink<H> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn drop_ratio_from_env(name: &str) -> u8 {
    let ratio = match std::env::var(name) {
        Ok(raw) => parse_drop_ratio(&raw),
        Err(_) => 0,
    };
    if ratio > 0 {
        warn!(name, ratio, "loss injection active");
    }
    ratio
}

fn parse_drop_ratio(raw: &str) -> u8 {
    match raw.trim().parse::<u8>() {
        Ok(pct) => pct.min(100),
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::net::UdpSocket;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tracing::{span, Event, Level, Metadata};

    use bytes::BytesMut;

    use skylink_frame::{channel, encode_frame, FrameType};

    use super::*;
    use crate::evloop::PollLoop;

    #[derive(Default)]
    struct State {
        frames: Vec<(FrameHeader, Vec<u8>)>,
        taps: Vec<(Direction, u8)>,
        status: Option<LinkStatus>,
        socket_fd: Option<RawFd>,
    }

    #[derive(Clone, Default)]
    struct TestHandler {
        state: Rc<RefCell<State>>,
        link_ok: Rc<RefCell<bool>>,
    }

    impl TestHandler {
        fn new() -> Self {
            Self {
                state: Rc::default(),
                link_ok: Rc::new(RefCell::new(true)),
            }
        }
    }

    impl LinkHandler for TestHandler {
        fn recv_frame(&mut self, header: &FrameHeader, payload: &[u8]) {
            self.state
                .borrow_mut()
                .frames
                .push((*header, payload.to_vec()));
        }

        fn link_status(&self) -> LinkStatus {
            if *self.link_ok.borrow() {
                LinkStatus::Ok
            } else {
                LinkStatus::Ko
            }
        }

        fn set_link_status(&mut self, status: LinkStatus) {
            *self.link_ok.borrow_mut() = status == LinkStatus::Ok;
            self.state.borrow_mut().status = Some(status);
        }

        fn log_frame(&mut self, header: &FrameHeader, _payload: &[u8], dir: Direction) {
            self.state.borrow_mut().taps.push((dir, header.id));
        }

        fn socket_created(&mut self, fd: RawFd, _kind: SocketKind) {
            self.state.borrow_mut().socket_fd = Some(fd);
        }
    }

    fn link_with_peer() -> (UdpLink<TestHandler>, Rc<RefCell<State>>, UdpSocket) {
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let peer_port = peer.local_addr().unwrap().port();

        let handler = TestHandler::new();
        let state = handler.state.clone();

        let cfg = LinkCfg {
            tx_port: peer_port,
            ..LinkCfg::default()
        };
        let link = UdpLink::new(Rc::new(PollLoop::new()), cfg, handler).unwrap();
        (link, state, peer)
    }

    #[test]
    fn new_reports_bound_port_and_socket() {
        let (link, state, _peer) = link_with_peer();
        assert_ne!(link.cfg().rx_port, 0);
        assert_eq!(state.borrow().socket_fd, Some(link.fd()));
    }

    #[test]
    fn send_produces_exact_wire_bytes() {
        let (mut link, _state, peer) = link_with_peer();
        link.start().unwrap();

        let header = FrameHeader::new(FrameType::Data, channel::C2D_CMD_NOACK, 42);
        let written = link.send(&header, &[0xAA, 0xBB, 0xCC], None).unwrap();
        assert_eq!(written, 10);

        let mut buf = [0u8; 64];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(
            &buf[..len],
            &[0x02, 0x0A, 0x2A, 0x0A, 0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn send_gathers_extra_header_block() {
        let (mut link, state, peer) = link_with_peer();
        link.start().unwrap();

        let header = FrameHeader::new(FrameType::DataWithAck, channel::C2D_CMD_WITHACK, 1);
        let written = link.send(&header, b"payload", Some(b"xx")).unwrap();
        assert_eq!(written, HEADER_SIZE + 2 + 7);

        let mut buf = [0u8; 64];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(len, written);
        assert_eq!(&buf[HEADER_SIZE..HEADER_SIZE + 2], b"xx");
        assert_eq!(&buf[HEADER_SIZE + 2..len], b"payload");
        // size field covers the extra block
        assert_eq!(buf[3], written as u8);

        assert_eq!(state.borrow().taps, vec![(Direction::Tx, channel::C2D_CMD_WITHACK)]);
    }

    #[test]
    fn process_rx_delivers_concatenated_frames_in_order() {
        let (mut link, state, peer) = link_with_peer();
        link.start().unwrap();

        let mut wire = BytesMut::new();
        let h1 = FrameHeader::new(FrameType::Data, channel::D2C_CMD_NOACK, 1);
        let h2 = FrameHeader::new(FrameType::Ack, channel::D2C_CMD_ACK, 2);
        encode_frame(&h1, b"first", &mut wire).unwrap();
        encode_frame(&h2, b"", &mut wire).unwrap();
        peer.send_to(&wire, ("127.0.0.1", link.cfg().rx_port)).unwrap();

        // readiness isn't instant on loopback under load
        let ready = PollLoop::new();
        ready.add(link.fd()).unwrap();
        assert!(!ready.wait(Some(Duration::from_secs(2))).unwrap().is_empty());

        link.process_rx().unwrap();

        let state = state.borrow();
        assert_eq!(state.frames.len(), 2);
        assert_eq!(state.frames[0], (h1, b"first".to_vec()));
        assert_eq!(state.frames[1], (h2, Vec::new()));
        assert_eq!(
            state.taps,
            vec![
                (Direction::Rx, channel::D2C_CMD_NOACK),
                (Direction::Rx, channel::D2C_CMD_ACK)
            ]
        );
    }

    #[test]
    fn malformed_datagram_yields_no_upcalls() {
        let (mut link, state, peer) = link_with_peer();
        link.start().unwrap();

        peer.send_to(&[0x02, 0x0A, 0x01], ("127.0.0.1", link.cfg().rx_port))
            .unwrap();

        let ready = PollLoop::new();
        ready.add(link.fd()).unwrap();
        assert!(!ready.wait(Some(Duration::from_secs(2))).unwrap().is_empty());

        link.process_rx().unwrap();
        assert!(state.borrow().frames.is_empty());
    }

    #[test]
    fn valid_frames_before_bad_residue_still_delivered() {
        let (mut link, state, peer) = link_with_peer();
        link.start().unwrap();

        let mut wire = BytesMut::new();
        let h1 = FrameHeader::new(FrameType::Data, channel::D2C_CMD_NOACK, 9);
        encode_frame(&h1, b"ok", &mut wire).unwrap();
        wire.extend_from_slice(&[0x02, 0x7F]); // truncated second header
        peer.send_to(&wire, ("127.0.0.1", link.cfg().rx_port)).unwrap();

        let ready = PollLoop::new();
        ready.add(link.fd()).unwrap();
        assert!(!ready.wait(Some(Duration::from_secs(2))).unwrap().is_empty());

        link.process_rx().unwrap();

        let state = state.borrow();
        assert_eq!(state.frames.len(), 1);
        assert_eq!(state.frames[0], (h1, b"ok".to_vec()));
    }

    #[test]
    fn rx_drop_injection_discards_datagram() {
        let (mut link, state, peer) = link_with_peer();
        link.start().unwrap();
        link.rx_drop_ratio = 100;

        let mut wire = BytesMut::new();
        let h = FrameHeader::new(FrameType::Data, channel::D2C_CMD_NOACK, 3);
        encode_frame(&h, b"lost", &mut wire).unwrap();
        peer.send_to(&wire, ("127.0.0.1", link.cfg().rx_port)).unwrap();

        let ready = PollLoop::new();
        ready.add(link.fd()).unwrap();
        assert!(!ready.wait(Some(Duration::from_secs(2))).unwrap().is_empty());

        link.process_rx().unwrap();
        assert!(state.borrow().frames.is_empty());
    }

    #[test]
    fn tx_drop_injection_pretends_success() {
        let (mut link, _state, peer) = link_with_peer();
        link.start().unwrap();
        link.tx_drop_ratio = 100;

        let header = FrameHeader::new(FrameType::Data, channel::C2D_CMD_NOACK, 0);
        let written = link.send(&header, b"lost", None).unwrap();
        assert_eq!(written, HEADER_SIZE + 4);

        peer.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let mut buf = [0u8; 64];
        assert!(peer.recv_from(&mut buf).is_err());
    }

    #[test]
    fn enobufs_counts_as_sent_until_recovery() {
        let (mut link, state, _peer) = link_with_peer();
        link.start().unwrap();

        let nobufs = io::Error::from_raw_os_error(libc::ENOBUFS);
        let written = link.finish_send(Err(nobufs), 12).unwrap();
        assert_eq!(written, 12);
        assert_eq!(link.tx_fail, 1);
        // buffer exhaustion is benign and never touches link status
        assert_eq!(state.borrow().status, None);

        // full write clears the failure counter
        link.finish_send(Ok(12), 12).unwrap();
        assert_eq!(link.tx_fail, 0);
        assert_eq!(state.borrow().status, None);
    }

    #[test]
    fn partial_write_is_retryable() {
        let (mut link, state, _peer) = link_with_peer();
        link.start().unwrap();

        let err = link.finish_send(Ok(5), 12).unwrap_err();
        assert!(matches!(err, TransportError::WouldBlock));
        // retryable errors never touch link status
        assert_eq!(state.borrow().status, None);
    }

    // Counts ERROR-level events so tests can assert on log suppression.
    struct ErrorCounter(Arc<AtomicUsize>);

    impl tracing::Subscriber for ErrorCounter {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            *metadata.level() == Level::ERROR
        }

        fn new_span(&self, _attrs: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }

        fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}

        fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

        fn event(&self, _event: &Event<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn enter(&self, _span: &span::Id) {}

        fn exit(&self, _span: &span::Id) {}
    }

    #[test]
    fn fatal_errors_log_only_on_the_ko_transition() {
        let (mut link, state, _peer) = link_with_peer();
        link.start().unwrap();

        let errors = Arc::new(AtomicUsize::new(0));
        tracing::subscriber::with_default(ErrorCounter(errors.clone()), || {
            for _ in 0..5 {
                let res = link.finish_send(
                    Err(io::Error::from_raw_os_error(libc::ECONNREFUSED)),
                    12,
                );
                assert!(res.is_err());
            }
        });

        // one log line for the OK -> KO transition, silence after
        assert_eq!(state.borrow().status, Some(LinkStatus::Ko));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fatal_write_error_flips_link_ko_once() {
        let (mut link, state, _peer) = link_with_peer();
        link.start().unwrap();

        let res = link.finish_send(
            Err(io::Error::from_raw_os_error(libc::ECONNREFUSED)),
            12,
        );
        assert!(res.is_err());
        assert_eq!(state.borrow().status, Some(LinkStatus::Ko));

        // second fatal error must not re-notify
        state.borrow_mut().status = None;
        let res = link.finish_send(
            Err(io::Error::from_raw_os_error(libc::ECONNREFUSED)),
            12,
        );
        assert!(res.is_err());
        assert_eq!(state.borrow().status, None);
    }

    #[test]
    fn send_before_start_is_rejected() {
        let (mut link, _state, _peer) = link_with_peer();
        let header = FrameHeader::new(FrameType::Data, channel::C2D_CMD_NOACK, 0);
        assert!(matches!(
            link.send(&header, b"x", None),
            Err(TransportError::NotStarted)
        ));
    }

    #[test]
    fn double_start_is_rejected_and_stop_is_idempotent() {
        let (mut link, _state, _peer) = link_with_peer();
        link.start().unwrap();
        assert!(matches!(link.start(), Err(TransportError::AlreadyStarted)));

        link.stop().unwrap();
        link.stop().unwrap();
        link.start().unwrap();
    }

    #[test]
    fn update_cfg_freezes_rx_side() {
        let (mut link, _state, _peer) = link_with_peer();
        let bound = link.cfg().rx_port;

        let mut cfg = *link.cfg();
        cfg.rx_port = bound.wrapping_add(1);
        assert!(matches!(
            link.update_cfg(cfg),
            Err(TransportError::RxCfgImmutable)
        ));
        assert_eq!(link.cfg().rx_port, bound);

        let mut cfg = *link.cfg();
        cfg.tx_port = 4242;
        link.update_cfg(cfg).unwrap();
        assert_eq!(link.cfg().tx_port, 4242);
    }

    #[test]
    fn parse_drop_ratio_clamps_and_ignores_garbage() {
        assert_eq!(parse_drop_ratio("25"), 25);
        assert_eq!(parse_drop_ratio(" 100 "), 100);
        assert_eq!(parse_drop_ratio("250"), 100);
        assert_eq!(parse_drop_ratio("500"), 0); // overflows u8
        assert_eq!(parse_drop_ratio("abc"), 0);
        assert_eq!(parse_drop_ratio(""), 0);
    }
}
