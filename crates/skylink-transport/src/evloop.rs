use std::cell::RefCell;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Read-readiness registration, as consumed by the transport.
///
/// Implementations are expected to be single-threaded: registration and
/// readiness dispatch happen on the thread that drives the loop. The
/// transport registers its descriptor at `start` and removes it at `stop`;
/// it never closes a registered descriptor.
pub trait EventLoop {
    /// Monitor `fd` for read readiness.
    fn add(&self, fd: RawFd) -> io::Result<()>;

    /// Stop monitoring `fd`.
    fn remove(&self, fd: RawFd) -> io::Result<()>;
}

/// Minimal `poll(2)`-backed event loop.
///
/// The application drives it: [`PollLoop::wait`] returns the descriptors
/// that became readable, and the application routes each one back into the
/// owning transport's `process_rx`.
pub struct PollLoop {
    fds: RefCell<Vec<RawFd>>,
}

impl PollLoop {
    pub fn new() -> Self {
        Self {
            fds: RefCell::new(Vec::new()),
        }
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.fds.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.borrow().is_empty()
    }

    /// Wait for read readiness on the registered descriptors.
    ///
    /// `None` blocks indefinitely. Returns the readable descriptors;
    /// an empty vector means the timeout elapsed.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<Vec<RawFd>> {
        let fds = self.fds.borrow();
        if fds.is_empty() {
            return Ok(Vec::new());
        }

        let mut pollfds: Vec<libc::pollfd> = fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        drop(fds);

        let timeout_ms = match timeout {
            Some(t) => t.as_millis().min(i32::MAX as u128) as libc::c_int,
            None => -1,
        };

        loop {
            // SAFETY: pollfds is an initialized array of pollfds.len() entries,
            // valid for the duration of the call.
            let rc = unsafe {
                libc::poll(
                    pollfds.as_mut_ptr(),
                    pollfds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };
            if rc >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        Ok(pollfds
            .iter()
            .filter(|p| p.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
            .map(|p| p.fd)
            .collect())
    }
}

impl Default for PollLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for PollLoop {
    fn add(&self, fd: RawFd) -> io::Result<()> {
        let mut fds = self.fds.borrow_mut();
        if fds.contains(&fd) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "fd already registered",
            ));
        }
        fds.push(fd);
        Ok(())
    }

    fn remove(&self, fd: RawFd) -> io::Result<()> {
        let mut fds = self.fds.borrow_mut();
        match fds.iter().position(|&f| f == fd) {
            Some(idx) => {
                fds.swap_remove(idx);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "fd not registered",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::os::fd::AsRawFd;

    use super::*;

    #[test]
    fn wait_reports_readable_udp_socket() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();

        let evloop = PollLoop::new();
        evloop.add(rx.as_raw_fd()).unwrap();

        tx.send_to(b"wake", rx.local_addr().unwrap()).unwrap();

        let ready = evloop.wait(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(ready, vec![rx.as_raw_fd()]);
    }

    #[test]
    fn wait_times_out_when_idle() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();

        let evloop = PollLoop::new();
        evloop.add(rx.as_raw_fd()).unwrap();

        let ready = evloop.wait(Some(Duration::from_millis(20))).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();

        let evloop = PollLoop::new();
        evloop.add(rx.as_raw_fd()).unwrap();
        let err = evloop.add(rx.as_raw_fd()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn remove_unregistered_is_an_error() {
        let evloop = PollLoop::new();
        let err = evloop.remove(42).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn removed_fd_is_no_longer_polled() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();

        let evloop = PollLoop::new();
        evloop.add(rx.as_raw_fd()).unwrap();
        evloop.remove(rx.as_raw_fd()).unwrap();
        assert!(evloop.is_empty());

        let ready = evloop.wait(Some(Duration::from_millis(10))).unwrap();
        assert!(ready.is_empty());
    }
}
