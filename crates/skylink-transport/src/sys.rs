//! Raw syscall shims for the datagram path.
//!
//! Kept separate so the Windows variant (`WSASendTo`/`WSARecvFrom`) can
//! slot in beside it later; everything else in the crate is
//! platform-neutral above these three calls.

use std::io::{self, IoSlice};
use std::net::SocketAddrV4;
use std::os::fd::RawFd;

/// Read one datagram into `buf`, retrying on EINTR.
///
/// The source address is discarded; the peer endpoint is fixed by
/// configuration.
pub fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        // SAFETY: buf is a valid writable region of buf.len() bytes for the
        // duration of the call; null address pointers drop the source.
        let n = unsafe {
            libc::recvfrom(
                fd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Scatter-gather send of `segs` to `dst` in one datagram, retrying on
/// EINTR. Payload segments are handed to the kernel in place; nothing is
/// copied into an intermediate buffer.
pub fn send_gather(fd: RawFd, dst: SocketAddrV4, segs: &[IoSlice<'_>]) -> io::Result<usize> {
    let addr = socket2::SockAddr::from(dst);

    // std::io::IoSlice is guaranteed ABI-compatible with iovec.
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = addr.as_ptr() as *mut libc::c_void;
    msg.msg_namelen = addr.len();
    msg.msg_iov = segs.as_ptr() as *mut libc::iovec;
    msg.msg_iovlen = segs.len() as _;

    loop {
        // SAFETY: msg points at addr and segs, both alive across the call.
        let n = unsafe { libc::sendmsg(fd, &msg, 0) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Usable kernel receive-buffer size for `fd`.
///
/// POSIX kernels report back double the requested SO_RCVBUF value, so the
/// usable size is half of what getsockopt returns.
pub fn recv_buffer_size(fd: RawFd) -> io::Result<usize> {
    let mut size: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // SAFETY: size and len are valid writable pointers of the stated sizes,
    // and fd is an open socket owned by the caller.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&mut size as *mut libc::c_int).cast(),
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size as usize / 2)
}
