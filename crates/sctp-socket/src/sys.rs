//! Raw libc calls for the SCTP pieces `socket2` does not cover: the
//! `IPPROTO_SCTP` socket options, ancillary data, and the wake-up eventfd.
//!
//! All pointer handling lives here. Callers pass and receive plain byte
//! slices; structure layouts are encoded and decoded with [`crate::wire`].

use std::mem;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::ptr;

use libc::{c_int, c_void, socklen_t};
use socket2::SockAddr;

use crate::consts::{IPPROTO_SCTP, SOCKADDR_STORAGE_SIZE};
use crate::error::{SctpError, SctpResult};

fn check(ret: c_int, call: &'static str) -> SctpResult<c_int> {
    if ret < 0 {
        Err(SctpError::last_os_error(call))
    } else {
        Ok(ret)
    }
}

/// `setsockopt`; returns the call's non-negative result, which some SCTP
/// options (connectx) use to hand back a value.
pub(crate) fn setsockopt(
    fd: RawFd,
    level: c_int,
    name: c_int,
    value: &[u8],
    call: &'static str,
) -> SctpResult<c_int> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value.as_ptr() as *const c_void,
            value.len() as socklen_t,
        )
    };
    check(ret, call)
}

/// `getsockopt` into `buf`, which may carry input fields (usually the
/// association id). Returns the length the kernel reported.
pub(crate) fn getsockopt(
    fd: RawFd,
    level: c_int,
    name: c_int,
    buf: &mut [u8],
    call: &'static str,
) -> SctpResult<usize> {
    let mut len = buf.len() as socklen_t;
    let ret = unsafe {
        libc::getsockopt(fd, level, name, buf.as_mut_ptr() as *mut c_void, &mut len)
    };
    check(ret, call)?;
    Ok((len as usize).min(buf.len()))
}

pub(crate) fn set_int(
    fd: RawFd,
    level: c_int,
    name: c_int,
    value: c_int,
    call: &'static str,
) -> SctpResult<()> {
    setsockopt(fd, level, name, &value.to_ne_bytes(), call).map(|_| ())
}

pub(crate) fn get_int(fd: RawFd, level: c_int, name: c_int, call: &'static str) -> SctpResult<c_int> {
    let mut buf = [0u8; 4];
    getsockopt(fd, level, name, &mut buf, call)?;
    Ok(c_int::from_ne_bytes(buf))
}

/// Non-blocking `eventfd` used to interrupt threads parked in [`wait`].
pub(crate) fn eventfd() -> SctpResult<OwnedFd> {
    let fd = check(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) }, "eventfd")?;
    // SAFETY: `eventfd` just returned this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

pub(crate) fn signal(event_fd: RawFd) -> SctpResult<()> {
    let one = 1u64.to_ne_bytes();
    let n = unsafe { libc::write(event_fd, one.as_ptr() as *const c_void, one.len()) };
    if n < 0 {
        let err = SctpError::last_os_error("write(eventfd)");
        // Counter saturation still leaves the eventfd readable.
        if !err.is_would_block() {
            return Err(err);
        }
    }
    Ok(())
}

/// Outcome of [`wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The socket reported the requested events (or an error condition).
    Ready,
    /// The wake-up eventfd fired.
    Woken,
}

/// Blocks until `fd` reports `events` or `event_fd` is signalled.
pub(crate) fn wait(fd: RawFd, events: libc::c_short, event_fd: RawFd) -> SctpResult<Readiness> {
    loop {
        let mut fds = [
            libc::pollfd {
                fd,
                events,
                revents: 0,
            },
            libc::pollfd {
                fd: event_fd,
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ret < 0 {
            let err = SctpError::last_os_error("poll");
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err);
        }
        if fds[1].revents != 0 {
            return Ok(Readiness::Woken);
        }
        if fds[0].revents != 0 {
            return Ok(Readiness::Ready);
        }
    }
}

/// Control messages to attach to one `sendmsg`, all at level `IPPROTO_SCTP`.
#[derive(Debug, Default, Clone)]
pub(crate) struct ControlMessages {
    records: Vec<(c_int, Vec<u8>)>,
}

impl ControlMessages {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, kind: c_int, data: Vec<u8>) {
        self.records.push((kind, data));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn space(&self) -> usize {
        self.records
            .iter()
            .map(|(_, data)| unsafe { libc::CMSG_SPACE(data.len() as u32) } as usize)
            .sum()
    }

    /// Lays the records out in a `cmsghdr`-aligned buffer.
    fn build(&self) -> (Vec<u64>, usize) {
        let space = self.space();
        let mut buf = vec![0u64; space.div_ceil(mem::size_of::<u64>())];
        if space == 0 {
            return (buf, 0);
        }
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_control = buf.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = space as _;

        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        for (kind, data) in &self.records {
            if cmsg.is_null() {
                break;
            }
            unsafe {
                (*cmsg).cmsg_level = IPPROTO_SCTP;
                (*cmsg).cmsg_type = *kind;
                (*cmsg).cmsg_len = libc::CMSG_LEN(data.len() as u32) as _;
                ptr::copy_nonoverlapping(data.as_ptr(), libc::CMSG_DATA(cmsg), data.len());
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }
        (buf, space)
    }
}

/// `sendmsg` with an optional destination, a gather list and control data.
pub(crate) fn sendmsg(
    fd: RawFd,
    name: Option<&SockAddr>,
    parts: &[&[u8]],
    control: &ControlMessages,
    flags: c_int,
) -> SctpResult<usize> {
    let mut iov: Vec<libc::iovec> = parts
        .iter()
        .map(|p| libc::iovec {
            iov_base: p.as_ptr() as *mut c_void,
            iov_len: p.len(),
        })
        .collect();
    let (mut cbuf, clen) = control.build();

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    if let Some(name) = name {
        msg.msg_name = name.as_ptr() as *mut c_void;
        msg.msg_namelen = name.len();
    }
    msg.msg_iov = iov.as_mut_ptr();
    msg.msg_iovlen = iov.len() as _;
    if !control.is_empty() {
        msg.msg_control = cbuf.as_mut_ptr() as *mut c_void;
        msg.msg_controllen = clen as _;
    }

    let n = unsafe { libc::sendmsg(fd, &msg, flags | libc::MSG_NOSIGNAL) };
    if n < 0 {
        return Err(SctpError::last_os_error("sendmsg"));
    }
    Ok(n as usize)
}

/// What one `recvmsg` produced.
#[derive(Debug, Default)]
pub(crate) struct RecvOutcome {
    /// Bytes written into the caller's buffer.
    pub len: usize,
    /// `msg_flags` as returned by the kernel.
    pub flags: c_int,
    /// Sender address bytes.
    pub name: Vec<u8>,
    /// `(cmsg_type, data)` for every `IPPROTO_SCTP` control message.
    pub control: Vec<(c_int, Vec<u8>)>,
}

impl RecvOutcome {
    pub(crate) fn control(&self, kind: c_int) -> Option<&[u8]> {
        self.control
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, data)| data.as_slice())
    }
}

/// `recvmsg` into `buf` with room for `control_space` bytes of control data.
pub(crate) fn recvmsg(
    fd: RawFd,
    buf: &mut [u8],
    control_space: usize,
    flags: c_int,
) -> SctpResult<RecvOutcome> {
    let mut name = vec![0u8; SOCKADDR_STORAGE_SIZE];
    let mut cbuf = vec![0u64; control_space.div_ceil(mem::size_of::<u64>())];
    let cbuf_len = cbuf.len() * mem::size_of::<u64>();
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut c_void,
        iov_len: buf.len(),
    };

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_name = name.as_mut_ptr() as *mut c_void;
    msg.msg_namelen = name.len() as socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cbuf.as_mut_ptr() as *mut c_void;
    msg.msg_controllen = cbuf_len as _;

    let n = unsafe { libc::recvmsg(fd, &mut msg, flags) };
    if n < 0 {
        return Err(SctpError::last_os_error("recvmsg"));
    }

    let controllen = (msg.msg_controllen as usize).min(cbuf_len);
    let base = cbuf.as_ptr() as usize;
    let header_len = unsafe { libc::CMSG_LEN(0) } as usize;
    let mut control = Vec::new();
    if controllen > 0 {
        let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
        while !cmsg.is_null() {
            let (level, kind, total) =
                unsafe { ((*cmsg).cmsg_level, (*cmsg).cmsg_type, (*cmsg).cmsg_len as usize) };
            if total < header_len {
                break;
            }
            let data = unsafe { libc::CMSG_DATA(cmsg) };
            let offset = data as usize - base;
            let data_len = total - header_len;
            if offset + data_len > controllen {
                break;
            }
            if level == IPPROTO_SCTP {
                let bytes = unsafe { std::slice::from_raw_parts(data, data_len) };
                control.push((kind, bytes.to_vec()));
            }
            cmsg = unsafe { libc::CMSG_NXTHDR(&msg, cmsg) };
        }
    }

    name.truncate((msg.msg_namelen as usize).min(SOCKADDR_STORAGE_SIZE));
    Ok(RecvOutcome {
        len: n as usize,
        flags: msg.msg_flags,
        name,
        control,
    })
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;

    use super::*;

    #[test]
    fn test_control_layout() {
        let mut cm = ControlMessages::new();
        assert!(cm.is_empty());
        cm.push(1, vec![0xaa; 32]);
        cm.push(5, vec![0xbb; 8]);
        let (buf, len) = cm.build();
        let expected =
            unsafe { libc::CMSG_SPACE(32) as usize + libc::CMSG_SPACE(8) as usize };
        assert_eq!(len, expected);
        assert!(buf.len() * 8 >= len);

        let bytes: Vec<u8> = buf.iter().flat_map(|w| w.to_ne_bytes()).collect();
        let first = unsafe { &*(buf.as_ptr() as *const libc::cmsghdr) };
        assert_eq!(first.cmsg_level, IPPROTO_SCTP);
        assert_eq!(first.cmsg_type, 1);
        assert_eq!(first.cmsg_len as usize, unsafe { libc::CMSG_LEN(32) } as usize);
        let header_len = unsafe { libc::CMSG_LEN(0) } as usize;
        assert!(bytes[header_len..header_len + 32].iter().all(|b| *b == 0xaa));
    }

    #[test]
    fn test_empty_control() {
        let (_, len) = ControlMessages::new().build();
        assert_eq!(len, 0);
    }

    #[test]
    fn test_wait_is_woken_by_signal() {
        let sock = eventfd().unwrap();
        let wake = eventfd().unwrap();
        signal(wake.as_raw_fd()).unwrap();
        assert_eq!(
            wait(sock.as_raw_fd(), libc::POLLIN, wake.as_raw_fd()).unwrap(),
            Readiness::Woken
        );
    }

    #[test]
    fn test_wait_reports_ready() {
        let sock = eventfd().unwrap();
        let wake = eventfd().unwrap();
        signal(sock.as_raw_fd()).unwrap();
        assert_eq!(
            wait(sock.as_raw_fd(), libc::POLLIN, wake.as_raw_fd()).unwrap(),
            Readiness::Ready
        );
    }

    #[test]
    fn test_signal_is_sticky() {
        let sock = eventfd().unwrap();
        let wake = eventfd().unwrap();
        signal(wake.as_raw_fd()).unwrap();
        for _ in 0..3 {
            assert_eq!(
                wait(sock.as_raw_fd(), libc::POLLIN, wake.as_raw_fd()).unwrap(),
                Readiness::Woken
            );
        }
    }

    #[test]
    fn test_bad_fd_reports_errno() {
        let err = get_int(-1, libc::SOL_SOCKET, libc::SO_TYPE, "getsockopt(SO_TYPE)").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
        let err = setsockopt(-1, IPPROTO_SCTP, 0, &[0u8; 4], "setsockopt").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
