//! SCTP socket lifecycle: creation, multi-address bind and connect, listen,
//! peel-off, shutdown and idempotent close.

use std::fmt;
use std::io;
use std::net::{self, SocketAddr};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use socket2::{Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::addr::{self, Family};
use crate::consts::{self, IPPROTO_SCTP};
use crate::error::{DecodeError, SctpError, SctpResult};
use crate::info::{AssociationId, SndRcvInfo};
use crate::io::Message;
use crate::sys::{self, Readiness};
use crate::wire::{WireReader, WireWriter};

/// Socket style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SocketKind {
    /// `SOCK_SEQPACKET`: many associations share one descriptor.
    #[default]
    OneToMany,
    /// `SOCK_STREAM`: one association per descriptor.
    OneToOne,
}

impl SocketKind {
    /// The `SOCK_*` constant.
    pub fn as_raw(self) -> i32 {
        match self {
            SocketKind::OneToMany => libc::SOCK_SEQPACKET,
            SocketKind::OneToOne => libc::SOCK_STREAM,
        }
    }

    fn socket_type(self) -> Type {
        match self {
            SocketKind::OneToMany => Type::SEQPACKET,
            SocketKind::OneToOne => Type::STREAM,
        }
    }
}

/// Lifecycle state with respect to associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SocketState {
    /// Fresh socket.
    Unbound,
    /// Local addresses assigned.
    Bound,
    /// Accepting associations.
    Listening,
    /// Connected, or peeled off from a one-to-many socket.
    Connected,
    /// Descriptor released.
    Closed,
}

/// Whether `bindx` adds or removes addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindFlags {
    /// `SCTP_BINDX_ADD_ADDR`
    #[default]
    Add,
    /// `SCTP_BINDX_REM_ADDR`
    Remove,
}

/// Arguments of [`SctpSocket::bindx`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BindOptions {
    /// Local addresses; empty binds the wildcard address.
    pub addresses: Vec<String>,
    /// Port, 0 for an ephemeral one.
    pub port: u16,
    /// Add or remove.
    pub flags: BindFlags,
    /// Set `SO_REUSEADDR` before binding.
    pub reuse_addr: bool,
}

/// How to shut a socket down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// No more receives.
    Read,
    /// No more sends; starts the graceful SCTP shutdown.
    Write,
    /// Both directions.
    Both,
}

impl From<Shutdown> for net::Shutdown {
    fn from(how: Shutdown) -> Self {
        match how {
            Shutdown::Read => net::Shutdown::Read,
            Shutdown::Write => net::Shutdown::Write,
            Shutdown::Both => net::Shutdown::Both,
        }
    }
}

/// Arguments of [`SctpSocket::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CloseOptions {
    /// `SO_LINGER` seconds; `Some(0)` aborts associations instead of shutting them down.
    pub linger: Option<u32>,
    /// Set `SO_REUSEADDR` so the port can be rebound immediately.
    pub reuse_addr: bool,
}

#[derive(Debug)]
struct SocketInner {
    association_id: AssociationId,
    port: u16,
    state: SocketState,
    default_send: Option<SndRcvInfo>,
    initial_message: Option<Message>,
    extended_recv: bool,
}

/// An SCTP socket.
///
/// Owns one kernel descriptor. All methods take `&self`; the socket can be
/// shared between a reader and a writer thread. Closing is idempotent and
/// interrupts any send or receive blocked on the socket.
pub struct SctpSocket {
    socket: Mutex<Option<Socket>>,
    wake: OwnedFd,
    family: Family,
    kind: SocketKind,
    inner: Mutex<SocketInner>,
}

impl SctpSocket {
    /// Creates a socket of the given family and style.
    pub fn new(family: Family, kind: SocketKind) -> SctpResult<Self> {
        let socket = Socket::new(
            family.domain(),
            kind.socket_type(),
            Some(Protocol::from(IPPROTO_SCTP)),
        )
        .map_err(|e| SctpError::syscall("socket", e))?;
        let fd = socket.as_raw_fd();
        let socket = Self::from_parts(socket, family, kind, AssociationId::IMPLICIT, SocketState::Unbound)?;
        debug!(fd, family = family.name(), kind = ?kind, "sctp socket created");
        Ok(socket)
    }

    fn from_parts(
        socket: Socket,
        family: Family,
        kind: SocketKind,
        association_id: AssociationId,
        state: SocketState,
    ) -> SctpResult<Self> {
        let wake = sys::eventfd()?;
        Ok(Self {
            socket: Mutex::new(Some(socket)),
            wake,
            family,
            kind,
            inner: Mutex::new(SocketInner {
                association_id,
                port: 0,
                state,
                default_send: None,
                initial_message: None,
                extended_recv: false,
            }),
        })
    }

    /// Address family.
    pub fn family(&self) -> Family {
        self.family
    }

    /// Socket style.
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Association id cached by the last successful connect or peel-off; 0 before that.
    pub fn association_id(&self) -> AssociationId {
        self.inner.lock().association_id
    }

    /// Local port recorded by the last successful bind; 0 before that.
    pub fn port(&self) -> u16 {
        self.inner.lock().port
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SocketState {
        self.inner.lock().state
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.socket.lock().is_none()
    }

    /// The descriptor, or [`SctpError::Closed`].
    pub(crate) fn fd(&self) -> SctpResult<RawFd> {
        self.socket
            .lock()
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(SctpError::Closed)
    }

    /// Runs a short, non-blocking call against the open socket.
    fn with_socket<T>(
        &self,
        call: &'static str,
        op: impl FnOnce(&Socket) -> io::Result<T>,
    ) -> SctpResult<T> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(SctpError::Closed)?;
        op(socket).map_err(|e| SctpError::syscall(call, e))
    }

    /// Raw association id for an association-scoped option; `None` means the cached one.
    pub(crate) fn resolve_assoc(&self, assoc: Option<AssociationId>) -> i32 {
        assoc.unwrap_or_else(|| self.association_id()).as_raw()
    }

    pub(crate) fn set_state(&self, state: SocketState) {
        self.inner.lock().state = state;
    }

    pub(crate) fn cached_send_defaults(&self) -> Option<SndRcvInfo> {
        self.inner.lock().default_send
    }

    pub(crate) fn cache_send_defaults(&self, params: SndRcvInfo) {
        self.inner.lock().default_send = Some(params);
    }

    pub(crate) fn extended_recv(&self) -> bool {
        self.inner.lock().extended_recv
    }

    pub(crate) fn set_extended_recv(&self) {
        self.inner.lock().extended_recv = true;
    }

    pub(crate) fn stash_initial_message(&self, message: Message) {
        self.inner.lock().initial_message = Some(message);
    }

    /// Takes the message that triggered an accept; yields it once.
    pub fn take_initial_message(&self) -> Option<Message> {
        self.inner.lock().initial_message.take()
    }

    /// Runs `op` without blocking and, while it reports `EAGAIN`, parks on
    /// the socket until it is ready for `events` or the socket is closed.
    /// With `MSG_DONTWAIT` in `flags` the first `EAGAIN` is returned.
    pub(crate) fn blocking<T>(
        &self,
        call: &'static str,
        events: libc::c_short,
        flags: i32,
        mut op: impl FnMut(RawFd, i32) -> SctpResult<T>,
    ) -> SctpResult<T> {
        let fd = self.fd()?;
        if flags & libc::MSG_DONTWAIT != 0 {
            return op(fd, flags);
        }
        loop {
            match op(fd, flags | libc::MSG_DONTWAIT) {
                Err(e) if e.is_would_block() => {}
                Err(_) if self.is_closed() => {
                    return Err(SctpError::from_errno(call, libc::ECONNABORTED));
                }
                other => return other,
            }
            let woken = sys::wait(fd, events, self.wake.as_raw_fd())? == Readiness::Woken;
            if woken || self.is_closed() {
                debug!(fd, call, "blocked call interrupted by close");
                return Err(SctpError::from_errno(call, libc::ECONNABORTED));
            }
        }
    }

    /// Adds or removes local addresses (`sctp_bindx`). Returns the bound port.
    ///
    /// An empty address list binds the wildcard address; port 0 is resolved
    /// to the port the kernel assigned.
    pub fn bindx(&self, options: &BindOptions) -> SctpResult<u16> {
        let fd = self.fd()?;
        let packed = addr::encode(&options.addresses, options.port, self.family)?;
        if options.reuse_addr {
            self.with_socket("setsockopt(SO_REUSEADDR)", |s| s.set_reuse_address(true))?;
        }
        let (name, call) = match options.flags {
            BindFlags::Add => (consts::SCTP_SOCKOPT_BINDX_ADD, "sctp_bindx(add)"),
            BindFlags::Remove => (consts::SCTP_SOCKOPT_BINDX_REM, "sctp_bindx(remove)"),
        };
        sys::setsockopt(fd, IPPROTO_SCTP, name, &packed, call)?;

        let port = match options.port {
            0 => self.local_addr()?.port(),
            p => p,
        };
        if options.flags == BindFlags::Add {
            let mut inner = self.inner.lock();
            inner.port = port;
            if inner.state == SocketState::Unbound {
                inner.state = SocketState::Bound;
            }
        }
        debug!(fd, port, addresses = ?options.addresses, flags = ?options.flags, "sctp bindx");
        Ok(port)
    }

    /// Primary local address (`getsockname`).
    pub fn local_addr(&self) -> SctpResult<SocketAddr> {
        let raw = self.with_socket("getsockname", Socket::local_addr)?;
        raw.as_socket().ok_or_else(|| {
            DecodeError::Malformed {
                kind: "sockaddr",
                reason: format!("unsupported address family {}", raw.family()),
            }
            .into()
        })
    }

    /// Connects to a multi-homed peer (`sctp_connectx`) and caches the new association id.
    pub fn connectx<S: AsRef<str>>(&self, addresses: &[S], port: u16) -> SctpResult<AssociationId> {
        if addresses.is_empty() {
            return Err(SctpError::invalid_argument("at least one address is required"));
        }
        if port == 0 {
            return Err(SctpError::invalid_argument("port is required"));
        }
        let fd = self.fd()?;
        let packed = addr::encode(addresses, port, self.family)?;
        let raw = sys::setsockopt(fd, IPPROTO_SCTP, consts::SCTP_SOCKOPT_CONNECTX, &packed, "sctp_connectx")?;
        let id = AssociationId(raw);
        {
            let mut inner = self.inner.lock();
            inner.association_id = id;
            inner.state = SocketState::Connected;
        }
        debug!(fd, association_id = %id, port, "sctp connectx");
        Ok(id)
    }

    /// Starts accepting associations.
    pub fn listen(&self, backlog: i32) -> SctpResult<()> {
        let fd = self.fd()?;
        self.with_socket("listen", |s| s.listen(backlog))?;
        self.set_state(SocketState::Listening);
        debug!(fd, backlog, "sctp listen");
        Ok(())
    }

    /// Shuts down one or both directions without releasing the descriptor.
    pub fn shutdown(&self, how: Shutdown) -> SctpResult<()> {
        let fd = self.fd()?;
        self.with_socket("shutdown", |s| s.shutdown(how.into()))?;
        debug!(fd, how = ?how, "sctp shutdown");
        Ok(())
    }

    /// Releases the descriptor. Further calls are no-ops.
    ///
    /// Threads blocked in a send or receive on this socket return an
    /// `ECONNABORTED` system-call error.
    pub fn close(&self, options: &CloseOptions) -> SctpResult<()> {
        let Some(socket) = self.socket.lock().take() else {
            return Ok(());
        };
        let fd = socket.as_raw_fd();
        if let Some(secs) = options.linger {
            if let Err(e) = socket.set_linger(Some(Duration::from_secs(secs.into()))) {
                warn!(fd, error = %e, "failed to set linger before close");
            }
        }
        if options.reuse_addr {
            if let Err(e) = socket.set_reuse_address(true) {
                warn!(fd, error = %e, "failed to set reuse_addr before close");
            }
        }
        if let Err(e) = sys::signal(self.wake.as_raw_fd()) {
            warn!(fd, error = %e, "failed to wake blocked callers");
        }
        self.set_state(SocketState::Closed);
        drop(socket);
        debug!(fd, "sctp socket closed");
        Ok(())
    }

    /// Addresses of the peer of `assoc` (`sctp_getpaddrs`).
    pub fn peer_addresses(&self, assoc: Option<AssociationId>) -> SctpResult<Vec<SocketAddr>> {
        self.addresses(consts::SCTP_GET_PEER_ADDRS, assoc, "sctp_getpaddrs")
    }

    /// Local addresses used by `assoc`, or by the endpoint for id 0 (`sctp_getladdrs`).
    pub fn local_addresses(&self, assoc: Option<AssociationId>) -> SctpResult<Vec<SocketAddr>> {
        self.addresses(consts::SCTP_GET_LOCAL_ADDRS, assoc, "sctp_getladdrs")
    }

    fn addresses(
        &self,
        name: i32,
        assoc: Option<AssociationId>,
        call: &'static str,
    ) -> SctpResult<Vec<SocketAddr>> {
        const ADDR_BUF: usize = 16 * 1024;
        let fd = self.fd()?;
        let mut buf = vec![0u8; ADDR_BUF];
        buf[0..4].copy_from_slice(&self.resolve_assoc(assoc).to_ne_bytes());
        let len = sys::getsockopt(fd, IPPROTO_SCTP, name, &mut buf, call)?;
        let r = WireReader::new(&buf[..len], "sctp_getaddrs");
        let count = r.u32_at(4)? as usize;
        Ok(addr::decode_all(r.rest(8), count)?)
    }

    /// Detaches `assoc` into a new one-to-one socket (`sctp_peeloff`).
    ///
    /// The new descriptor is close-on-exec, like every socket this crate opens.
    pub fn peel_off(&self, assoc: AssociationId) -> SctpResult<SctpSocket> {
        if self.kind != SocketKind::OneToMany {
            return Err(SctpError::invalid_state("peel-off requires a one-to-many socket"));
        }
        let fd = self.fd()?;
        let socket = peel_off_fd(fd, assoc)?;
        let new_fd = socket.as_raw_fd();
        let peeled = Self::from_parts(socket, self.family, SocketKind::OneToOne, assoc, SocketState::Connected)?;
        peeled.inner.lock().port = self.port();
        debug!(fd, new_fd, association_id = %assoc, "sctp peel-off");
        Ok(peeled)
    }
}

/// `SCTP_SOCKOPT_PEELOFF_FLAGS` with `SOCK_CLOEXEC`; kernels older than 4.13
/// lack it, so fall back to the plain peel-off and set the flag afterwards.
fn peel_off_fd(fd: RawFd, assoc: AssociationId) -> SctpResult<Socket> {
    let mut w = WireWriter::zeroed(12);
    w.put_i32(0, assoc.as_raw()).put_u32(8, libc::SOCK_CLOEXEC as u32);
    let mut buf = w.finish();
    match sys::getsockopt(fd, IPPROTO_SCTP, consts::SCTP_SOCKOPT_PEELOFF_FLAGS, &mut buf, "sctp_peeloff_flags") {
        Ok(_) => return adopt(&buf),
        Err(e) if e.raw_os_error() == Some(libc::ENOPROTOOPT) => {}
        Err(e) => return Err(e),
    }
    let mut buf = buf[..8].to_vec();
    sys::getsockopt(fd, IPPROTO_SCTP, consts::SCTP_SOCKOPT_PEELOFF, &mut buf, "sctp_peeloff")?;
    let socket = adopt(&buf)?;
    socket
        .set_cloexec(true)
        .map_err(|e| SctpError::syscall("fcntl(FD_CLOEXEC)", e))?;
    Ok(socket)
}

/// Takes ownership of the descriptor the kernel wrote into a peel-off argument.
fn adopt(buf: &[u8]) -> SctpResult<Socket> {
    let new_fd = WireReader::new(buf, "peeloff").i32_at(4)?;
    if new_fd < 0 {
        return Err(SctpError::from_errno("sctp_peeloff", libc::EBADF));
    }
    // SAFETY: a successful peel-off hands back a fresh descriptor owned by the caller.
    Ok(unsafe { Socket::from_raw_fd(new_fd) })
}

impl AsRawFd for SctpSocket {
    /// The descriptor, or -1 once closed.
    fn as_raw_fd(&self) -> RawFd {
        self.socket.lock().as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }
}

impl fmt::Debug for SctpSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fd = self.as_raw_fd();
        let inner = self.inner.lock();
        f.debug_struct("SctpSocket")
            .field("fd", &fd)
            .field("family", &self.family)
            .field("kind", &self.kind)
            .field("association_id", &inner.association_id)
            .field("port", &inner.port)
            .field("state", &inner.state)
            .finish()
    }
}

impl Drop for SctpSocket {
    fn drop(&mut self) {
        if let Err(e) = self.close(&CloseOptions::default()) {
            debug!(error = %e, "close on drop failed");
        }
    }
}
