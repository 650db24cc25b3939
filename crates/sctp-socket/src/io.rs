//! Message I/O core.
//!
//! Scalar and vectored send, scalar and vectored receive. Every receive
//! yields either a data [`Message`] or a [`Notification`], chosen by the
//! `MSG_NOTIFICATION` bit the kernel sets on the read, never by inspecting
//! the payload.

use std::net::SocketAddr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use socket2::SockAddr;
use tracing::trace;

use crate::addr::{self, Family};
use crate::consts;
use crate::error::{SctpError, SctpResult};
use crate::info::{AssociationId, AuthInfo, NxtInfo, PrInfo, RcvInfo, SendFlags, SndInfo, SndRcvInfo};
use crate::notification::Notification;
use crate::socket::SctpSocket;
use crate::sys::{self, ControlMessages, RecvOutcome};

/// Receive buffer size used when the caller has no better estimate.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Room for every control message a receive can carry.
const RECV_CONTROL_SPACE: usize = 256;

bitflags! {
    /// `MSG_*` flags passed to and returned from a receive.
    ///
    /// Bits not named here are retained as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RecvFlags: i32 {
        /// Fail with `EAGAIN` instead of blocking.
        const DONTWAIT = libc::MSG_DONTWAIT;
        /// Leave the data queued.
        const PEEK = libc::MSG_PEEK;
        /// The read completed a message.
        const EOR = libc::MSG_EOR;
        /// The message did not fit the buffer.
        const TRUNC = libc::MSG_TRUNC;
        /// Control data did not fit.
        const CTRUNC = libc::MSG_CTRUNC;
        /// The read returned a notification, not data.
        const NOTIFICATION = consts::MSG_NOTIFICATION;
    }
}

/// Metadata for [`SctpSocket::send`].
///
/// Fields left `None` inherit the socket's default send parameters, then zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    /// Stream id.
    pub stream: Option<u16>,
    /// Payload protocol identifier.
    pub ppid: Option<u32>,
    /// Context tag echoed in send-failure notifications.
    pub context: Option<u32>,
    /// Delivery flags.
    pub flags: Option<SendFlags>,
    /// Lifetime in milliseconds; sent with the timed-reliability policy.
    pub ttl: Option<u32>,
    /// Target association on a one-to-many socket.
    pub association_id: Option<AssociationId>,
    /// Explicit destination addresses; the first is the primary.
    pub addresses: Vec<String>,
    /// Destination port, required with `addresses`.
    pub port: Option<u16>,
    /// Fail with `EAGAIN` instead of blocking.
    pub nonblocking: bool,
}

/// Metadata for [`SctpSocket::send_vectored`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendvOptions {
    /// Fields shared with [`SendOptions`].
    #[serde(flatten)]
    pub send: SendOptions,
    /// Shared key number to authenticate this message with.
    pub auth_key: Option<u16>,
}

impl SendOptions {
    fn resolve(&self, socket: &SctpSocket) -> SndRcvInfo {
        let defaults = socket.cached_send_defaults().unwrap_or_default();
        let cached = socket.association_id();
        let association_id = self.association_id.unwrap_or(if cached.is_implicit() {
            defaults.association_id
        } else {
            cached
        });
        SndRcvInfo {
            stream: self.stream.unwrap_or(defaults.stream),
            flags: self.flags.unwrap_or(defaults.flags),
            ppid: self.ppid.unwrap_or(defaults.ppid),
            context: self.context.unwrap_or(defaults.context),
            ttl: self.ttl.unwrap_or(defaults.ttl),
            association_id,
            ..Default::default()
        }
    }

    fn destinations(&self, family: Family) -> SctpResult<Vec<SocketAddr>> {
        if self.addresses.is_empty() {
            return Ok(Vec::new());
        }
        let port = self
            .port
            .ok_or_else(|| SctpError::invalid_argument("port is required when addresses are given"))?;
        addr::resolve(&self.addresses, port, family)
    }

    /// An empty payload is only meaningful as an EOF or ABORT request.
    fn check_payload(&self, defaults: Option<SndRcvInfo>, empty: bool) -> SctpResult<()> {
        let flags = self
            .flags
            .or_else(|| defaults.map(|d| d.flags))
            .unwrap_or_default();
        if empty && !flags.intersects(SendFlags::EOF | SendFlags::ABORT) {
            return Err(SctpError::invalid_argument("message must not be empty"));
        }
        Ok(())
    }

    fn raw_flags(&self) -> i32 {
        if self.nonblocking {
            libc::MSG_DONTWAIT
        } else {
            0
        }
    }
}

/// Puts the first destination in `msg_name` and the rest in
/// `SCTP_DSTADDRV4`/`SCTP_DSTADDRV6` control messages.
fn attach_destinations(control: &mut ControlMessages, dests: &[SocketAddr]) -> Option<SockAddr> {
    let (first, rest) = dests.split_first()?;
    for extra in rest {
        match extra {
            SocketAddr::V4(v4) => control.push(consts::SCTP_DSTADDRV4, v4.ip().octets().to_vec()),
            SocketAddr::V6(v6) => control.push(consts::SCTP_DSTADDRV6, v6.ip().octets().to_vec()),
        }
    }
    Some(SockAddr::from(*first))
}

/// Metadata of a received data message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReceiveInfo {
    /// Stream id.
    pub stream: u16,
    /// Stream sequence number.
    pub ssn: u16,
    /// Delivery flags.
    pub flags: SendFlags,
    /// Payload protocol identifier.
    pub ppid: u32,
    /// Context tag.
    pub context: u32,
    /// Transmission sequence number.
    pub tsn: u32,
    /// Cumulative TSN.
    pub cumtsn: u32,
    /// Originating association.
    pub association_id: AssociationId,
}

impl From<SndRcvInfo> for ReceiveInfo {
    fn from(i: SndRcvInfo) -> Self {
        Self {
            stream: i.stream,
            ssn: i.ssn,
            flags: i.flags,
            ppid: i.ppid,
            context: i.context,
            tsn: i.tsn,
            cumtsn: i.cumtsn,
            association_id: i.association_id,
        }
    }
}

impl From<RcvInfo> for ReceiveInfo {
    fn from(i: RcvInfo) -> Self {
        Self {
            stream: i.stream,
            ssn: i.ssn,
            flags: i.flags,
            ppid: i.ppid,
            context: i.context,
            tsn: i.tsn,
            cumtsn: i.cumtsn,
            association_id: i.association_id,
        }
    }
}

/// A received data message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Per-message metadata; `None` unless data-io events (or extended
    /// receive info) are enabled.
    pub info: Option<ReceiveInfo>,
    /// Preview of the next queued message, from vectored receives.
    pub next: Option<NxtInfo>,
    /// Sender address.
    pub from: Option<SocketAddr>,
    /// Flags the kernel set on the read.
    pub flags: RecvFlags,
}

impl Message {
    /// Originating association, when metadata was received.
    pub fn association_id(&self) -> Option<AssociationId> {
        self.info.map(|i| i.association_id)
    }

    /// Stream the message arrived on, when metadata was received.
    pub fn stream(&self) -> Option<u16> {
        self.info.map(|i| i.stream)
    }

    /// True when this read completed the message.
    pub fn is_complete(&self) -> bool {
        self.flags.contains(RecvFlags::EOR)
    }
}

/// Result of one receive: data or an event, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Application data.
    Message(Message),
    /// A kernel event.
    Notification(Notification),
}

impl Received {
    /// True for an event.
    pub fn is_notification(&self) -> bool {
        matches!(self, Received::Notification(_))
    }

    /// Association the data or event refers to, when known.
    pub fn association_id(&self) -> Option<AssociationId> {
        match self {
            Received::Message(m) => m.association_id(),
            Received::Notification(n) => n.association_id(),
        }
    }

    /// The data message, if this is one.
    pub fn into_message(self) -> Option<Message> {
        match self {
            Received::Message(m) => Some(m),
            Received::Notification(_) => None,
        }
    }

    /// The event, if this is one.
    pub fn into_notification(self) -> Option<Notification> {
        match self {
            Received::Notification(n) => Some(n),
            Received::Message(_) => None,
        }
    }
}

/// Operations available on this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// [`SctpSocket::send_vectored`] is present.
    pub send_vectored: bool,
    /// [`SctpSocket::recv_vectored`] is present.
    pub recv_vectored: bool,
}

/// Reports which optional operations this build provides.
pub const fn capabilities() -> Capabilities {
    Capabilities {
        send_vectored: true,
        recv_vectored: cfg!(target_os = "linux"),
    }
}

fn check_buffer_size(buffer_size: usize) -> SctpResult<()> {
    if buffer_size == 0 {
        return Err(SctpError::invalid_argument("buffer size must be positive"));
    }
    Ok(())
}

impl SctpSocket {
    /// Sends one message (`sctp_sendmsg`). Returns the bytes sent.
    ///
    /// An empty payload is rejected unless the flags ask for EOF or ABORT.
    pub fn send(&self, payload: &[u8], options: &SendOptions) -> SctpResult<usize> {
        options.check_payload(self.cached_send_defaults(), payload.is_empty())?;
        let dests = options.destinations(self.family())?;
        self.fd()?;
        let info = options.resolve(self);

        let mut control = ControlMessages::new();
        control.push(consts::SCTP_SNDRCV, info.encode());
        if info.ttl > 0 {
            control.push(consts::SCTP_PRINFO, PrInfo::ttl(info.ttl).encode());
        }
        let name = attach_destinations(&mut control, &dests);

        let sent = self.blocking("sendmsg", libc::POLLOUT, options.raw_flags(), |fd, flags| {
            sys::sendmsg(fd, name.as_ref(), &[payload], &control, flags)
        })?;
        trace!(
            bytes = sent,
            stream = info.stream,
            association_id = %info.association_id,
            "sctp send"
        );
        Ok(sent)
    }

    /// Sends the concatenation of `parts` as one message (`sctp_sendv`).
    ///
    /// Returns the bytes sent, the sum of the part lengths on success. At
    /// least one part must be non-empty unless the flags ask for EOF or ABORT.
    pub fn send_vectored<B: AsRef<[u8]>>(
        &self,
        parts: &[B],
        options: &SendvOptions,
    ) -> SctpResult<usize> {
        if parts.is_empty() {
            return Err(SctpError::invalid_argument("Must contain at least one message"));
        }
        let empty = parts.iter().all(|p| p.as_ref().is_empty());
        options.send.check_payload(self.cached_send_defaults(), empty)?;
        let dests = options.send.destinations(self.family())?;
        self.fd()?;
        let info = options.send.resolve(self);

        let mut control = ControlMessages::new();
        let snd = SndInfo {
            stream: info.stream,
            flags: info.flags,
            ppid: info.ppid,
            context: info.context,
            association_id: info.association_id,
        };
        control.push(consts::SCTP_SNDINFO, snd.encode());
        if info.ttl > 0 {
            control.push(consts::SCTP_PRINFO, PrInfo::ttl(info.ttl).encode());
        }
        if let Some(key_number) = options.auth_key {
            control.push(consts::SCTP_AUTHINFO, AuthInfo { key_number }.encode());
        }
        let name = attach_destinations(&mut control, &dests);
        let slices: Vec<&[u8]> = parts.iter().map(AsRef::as_ref).collect();

        let sent = self.blocking("sendmsg", libc::POLLOUT, options.send.raw_flags(), |fd, flags| {
            sys::sendmsg(fd, name.as_ref(), &slices, &control, flags)
        })?;
        trace!(
            bytes = sent,
            parts = parts.len(),
            stream = info.stream,
            association_id = %info.association_id,
            "sctp sendv"
        );
        Ok(sent)
    }

    /// Receives one message or notification (`sctp_recvmsg`).
    ///
    /// `buffer_size` bounds the bytes returned; longer messages arrive in
    /// several reads, the last one flagged [`RecvFlags::EOR`].
    pub fn recv(&self, flags: RecvFlags, buffer_size: usize) -> SctpResult<Received> {
        check_buffer_size(buffer_size)?;
        self.fd()?;
        let mut buf = vec![0u8; buffer_size];
        let outcome = self.blocking("recvmsg", libc::POLLIN, flags.bits(), |fd, fl| {
            sys::recvmsg(fd, &mut buf, RECV_CONTROL_SPACE, fl)
        })?;
        decode_received(buf, outcome, false, self.is_closed())
    }

    /// Receives one message or notification with the extended receive info
    /// (`sctp_recvv`): TSN, cumulative TSN, SSN and a preview of the next message.
    #[cfg(target_os = "linux")]
    pub fn recv_vectored(&self, flags: RecvFlags, buffer_size: usize) -> SctpResult<Received> {
        check_buffer_size(buffer_size)?;
        let fd = self.fd()?;
        if !self.extended_recv() {
            sys::set_int(fd, consts::IPPROTO_SCTP, consts::SCTP_RECVRCVINFO, 1, "setsockopt(SCTP_RECVRCVINFO)")?;
            sys::set_int(fd, consts::IPPROTO_SCTP, consts::SCTP_RECVNXTINFO, 1, "setsockopt(SCTP_RECVNXTINFO)")?;
            self.set_extended_recv();
        }
        let mut buf = vec![0u8; buffer_size];
        let outcome = self.blocking("recvmsg", libc::POLLIN, flags.bits(), |fd, fl| {
            sys::recvmsg(fd, &mut buf, RECV_CONTROL_SPACE, fl)
        })?;
        decode_received(buf, outcome, true, self.is_closed())
    }
}

/// Turns one `recvmsg` into data or a notification, by the `MSG_NOTIFICATION`
/// bit alone. `closed` picks the errno for an empty read.
///
/// Both metadata records are accepted whichever call made the read: once
/// extended receive info is switched on the kernel sends `SCTP_RCVINFO` to
/// scalar receives too.
fn decode_received(
    mut buf: Vec<u8>,
    outcome: RecvOutcome,
    extended: bool,
    closed: bool,
) -> SctpResult<Received> {
    buf.truncate(outcome.len.min(buf.len()));
    let flags = RecvFlags::from_bits_retain(outcome.flags);

    if flags.contains(RecvFlags::NOTIFICATION) {
        let notification = Notification::decode(&buf)?;
        trace!(kind = notification.kind_name(), bytes = buf.len(), "sctp notification");
        return Ok(Received::Notification(notification));
    }
    if buf.is_empty() && outcome.control.is_empty() {
        let errno = if closed {
            libc::ECONNABORTED
        } else {
            libc::ECONNRESET
        };
        return Err(SctpError::from_errno("recvmsg", errno));
    }

    let rcv = outcome
        .control(consts::SCTP_RCVINFO)
        .map(RcvInfo::decode)
        .transpose()?
        .map(ReceiveInfo::from);
    let sndrcv = outcome
        .control(consts::SCTP_SNDRCV)
        .map(SndRcvInfo::decode)
        .transpose()?
        .map(ReceiveInfo::from);
    let info = if extended { rcv.or(sndrcv) } else { sndrcv.or(rcv) };
    let next = outcome
        .control(consts::SCTP_NXTINFO)
        .map(NxtInfo::decode)
        .transpose()?;
    let from = if outcome.name.len() >= 2 {
        addr::decode_storage(&outcome.name)?
    } else {
        None
    };

    let message = Message {
        data: buf,
        info,
        next,
        from,
        flags,
    };
    trace!(
        bytes = message.data.len(),
        stream = ?message.stream(),
        association_id = ?message.association_id(),
        "sctp recv"
    );
    Ok(Received::Message(message))
}
