//! Notification decoder.
//!
//! The kernel delivers events in-band, flagged with `MSG_NOTIFICATION`, as a
//! tagged union: an 8-byte header (`type: u16`, `flags: u16`, `length: u32`)
//! followed by a layout chosen by `type`. Each kind is decoded by its own
//! function from fixed offsets, every read bounds-checked against the buffer
//! actually received. Only remote-error and send-failed events carry a
//! variable data tail; its length is derived from the header and clamped to
//! [`MAX_NOTIFICATION_DATA`] and to the received length, so a corrupted
//! `length` field can never cause an over-read.

use std::net::SocketAddr;

use serde::Serialize;
use tracing::{debug, warn};

use crate::addr;
use crate::consts::{self, MAX_NOTIFICATION_DATA, SOCKADDR_STORAGE_SIZE};
use crate::error::DecodeError;
use crate::info::{AssociationId, SndInfo, SndRcvInfo};
use crate::wire::WireReader;

/// Size of the shared notification header.
pub const HEADER_SIZE: usize = 8;

/// Fields common to every notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationHeader {
    /// Raw `sn_type` discriminant.
    pub kind: u16,
    /// Kind-specific flags.
    pub flags: u16,
    /// Total length claimed by the kernel, header included.
    pub length: u32,
}

impl NotificationHeader {
    /// Decodes the header at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "notification header");
        r.require(HEADER_SIZE)?;
        Ok(Self {
            kind: r.u16_at(0)?,
            flags: r.u16_at(2)?,
            length: r.u32_at(4)?,
        })
    }
}

/// Length of the variable tail following a fixed layout of `fixed` bytes.
///
/// `clamp(length - fixed, 0, MAX_NOTIFICATION_DATA)`, further limited to the
/// bytes actually present after the fixed layout.
pub fn tail_len(length: u32, fixed: usize, available: usize) -> usize {
    let claimed = (length as usize).saturating_sub(fixed);
    claimed
        .min(MAX_NOTIFICATION_DATA)
        .min(available.saturating_sub(fixed))
}

fn copy_tail(r: &WireReader<'_>, header: &NotificationHeader, fixed: usize) -> Vec<u8> {
    let claimed = (header.length as usize).saturating_sub(fixed);
    let len = tail_len(header.length, fixed, r.len());
    if claimed > MAX_NOTIFICATION_DATA {
        warn!(
            kind = header.kind,
            claimed,
            max = MAX_NOTIFICATION_DATA,
            "notification data clamped"
        );
    } else if len < claimed {
        debug!(kind = header.kind, claimed, len, "notification data cut short by buffer");
    }
    r.rest(fixed)[..len].to_vec()
}

/// `sac_state` of an association-change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssocChangeState {
    /// A new association is ready.
    CommUp,
    /// The association failed.
    CommLost,
    /// The peer restarted.
    Restart,
    /// Graceful shutdown completed.
    ShutdownComplete,
    /// Association setup failed.
    CantStartAssociation,
    /// A state this library does not know.
    Other(u16),
}

impl From<u16> for AssocChangeState {
    fn from(raw: u16) -> Self {
        match raw {
            consts::SCTP_COMM_UP => Self::CommUp,
            consts::SCTP_COMM_LOST => Self::CommLost,
            consts::SCTP_RESTART => Self::Restart,
            consts::SCTP_SHUTDOWN_COMP => Self::ShutdownComplete,
            consts::SCTP_CANT_STR_ASSOC => Self::CantStartAssociation,
            other => Self::Other(other),
        }
    }
}

impl AssocChangeState {
    /// True when the association no longer exists.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CommLost | Self::ShutdownComplete | Self::CantStartAssociation
        )
    }
}

/// `spc_state` of a peer-address-change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PeerAddrState {
    /// The address is reachable.
    Available,
    /// The address is unreachable.
    Unreachable,
    /// The address was removed from the association.
    Removed,
    /// The address was added to the association.
    Added,
    /// The address became the primary path.
    MadePrimary,
    /// The address was confirmed.
    Confirmed,
    /// The path is potentially failed.
    PotentiallyFailed,
    /// A state this library does not know.
    Other(i32),
}

impl From<i32> for PeerAddrState {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::Available,
            1 => Self::Unreachable,
            2 => Self::Removed,
            3 => Self::Added,
            4 => Self::MadePrimary,
            5 => Self::Confirmed,
            6 => Self::PotentiallyFailed,
            other => Self::Other(other),
        }
    }
}

/// Association came up, went down or restarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssocChange {
    /// Shared header.
    pub header: NotificationHeader,
    /// New state.
    pub state: AssocChangeState,
    /// Error cause, if any.
    pub error: u16,
    /// Outbound stream count.
    pub outbound_streams: u16,
    /// Inbound stream count.
    pub inbound_streams: u16,
    /// Affected association.
    pub association_id: AssociationId,
}

/// A peer transport address changed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerAddrChange {
    /// Shared header.
    pub header: NotificationHeader,
    /// The affected peer address, when the kernel supplied one.
    pub address: Option<SocketAddr>,
    /// New state.
    pub state: PeerAddrState,
    /// Error cause, if any.
    pub error: i32,
    /// Affected association.
    pub association_id: AssociationId,
}

/// The peer reported an operation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteError {
    /// Shared header.
    pub header: NotificationHeader,
    /// Error cause code.
    pub error: u16,
    /// Affected association.
    pub association_id: AssociationId,
    /// Raw error chunk, bounded by [`MAX_NOTIFICATION_DATA`].
    pub data: Vec<u8>,
}

/// Metadata of the message a send-failed event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SendFailedInfo {
    /// Legacy `SCTP_SEND_FAILED` carries a `sctp_sndrcvinfo`.
    SndRcv(SndRcvInfo),
    /// `SCTP_SEND_FAILED_EVENT` carries a `sctp_sndinfo`.
    Snd(SndInfo),
}

/// A message could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendFailed {
    /// Shared header.
    pub header: NotificationHeader,
    /// Error cause.
    pub error: u32,
    /// Metadata of the undelivered message.
    pub info: SendFailedInfo,
    /// Affected association.
    pub association_id: AssociationId,
    /// The undelivered payload, bounded by [`MAX_NOTIFICATION_DATA`].
    pub data: Vec<u8>,
}

/// The peer sent SHUTDOWN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownEvent {
    /// Shared header.
    pub header: NotificationHeader,
    /// Affected association.
    pub association_id: AssociationId,
}

/// Peer adaptation layer indication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adaptation {
    /// Shared header.
    pub header: NotificationHeader,
    /// Adaptation indication bits.
    pub indication: u32,
    /// Affected association.
    pub association_id: AssociationId,
}

/// Partial delivery of a message was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialDelivery {
    /// Shared header.
    pub header: NotificationHeader,
    /// Indication code.
    pub indication: u32,
    /// Stream of the aborted message.
    pub stream: u32,
    /// Sequence number of the aborted message.
    pub sequence: u32,
    /// Affected association.
    pub association_id: AssociationId,
}

/// Authentication key event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthKeyEvent {
    /// Shared header.
    pub header: NotificationHeader,
    /// Key number.
    pub key_number: u16,
    /// Alternate key number.
    pub alt_key_number: u16,
    /// `SCTP_AUTH_NEW_KEY` (0), `SCTP_AUTH_FREE_KEY` (1) or `SCTP_AUTH_NO_AUTH` (2).
    pub indication: u32,
    /// Affected association.
    pub association_id: AssociationId,
}

/// No user data remains queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderDry {
    /// Shared header.
    pub header: NotificationHeader,
    /// Affected association.
    pub association_id: AssociationId,
}

/// Streams were reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamReset {
    /// Shared header; `flags` says incoming/outgoing/denied/failed.
    pub header: NotificationHeader,
    /// Affected association.
    pub association_id: AssociationId,
    /// Reset stream ids; empty means all streams.
    pub streams: Vec<u16>,
}

/// The association's TSNs were reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssocReset {
    /// Shared header.
    pub header: NotificationHeader,
    /// Affected association.
    pub association_id: AssociationId,
    /// Next local TSN.
    pub local_tsn: u32,
    /// Next remote TSN.
    pub remote_tsn: u32,
}

/// Stream counts changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamChange {
    /// Shared header.
    pub header: NotificationHeader,
    /// Affected association.
    pub association_id: AssociationId,
    /// New inbound stream count.
    pub inbound_streams: u16,
    /// New outbound stream count.
    pub outbound_streams: u16,
}

/// A decoded notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notification {
    /// `SCTP_ASSOC_CHANGE`
    AssocChange(AssocChange),
    /// `SCTP_PEER_ADDR_CHANGE`
    PeerAddrChange(PeerAddrChange),
    /// `SCTP_REMOTE_ERROR`
    RemoteError(RemoteError),
    /// `SCTP_SEND_FAILED` or `SCTP_SEND_FAILED_EVENT`
    SendFailed(SendFailed),
    /// `SCTP_SHUTDOWN_EVENT`
    Shutdown(ShutdownEvent),
    /// `SCTP_ADAPTATION_INDICATION`
    Adaptation(Adaptation),
    /// `SCTP_PARTIAL_DELIVERY_EVENT`
    PartialDelivery(PartialDelivery),
    /// `SCTP_AUTHENTICATION_EVENT`
    Authentication(AuthKeyEvent),
    /// `SCTP_SENDER_DRY_EVENT`
    SenderDry(SenderDry),
    /// `SCTP_STREAM_RESET_EVENT`
    StreamReset(StreamReset),
    /// `SCTP_ASSOC_RESET_EVENT`
    AssocReset(AssocReset),
    /// `SCTP_STREAM_CHANGE_EVENT`
    StreamChange(StreamChange),
    /// A kind this library does not recognise; only the header is kept.
    Unknown(NotificationHeader),
}

impl Notification {
    /// Decodes one notification from the bytes a receive call returned.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let header = NotificationHeader::decode(buf)?;
        let n = match header.kind {
            consts::SCTP_ASSOC_CHANGE => Self::AssocChange(decode_assoc_change(buf, header)?),
            consts::SCTP_PEER_ADDR_CHANGE => {
                Self::PeerAddrChange(decode_peer_addr_change(buf, header)?)
            }
            consts::SCTP_REMOTE_ERROR => Self::RemoteError(decode_remote_error(buf, header)?),
            consts::SCTP_SEND_FAILED => Self::SendFailed(decode_send_failed(buf, header)?),
            consts::SCTP_SEND_FAILED_EVENT => {
                Self::SendFailed(decode_send_failed_event(buf, header)?)
            }
            consts::SCTP_SHUTDOWN_EVENT => Self::Shutdown(decode_shutdown(buf, header)?),
            consts::SCTP_ADAPTATION_INDICATION => {
                Self::Adaptation(decode_adaptation(buf, header)?)
            }
            consts::SCTP_PARTIAL_DELIVERY_EVENT => {
                Self::PartialDelivery(decode_partial_delivery(buf, header)?)
            }
            consts::SCTP_AUTHENTICATION_EVENT => {
                Self::Authentication(decode_authkey(buf, header)?)
            }
            consts::SCTP_SENDER_DRY_EVENT => Self::SenderDry(decode_sender_dry(buf, header)?),
            consts::SCTP_STREAM_RESET_EVENT => {
                Self::StreamReset(decode_stream_reset(buf, header)?)
            }
            consts::SCTP_ASSOC_RESET_EVENT => Self::AssocReset(decode_assoc_reset(buf, header)?),
            consts::SCTP_STREAM_CHANGE_EVENT => {
                Self::StreamChange(decode_stream_change(buf, header)?)
            }
            other => {
                warn!(kind = other, length = header.length, "unknown notification type");
                Self::Unknown(header)
            }
        };
        Ok(n)
    }

    /// The shared header.
    pub fn header(&self) -> &NotificationHeader {
        match self {
            Self::AssocChange(n) => &n.header,
            Self::PeerAddrChange(n) => &n.header,
            Self::RemoteError(n) => &n.header,
            Self::SendFailed(n) => &n.header,
            Self::Shutdown(n) => &n.header,
            Self::Adaptation(n) => &n.header,
            Self::PartialDelivery(n) => &n.header,
            Self::Authentication(n) => &n.header,
            Self::SenderDry(n) => &n.header,
            Self::StreamReset(n) => &n.header,
            Self::AssocReset(n) => &n.header,
            Self::StreamChange(n) => &n.header,
            Self::Unknown(h) => h,
        }
    }

    /// Association the event refers to; `None` for unknown kinds.
    pub fn association_id(&self) -> Option<AssociationId> {
        match self {
            Self::AssocChange(n) => Some(n.association_id),
            Self::PeerAddrChange(n) => Some(n.association_id),
            Self::RemoteError(n) => Some(n.association_id),
            Self::SendFailed(n) => Some(n.association_id),
            Self::Shutdown(n) => Some(n.association_id),
            Self::Adaptation(n) => Some(n.association_id),
            Self::PartialDelivery(n) => Some(n.association_id),
            Self::Authentication(n) => Some(n.association_id),
            Self::SenderDry(n) => Some(n.association_id),
            Self::StreamReset(n) => Some(n.association_id),
            Self::AssocReset(n) => Some(n.association_id),
            Self::StreamChange(n) => Some(n.association_id),
            Self::Unknown(_) => None,
        }
    }

    /// The variable data tail; empty for every kind except remote-error and send-failed.
    pub fn data(&self) -> &[u8] {
        match self {
            Self::RemoteError(n) => &n.data,
            Self::SendFailed(n) => &n.data,
            _ => &[],
        }
    }

    /// Short name of the event kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::AssocChange(_) => "assoc_change",
            Self::PeerAddrChange(_) => "peer_addr_change",
            Self::RemoteError(_) => "remote_error",
            Self::SendFailed(_) => "send_failed",
            Self::Shutdown(_) => "shutdown",
            Self::Adaptation(_) => "adaptation_indication",
            Self::PartialDelivery(_) => "partial_delivery",
            Self::Authentication(_) => "authentication",
            Self::SenderDry(_) => "sender_dry",
            Self::StreamReset(_) => "stream_reset",
            Self::AssocReset(_) => "assoc_reset",
            Self::StreamChange(_) => "stream_change",
            Self::Unknown(_) => "unknown",
        }
    }
}

fn reader<'a>(buf: &'a [u8], kind: &'static str, fixed: usize) -> Result<WireReader<'a>, DecodeError> {
    let r = WireReader::new(buf, kind);
    r.require(fixed)?;
    Ok(r)
}

fn decode_assoc_change(buf: &[u8], header: NotificationHeader) -> Result<AssocChange, DecodeError> {
    let r = reader(buf, "assoc_change", 20)?;
    Ok(AssocChange {
        header,
        state: AssocChangeState::from(r.u16_at(8)?),
        error: r.u16_at(10)?,
        outbound_streams: r.u16_at(12)?,
        inbound_streams: r.u16_at(14)?,
        association_id: AssociationId(r.i32_at(16)?),
    })
}

fn decode_peer_addr_change(
    buf: &[u8],
    header: NotificationHeader,
) -> Result<PeerAddrChange, DecodeError> {
    let fixed = HEADER_SIZE + SOCKADDR_STORAGE_SIZE + 12;
    let r = reader(buf, "peer_addr_change", fixed)?;
    let address = addr::decode_storage(r.slice_at(HEADER_SIZE, SOCKADDR_STORAGE_SIZE)?)?;
    let base = HEADER_SIZE + SOCKADDR_STORAGE_SIZE;
    Ok(PeerAddrChange {
        header,
        address,
        state: PeerAddrState::from(r.i32_at(base)?),
        error: r.i32_at(base + 4)?,
        association_id: AssociationId(r.i32_at(base + 8)?),
    })
}

fn decode_remote_error(buf: &[u8], header: NotificationHeader) -> Result<RemoteError, DecodeError> {
    const FIXED: usize = 16;
    let r = reader(buf, "remote_error", FIXED)?;
    Ok(RemoteError {
        header,
        error: r.u16_at(8)?,
        association_id: AssociationId(r.i32_at(12)?),
        data: copy_tail(&r, &header, FIXED),
    })
}

fn decode_send_failed(buf: &[u8], header: NotificationHeader) -> Result<SendFailed, DecodeError> {
    const FIXED: usize = 12 + SndRcvInfo::SIZE + 4;
    let r = reader(buf, "send_failed", FIXED)?;
    Ok(SendFailed {
        header,
        error: r.u32_at(8)?,
        info: SendFailedInfo::SndRcv(SndRcvInfo::decode(r.slice_at(12, SndRcvInfo::SIZE)?)?),
        association_id: AssociationId(r.i32_at(12 + SndRcvInfo::SIZE)?),
        data: copy_tail(&r, &header, FIXED),
    })
}

fn decode_send_failed_event(
    buf: &[u8],
    header: NotificationHeader,
) -> Result<SendFailed, DecodeError> {
    const FIXED: usize = 12 + SndInfo::SIZE + 4;
    let r = reader(buf, "send_failed_event", FIXED)?;
    Ok(SendFailed {
        header,
        error: r.u32_at(8)?,
        info: SendFailedInfo::Snd(SndInfo::decode(r.slice_at(12, SndInfo::SIZE)?)?),
        association_id: AssociationId(r.i32_at(12 + SndInfo::SIZE)?),
        data: copy_tail(&r, &header, FIXED),
    })
}

fn decode_shutdown(buf: &[u8], header: NotificationHeader) -> Result<ShutdownEvent, DecodeError> {
    let r = reader(buf, "shutdown", 12)?;
    Ok(ShutdownEvent {
        header,
        association_id: AssociationId(r.i32_at(8)?),
    })
}

fn decode_adaptation(buf: &[u8], header: NotificationHeader) -> Result<Adaptation, DecodeError> {
    let r = reader(buf, "adaptation_indication", 16)?;
    Ok(Adaptation {
        header,
        indication: r.u32_at(8)?,
        association_id: AssociationId(r.i32_at(12)?),
    })
}

fn decode_partial_delivery(
    buf: &[u8],
    header: NotificationHeader,
) -> Result<PartialDelivery, DecodeError> {
    let r = reader(buf, "partial_delivery", 24)?;
    Ok(PartialDelivery {
        header,
        indication: r.u32_at(8)?,
        stream: r.u32_at(12)?,
        sequence: r.u32_at(16)?,
        association_id: AssociationId(r.i32_at(20)?),
    })
}

fn decode_authkey(buf: &[u8], header: NotificationHeader) -> Result<AuthKeyEvent, DecodeError> {
    let r = reader(buf, "authentication", 20)?;
    Ok(AuthKeyEvent {
        header,
        key_number: r.u16_at(8)?,
        alt_key_number: r.u16_at(10)?,
        indication: r.u32_at(12)?,
        association_id: AssociationId(r.i32_at(16)?),
    })
}

fn decode_sender_dry(buf: &[u8], header: NotificationHeader) -> Result<SenderDry, DecodeError> {
    let r = reader(buf, "sender_dry", 12)?;
    Ok(SenderDry {
        header,
        association_id: AssociationId(r.i32_at(8)?),
    })
}

fn decode_stream_reset(buf: &[u8], header: NotificationHeader) -> Result<StreamReset, DecodeError> {
    const FIXED: usize = 12;
    let r = reader(buf, "stream_reset", FIXED)?;
    let count = tail_len(header.length, FIXED, r.len()) / 2;
    let streams = (0..count)
        .map(|i| r.u16_at(FIXED + i * 2))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StreamReset {
        header,
        association_id: AssociationId(r.i32_at(8)?),
        streams,
    })
}

fn decode_assoc_reset(buf: &[u8], header: NotificationHeader) -> Result<AssocReset, DecodeError> {
    let r = reader(buf, "assoc_reset", 20)?;
    Ok(AssocReset {
        header,
        association_id: AssociationId(r.i32_at(8)?),
        local_tsn: r.u32_at(12)?,
        remote_tsn: r.u32_at(16)?,
    })
}

fn decode_stream_change(
    buf: &[u8],
    header: NotificationHeader,
) -> Result<StreamChange, DecodeError> {
    let r = reader(buf, "stream_change", 16)?;
    Ok(StreamChange {
        header,
        association_id: AssociationId(r.i32_at(8)?),
        inbound_streams: r.u16_at(12)?,
        outbound_streams: r.u16_at(14)?,
    })
}
