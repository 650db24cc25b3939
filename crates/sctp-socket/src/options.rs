//! Socket option surface.
//!
//! Getters return owned snapshots; setters take structured parameter
//! objects whose unspecified fields default to zero, which the kernel reads
//! as "leave unchanged" for the tuning options. Association-scoped getters
//! take `Option<AssociationId>`, where `None` is the socket's cached
//! association, not "all associations".

use std::net::SocketAddr;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::addr;
use crate::consts::{self, IPPROTO_SCTP, SOCKADDR_STORAGE_SIZE};
use crate::error::{DecodeError, SctpError, SctpResult};
use crate::info::{AssociationId, KeyScope, SndRcvInfo};
use crate::params::Truthy;
use crate::socket::SctpSocket;
use crate::sys;
use crate::wire::{WireReader, WireWriter};

/// Default send parameters (`SCTP_DEFAULT_SEND_PARAM`), a full `sctp_sndrcvinfo`.
pub type DefaultSendParams = SndRcvInfo;

/// `struct sctp_initmsg`: parameters for new associations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitMsg {
    /// Outbound streams requested.
    pub num_ostreams: u16,
    /// Maximum inbound streams accepted.
    pub max_instreams: u16,
    /// INIT retransmissions before giving up.
    pub max_attempts: u16,
    /// Largest INIT retransmission timeout, milliseconds.
    pub max_init_timeout: u16,
}

impl InitMsg {
    const SIZE: usize = 8;

    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::zeroed(Self::SIZE);
        w.put_u16(0, self.num_ostreams)
            .put_u16(2, self.max_instreams)
            .put_u16(4, self.max_attempts)
            .put_u16(6, self.max_init_timeout);
        w.finish()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "initmsg");
        r.require(Self::SIZE)?;
        Ok(Self {
            num_ostreams: r.u16_at(0)?,
            max_instreams: r.u16_at(2)?,
            max_attempts: r.u16_at(4)?,
            max_init_timeout: r.u16_at(6)?,
        })
    }
}

/// `struct sctp_event_subscribe`: one switch per notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSubscriptions {
    /// Per-message `sctp_sndrcvinfo` on receive.
    pub data_io: bool,
    /// Association changes.
    pub association: bool,
    /// Peer address changes.
    pub address: bool,
    /// Send failures.
    pub send_failure: bool,
    /// Remote operation errors.
    pub peer_error: bool,
    /// Peer shutdown.
    pub shutdown: bool,
    /// Partial delivery aborts.
    pub partial_delivery: bool,
    /// Adaptation layer indications.
    pub adaptation_layer: bool,
    /// Authentication key events.
    pub authentication: bool,
    /// Sender dry events.
    pub sender_dry: bool,
    /// Stream reset events.
    pub stream_reset: bool,
}

impl EventSubscriptions {
    const SIZE: usize = 11;

    /// Data-io, association, address, send-failure and shutdown events.
    pub fn server_default() -> Self {
        Self {
            data_io: true,
            association: true,
            address: true,
            send_failure: true,
            shutdown: true,
            ..Default::default()
        }
    }

    fn switches(&self) -> [bool; Self::SIZE] {
        [
            self.data_io,
            self.association,
            self.address,
            self.send_failure,
            self.peer_error,
            self.shutdown,
            self.partial_delivery,
            self.adaptation_layer,
            self.authentication,
            self.sender_dry,
            self.stream_reset,
        ]
    }

    fn encode(&self) -> Vec<u8> {
        self.switches().iter().map(|on| u8::from(*on)).collect()
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "event_subscribe");
        let b = r.slice_at(0, Self::SIZE)?;
        Ok(Self {
            data_io: b[0] != 0,
            association: b[1] != 0,
            address: b[2] != 0,
            send_failure: b[3] != 0,
            peer_error: b[4] != 0,
            shutdown: b[5] != 0,
            partial_delivery: b[6] != 0,
            adaptation_layer: b[7] != 0,
            authentication: b[8] != 0,
            sender_dry: b[9] != 0,
            stream_reset: b[10] != 0,
        })
    }
}

bitflags! {
    /// `spp_flags` of `struct sctp_paddrparams`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PeerAddrFlags: u32 {
        /// Enable heartbeats.
        const HB_ENABLE = 1 << 0;
        /// Disable heartbeats.
        const HB_DISABLE = 1 << 1;
        /// Send a heartbeat now.
        const HB_DEMAND = 1 << 2;
        /// Enable path MTU discovery.
        const PMTUD_ENABLE = 1 << 3;
        /// Disable path MTU discovery.
        const PMTUD_DISABLE = 1 << 4;
        /// Enable delayed SACK.
        const SACKDELAY_ENABLE = 1 << 5;
        /// Disable delayed SACK.
        const SACKDELAY_DISABLE = 1 << 6;
        /// Heartbeat interval of zero is meant literally.
        const HB_TIME_IS_ZERO = 1 << 7;
        /// `spp_ipv6_flowlabel` is valid.
        const IPV6_FLOWLABEL = 1 << 8;
        /// `spp_dscp` is valid.
        const DSCP = 1 << 9;
    }
}

impl Serialize for PeerAddrFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PeerAddrFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(PeerAddrFlags::from_bits_retain)
    }
}

/// `struct sctp_paddrparams`: per-path tuning.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerAddressParams {
    /// Target association; `None` is the socket's cached one.
    pub association_id: Option<AssociationId>,
    /// Peer IP address; `None` applies to every path of the association.
    pub address: Option<String>,
    /// Peer port belonging to `address`.
    pub port: u16,
    /// Heartbeat interval, milliseconds.
    pub heartbeat_interval: u32,
    /// Retransmissions before the path is considered unreachable.
    pub max_retransmissions: u16,
    /// Fixed path MTU when discovery is disabled.
    pub path_mtu: u32,
    /// Delayed SACK timeout, milliseconds.
    pub sack_delay: u32,
    /// Behaviour switches.
    pub flags: PeerAddrFlags,
    /// IPv6 flow label.
    pub ipv6_flowlabel: u32,
    /// DSCP value.
    pub dscp: u8,
}

impl PeerAddressParams {
    const SIZE: usize = 156;

    fn encode(&self, socket: &SctpSocket) -> SctpResult<Vec<u8>> {
        let mut w = WireWriter::zeroed(Self::SIZE);
        w.put_i32(0, socket.resolve_assoc(self.association_id));
        if let Some(text) = &self.address {
            let ip = addr::parse_ip(text, socket.family())?;
            w.put_bytes(4, &addr::encode_one(&SocketAddr::new(ip, self.port)));
        }
        w.put_u32(132, self.heartbeat_interval)
            .put_u16(136, self.max_retransmissions)
            .put_u32(138, self.path_mtu)
            .put_u32(142, self.sack_delay)
            .put_u32(146, self.flags.bits())
            .put_u32(150, self.ipv6_flowlabel)
            .put_bytes(154, &[self.dscp]);
        Ok(w.finish())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "paddrparams");
        // Older kernels stop before the flow label.
        r.require(150)?;
        let address = addr::decode_storage(r.slice_at(4, SOCKADDR_STORAGE_SIZE)?)?;
        Ok(Self {
            association_id: Some(AssociationId(r.i32_at(0)?)),
            address: address.map(|a| a.ip().to_string()),
            port: address.map(|a| a.port()).unwrap_or(0),
            heartbeat_interval: r.u32_at(132)?,
            max_retransmissions: r.u16_at(136)?,
            path_mtu: r.u32_at(138)?,
            sack_delay: r.u32_at(142)?,
            flags: PeerAddrFlags::from_bits_retain(r.u32_at(146)?),
            ipv6_flowlabel: r.u32_at(150).unwrap_or(0),
            dscp: r.slice_at(154, 1).map(|b| b[0]).unwrap_or(0),
        })
    }
}

/// `struct sctp_rtoinfo`: retransmission timeout bounds, milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RtoInfo {
    /// Target association.
    pub association_id: Option<AssociationId>,
    /// Initial RTO.
    pub initial: u32,
    /// Maximum RTO.
    pub max: u32,
    /// Minimum RTO.
    pub min: u32,
}

/// `struct sctp_assocparams`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AssociationInfo {
    /// Association described.
    pub association_id: AssociationId,
    /// Association-wide retransmission limit.
    pub max_retransmissions: u16,
    /// Number of peer transport addresses.
    pub peer_destinations: u16,
    /// Peer receive window.
    pub peer_receive_window: u32,
    /// Local receive window.
    pub local_receive_window: u32,
    /// Cookie lifetime, milliseconds.
    pub cookie_life: u32,
}

/// `sstat_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssociationState {
    /// No association.
    Empty,
    /// CLOSED
    Closed,
    /// COOKIE-WAIT
    CookieWait,
    /// COOKIE-ECHOED
    CookieEchoed,
    /// ESTABLISHED
    Established,
    /// SHUTDOWN-PENDING
    ShutdownPending,
    /// SHUTDOWN-SENT
    ShutdownSent,
    /// SHUTDOWN-RECEIVED
    ShutdownReceived,
    /// SHUTDOWN-ACK-SENT
    ShutdownAckSent,
    /// Unknown value.
    Other(i32),
}

impl From<i32> for AssociationState {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::Empty,
            consts::SCTP_CLOSED => Self::Closed,
            consts::SCTP_COOKIE_WAIT => Self::CookieWait,
            consts::SCTP_COOKIE_ECHOED => Self::CookieEchoed,
            consts::SCTP_ESTABLISHED => Self::Established,
            consts::SCTP_SHUTDOWN_PENDING => Self::ShutdownPending,
            consts::SCTP_SHUTDOWN_SENT => Self::ShutdownSent,
            consts::SCTP_SHUTDOWN_RECEIVED => Self::ShutdownReceived,
            consts::SCTP_SHUTDOWN_ACK_SENT => Self::ShutdownAckSent,
            other => Self::Other(other),
        }
    }
}

/// `spinfo_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportState {
    /// Path is down.
    Inactive,
    /// Potentially failed.
    PotentiallyFailed,
    /// Path is up.
    Active,
    /// Not yet confirmed by a heartbeat.
    Unconfirmed,
    /// Unknown value.
    Other(i32),
}

impl From<i32> for TransportState {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Self::Inactive,
            1 => Self::PotentiallyFailed,
            2 => Self::Active,
            3 => Self::Unconfirmed,
            other => Self::Other(other),
        }
    }
}

/// `struct sctp_paddrinfo`: one peer transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeerAddressInfo {
    /// Association.
    pub association_id: AssociationId,
    /// Transport address.
    pub address: Option<SocketAddr>,
    /// Reachability.
    pub state: TransportState,
    /// Congestion window.
    pub cwnd: u32,
    /// Smoothed RTT, milliseconds.
    pub srtt: u32,
    /// Current RTO, milliseconds.
    pub rto: u32,
    /// Path MTU.
    pub mtu: u32,
}

impl PeerAddressInfo {
    const SIZE: usize = 152;

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "paddrinfo");
        r.require(Self::SIZE)?;
        Ok(Self {
            association_id: AssociationId(r.i32_at(0)?),
            address: addr::decode_storage(r.slice_at(4, SOCKADDR_STORAGE_SIZE)?)?,
            state: TransportState::from(r.i32_at(132)?),
            cwnd: r.u32_at(136)?,
            srtt: r.u32_at(140)?,
            rto: r.u32_at(144)?,
            mtu: r.u32_at(148)?,
        })
    }
}

/// `struct sctp_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Status {
    /// Association described.
    pub association_id: AssociationId,
    /// Protocol state.
    pub state: AssociationState,
    /// Peer receive window.
    pub receive_window: u32,
    /// Unacknowledged DATA chunks.
    pub unacknowledged_data: u16,
    /// DATA chunks pending receipt.
    pub pending_data: u16,
    /// Inbound stream count.
    pub inbound_streams: u16,
    /// Outbound stream count.
    pub outbound_streams: u16,
    /// Fragmentation point.
    pub fragmentation_point: u32,
    /// Primary peer path.
    pub primary: PeerAddressInfo,
}

impl Status {
    const SIZE: usize = 24 + PeerAddressInfo::SIZE;

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "status");
        r.require(Self::SIZE)?;
        Ok(Self {
            association_id: AssociationId(r.i32_at(0)?),
            state: AssociationState::from(r.i32_at(4)?),
            receive_window: r.u32_at(8)?,
            unacknowledged_data: r.u16_at(12)?,
            pending_data: r.u16_at(14)?,
            inbound_streams: r.u16_at(16)?,
            outbound_streams: r.u16_at(18)?,
            fragmentation_point: r.u32_at(20)?,
            primary: PeerAddressInfo::decode(r.rest(24))?,
        })
    }
}

fn assoc_value(assoc: i32, value: u32) -> Vec<u8> {
    let mut w = WireWriter::zeroed(8);
    w.put_i32(0, assoc).put_u32(4, value);
    w.finish()
}

fn authkeyid(assoc: i32, key_number: u16) -> Vec<u8> {
    let mut w = WireWriter::zeroed(8);
    w.put_i32(0, assoc).put_u16(4, key_number);
    w.finish()
}

impl SctpSocket {
    fn get_option(&self, name: i32, mut buf: Vec<u8>, call: &'static str) -> SctpResult<Vec<u8>> {
        let fd = self.fd()?;
        let len = sys::getsockopt(fd, IPPROTO_SCTP, name, &mut buf, call)?;
        buf.truncate(len);
        Ok(buf)
    }

    fn set_option(&self, name: i32, value: &[u8], call: &'static str) -> SctpResult<()> {
        let fd = self.fd()?;
        sys::setsockopt(fd, IPPROTO_SCTP, name, value, call).map(|_| ())
    }

    fn get_flag(&self, name: i32, call: &'static str) -> SctpResult<i32> {
        sys::get_int(self.fd()?, IPPROTO_SCTP, name, call)
    }

    fn set_flag(&self, name: i32, value: i32, call: &'static str) -> SctpResult<()> {
        sys::set_int(self.fd()?, IPPROTO_SCTP, name, value, call)
    }

    /// Parameters for new associations (`SCTP_INITMSG`).
    pub fn init_msg(&self) -> SctpResult<InitMsg> {
        let buf = self.get_option(consts::SCTP_INITMSG, vec![0; InitMsg::SIZE], "getsockopt(SCTP_INITMSG)")?;
        Ok(InitMsg::decode(&buf)?)
    }

    /// Sets parameters for new associations; zero fields keep the current value.
    pub fn set_init_msg(&self, init: &InitMsg) -> SctpResult<InitMsg> {
        self.set_option(consts::SCTP_INITMSG, &init.encode(), "setsockopt(SCTP_INITMSG)")?;
        debug!(?init, "sctp init msg set");
        Ok(*init)
    }

    /// Selects which notifications the socket delivers (`SCTP_EVENTS`).
    pub fn subscribe(&self, events: &EventSubscriptions) -> SctpResult<()> {
        self.set_option(consts::SCTP_EVENTS, &events.encode(), "setsockopt(SCTP_EVENTS)")?;
        debug!(?events, "sctp event subscriptions set");
        Ok(())
    }

    /// Current notification subscriptions.
    pub fn subscriptions(&self) -> SctpResult<EventSubscriptions> {
        let buf = self.get_option(
            consts::SCTP_EVENTS,
            vec![0; EventSubscriptions::SIZE],
            "getsockopt(SCTP_EVENTS)",
        )?;
        Ok(EventSubscriptions::decode(&buf)?)
    }

    /// Path parameters of `assoc` (`SCTP_PEER_ADDR_PARAMS`), association-wide.
    pub fn peer_address_params(&self, assoc: Option<AssociationId>) -> SctpResult<PeerAddressParams> {
        let query = PeerAddressParams {
            association_id: assoc,
            ..Default::default()
        };
        let buf = self.get_option(
            consts::SCTP_PEER_ADDR_PARAMS,
            query.encode(self)?,
            "getsockopt(SCTP_PEER_ADDR_PARAMS)",
        )?;
        Ok(PeerAddressParams::decode(&buf)?)
    }

    /// Tunes one path, or every path when `address` is `None`.
    pub fn set_peer_address_params(&self, params: &PeerAddressParams) -> SctpResult<PeerAddressParams> {
        let raw = params.encode(self)?;
        self.set_option(consts::SCTP_PEER_ADDR_PARAMS, &raw, "setsockopt(SCTP_PEER_ADDR_PARAMS)")?;
        Ok(params.clone())
    }

    /// Default send parameters of `assoc` (`SCTP_DEFAULT_SEND_PARAM`).
    pub fn default_send_params(&self, assoc: Option<AssociationId>) -> SctpResult<DefaultSendParams> {
        let query = SndRcvInfo {
            association_id: AssociationId(self.resolve_assoc(assoc)),
            ..Default::default()
        };
        let buf = self.get_option(
            consts::SCTP_DEFAULT_SEND_PARAM,
            query.encode(),
            "getsockopt(SCTP_DEFAULT_SEND_PARAM)",
        )?;
        Ok(SndRcvInfo::decode(&buf)?)
    }

    /// Sets default send parameters and records them on the socket so later
    /// sends inherit any field they leave unset.
    pub fn set_default_send_params(&self, params: &DefaultSendParams) -> SctpResult<DefaultSendParams> {
        self.set_option(
            consts::SCTP_DEFAULT_SEND_PARAM,
            &params.encode(),
            "setsockopt(SCTP_DEFAULT_SEND_PARAM)",
        )?;
        self.cache_send_defaults(*params);
        debug!(stream = params.stream, ppid = params.ppid, "sctp default send params set");
        Ok(*params)
    }

    /// Retransmission timeout bounds (`SCTP_RTOINFO`).
    pub fn retransmission_info(&self, assoc: Option<AssociationId>) -> SctpResult<RtoInfo> {
        let mut w = WireWriter::zeroed(16);
        w.put_i32(0, self.resolve_assoc(assoc));
        let buf = self.get_option(consts::SCTP_RTOINFO, w.finish(), "getsockopt(SCTP_RTOINFO)")?;
        let r = WireReader::new(&buf, "rtoinfo");
        r.require(16)?;
        Ok(RtoInfo {
            association_id: Some(AssociationId(r.i32_at(0)?)),
            initial: r.u32_at(4)?,
            max: r.u32_at(8)?,
            min: r.u32_at(12)?,
        })
    }

    /// Sets retransmission timeout bounds; zero fields keep the current value.
    pub fn set_retransmission_info(&self, rto: &RtoInfo) -> SctpResult<RtoInfo> {
        let mut w = WireWriter::zeroed(16);
        w.put_i32(0, self.resolve_assoc(rto.association_id))
            .put_u32(4, rto.initial)
            .put_u32(8, rto.max)
            .put_u32(12, rto.min);
        self.set_option(consts::SCTP_RTOINFO, &w.finish(), "setsockopt(SCTP_RTOINFO)")?;
        Ok(*rto)
    }

    /// Association parameters (`SCTP_ASSOCINFO`).
    pub fn association_info(&self, assoc: Option<AssociationId>) -> SctpResult<AssociationInfo> {
        let mut w = WireWriter::zeroed(20);
        w.put_i32(0, self.resolve_assoc(assoc));
        let buf = self.get_option(consts::SCTP_ASSOCINFO, w.finish(), "getsockopt(SCTP_ASSOCINFO)")?;
        let r = WireReader::new(&buf, "assocparams");
        r.require(20)?;
        Ok(AssociationInfo {
            association_id: AssociationId(r.i32_at(0)?),
            max_retransmissions: r.u16_at(4)?,
            peer_destinations: r.u16_at(6)?,
            peer_receive_window: r.u32_at(8)?,
            local_receive_window: r.u32_at(12)?,
            cookie_life: r.u32_at(16)?,
        })
    }

    /// Association status (`SCTP_STATUS`), including the primary path.
    pub fn status(&self, assoc: Option<AssociationId>) -> SctpResult<Status> {
        let mut w = WireWriter::zeroed(Status::SIZE);
        w.put_i32(0, self.resolve_assoc(assoc));
        let buf = self.get_option(consts::SCTP_STATUS, w.finish(), "getsockopt(SCTP_STATUS)")?;
        Ok(Status::decode(&buf)?)
    }

    /// Idle seconds before a one-to-many association is closed; 0 is never.
    pub fn autoclose(&self) -> SctpResult<u32> {
        self.get_flag(consts::SCTP_AUTOCLOSE, "getsockopt(SCTP_AUTOCLOSE)")
            .map(|v| v.max(0) as u32)
    }

    /// Sets the autoclose interval. One-to-one sockets reject it.
    pub fn set_autoclose(&self, seconds: u32) -> SctpResult<u32> {
        let value = seconds.min(i32::MAX as u32) as i32;
        self.set_flag(consts::SCTP_AUTOCLOSE, value, "setsockopt(SCTP_AUTOCLOSE)")?;
        Ok(seconds)
    }

    /// Whether Nagle-style bundling is disabled (`SCTP_NODELAY`).
    pub fn nodelay(&self) -> SctpResult<bool> {
        self.get_flag(consts::SCTP_NODELAY, "getsockopt(SCTP_NODELAY)")
            .map(|v| v != 0)
    }

    /// Sets `SCTP_NODELAY` from any truthy value.
    pub fn set_nodelay(&self, enabled: impl Truthy) -> SctpResult<bool> {
        let on = enabled.truthy();
        self.set_flag(consts::SCTP_NODELAY, i32::from(on), "setsockopt(SCTP_NODELAY)")?;
        Ok(on)
    }

    /// Whether IPv4 peers appear as v4-mapped IPv6 addresses (`SCTP_I_WANT_MAPPED_V4_ADDR`).
    pub fn map_ipv4(&self) -> SctpResult<bool> {
        self.get_flag(consts::SCTP_I_WANT_MAPPED_V4_ADDR, "getsockopt(SCTP_I_WANT_MAPPED_V4_ADDR)")
            .map(|v| v != 0)
    }

    /// Sets `SCTP_I_WANT_MAPPED_V4_ADDR` from any truthy value.
    pub fn set_map_ipv4(&self, enabled: impl Truthy) -> SctpResult<bool> {
        let on = enabled.truthy();
        self.set_flag(
            consts::SCTP_I_WANT_MAPPED_V4_ADDR,
            i32::from(on),
            "setsockopt(SCTP_I_WANT_MAPPED_V4_ADDR)",
        )?;
        Ok(on)
    }

    /// Whether SCTP-AUTH is enabled for `scope` (`SCTP_AUTH_SUPPORTED`).
    pub fn auth_support(&self, scope: KeyScope) -> SctpResult<bool> {
        let assoc = scope.resolve(self.association_id());
        let buf = self.get_option(
            consts::SCTP_AUTH_SUPPORTED,
            assoc_value(assoc, 0),
            "getsockopt(SCTP_AUTH_SUPPORTED)",
        )?;
        Ok(WireReader::new(&buf, "assoc_value").u32_at(4)? != 0)
    }

    /// Enables SCTP-AUTH for `scope`.
    pub fn enable_auth_support(&self, scope: KeyScope) -> SctpResult<&Self> {
        let assoc = scope.resolve(self.association_id());
        self.set_option(
            consts::SCTP_AUTH_SUPPORTED,
            &assoc_value(assoc, 1),
            "setsockopt(SCTP_AUTH_SUPPORTED)",
        )?;
        Ok(self)
    }

    /// Installs shared key `key_number` (`SCTP_AUTH_KEY`). The key bytes are passed through unchanged.
    pub fn set_shared_key(&self, key: &[u8], key_number: u16, scope: KeyScope) -> SctpResult<&Self> {
        let key_len = u16::try_from(key.len())
            .map_err(|_| SctpError::invalid_argument("shared key is longer than 65535 bytes"))?;
        let assoc = scope.resolve(self.association_id());
        let mut w = WireWriter::zeroed(8);
        w.put_i32(0, assoc)
            .put_u16(4, key_number)
            .put_u16(6, key_len)
            .put_bytes(8, key);
        self.set_option(consts::SCTP_AUTH_KEY, &w.finish(), "setsockopt(SCTP_AUTH_KEY)")?;
        debug!(key_number, assoc, "sctp shared key set");
        Ok(self)
    }

    /// Removes shared key `key_number` (`SCTP_AUTH_DELETE_KEY`). Returns the key number.
    pub fn delete_shared_key(&self, key_number: u16, scope: KeyScope) -> SctpResult<u16> {
        let assoc = scope.resolve(self.association_id());
        self.set_option(
            consts::SCTP_AUTH_DELETE_KEY,
            &authkeyid(assoc, key_number),
            "setsockopt(SCTP_AUTH_DELETE_KEY)",
        )?;
        Ok(key_number)
    }

    /// Number of the key used for outgoing authenticated chunks (`SCTP_AUTH_ACTIVE_KEY`).
    pub fn active_shared_key(&self, scope: KeyScope) -> SctpResult<u16> {
        let assoc = scope.resolve(self.association_id());
        let buf = self.get_option(
            consts::SCTP_AUTH_ACTIVE_KEY,
            authkeyid(assoc, 0),
            "getsockopt(SCTP_AUTH_ACTIVE_KEY)",
        )?;
        Ok(WireReader::new(&buf, "authkeyid").u16_at(4)?)
    }

    /// Makes `key_number` the active key.
    pub fn set_active_shared_key(&self, key_number: u16, scope: KeyScope) -> SctpResult<&Self> {
        let assoc = scope.resolve(self.association_id());
        self.set_option(
            consts::SCTP_AUTH_ACTIVE_KEY,
            &authkeyid(assoc, key_number),
            "setsockopt(SCTP_AUTH_ACTIVE_KEY)",
        )?;
        Ok(self)
    }
}
