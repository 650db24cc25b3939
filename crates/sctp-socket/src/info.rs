//! Ancillary metadata model.
//!
//! Typed forms of the per-message control structures: the classic
//! `sctp_sndrcvinfo` used by plain send/receive, and the extended
//! `sctp_sndinfo` / `sctp_rcvinfo` / `sctp_nxtinfo` / `sctp_prinfo` /
//! `sctp_authinfo` records used by the vectored calls. Every record
//! defaults to all-zero and always encodes to its full kernel size.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::consts;
use crate::error::DecodeError;
use crate::wire::{WireReader, WireWriter};

/// Identifier of one association within a socket.
///
/// Assigned by the kernel. Zero denotes the implicit association of a
/// one-to-one socket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AssociationId(pub i32);

impl AssociationId {
    /// The implicit association of a one-to-one socket.
    pub const IMPLICIT: AssociationId = AssociationId(0);

    /// Raw `sctp_assoc_t` value.
    pub fn as_raw(self) -> consts::RawAssocId {
        self.0
    }

    /// True for the implicit association.
    pub fn is_implicit(self) -> bool {
        self.0 == 0
    }
}

impl From<i32> for AssociationId {
    fn from(raw: i32) -> Self {
        AssociationId(raw)
    }
}

impl fmt::Display for AssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target of an authentication key operation.
///
/// Endpoint scope and "the socket's default association" both encode to
/// zero on a fresh socket but are different requests, so they are kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyScope {
    /// The endpoint itself (`SCTP_FUTURE_ASSOC`).
    Endpoint,
    /// One specific association.
    Association(AssociationId),
    /// Whatever association the socket last connected or peeled off.
    #[default]
    SocketDefault,
}

impl KeyScope {
    /// Resolves the scope to a raw association id given the socket's cached one.
    pub fn resolve(self, socket_default: AssociationId) -> consts::RawAssocId {
        match self {
            KeyScope::Endpoint => consts::SCTP_FUTURE_ASSOC,
            KeyScope::Association(id) => id.as_raw(),
            KeyScope::SocketDefault => socket_default.as_raw(),
        }
    }
}

bitflags! {
    /// Flags carried in `sinfo_flags` / `snd_flags` / `rcv_flags`.
    ///
    /// Bits not named here are retained as-is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SendFlags: u16 {
        /// Unordered delivery.
        const UNORDERED = consts::SCTP_UNORDERED;
        /// Send to the explicit destination rather than the primary path.
        const ADDR_OVER = consts::SCTP_ADDR_OVER;
        /// Abort the association.
        const ABORT = consts::SCTP_ABORT;
        /// Request an immediate SACK.
        const SACK_IMMEDIATELY = consts::SCTP_SACK_IMMEDIATELY;
        /// Send to all associations.
        const SENDALL = consts::SCTP_SENDALL;
        /// Graceful end of stream (shutdown after the data).
        const EOF = consts::SCTP_EOF;
    }
}

impl Serialize for SendFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SendFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u16::deserialize(deserializer).map(SendFlags::from_bits_retain)
    }
}

/// `struct sctp_sndrcvinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SndRcvInfo {
    /// Stream id.
    pub stream: u16,
    /// Stream sequence number.
    pub ssn: u16,
    /// Delivery flags.
    pub flags: SendFlags,
    /// Payload protocol identifier, opaque to the transport.
    pub ppid: u32,
    /// Context tag returned in send-failure notifications.
    pub context: u32,
    /// Time to live in milliseconds, 0 for none.
    pub ttl: u32,
    /// Transmission sequence number.
    pub tsn: u32,
    /// Cumulative TSN.
    pub cumtsn: u32,
    /// Association id.
    pub association_id: AssociationId,
}

impl SndRcvInfo {
    /// Kernel size of the record.
    pub const SIZE: usize = 32;

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::zeroed(Self::SIZE);
        w.put_u16(0, self.stream)
            .put_u16(2, self.ssn)
            .put_u16(4, self.flags.bits())
            .put_u32(8, self.ppid)
            .put_u32(12, self.context)
            .put_u32(16, self.ttl)
            .put_u32(20, self.tsn)
            .put_u32(24, self.cumtsn)
            .put_i32(28, self.association_id.as_raw());
        w.finish()
    }

    /// Decodes the record.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "sndrcvinfo");
        r.require(Self::SIZE)?;
        Ok(Self {
            stream: r.u16_at(0)?,
            ssn: r.u16_at(2)?,
            flags: SendFlags::from_bits_retain(r.u16_at(4)?),
            ppid: r.u32_at(8)?,
            context: r.u32_at(12)?,
            ttl: r.u32_at(16)?,
            tsn: r.u32_at(20)?,
            cumtsn: r.u32_at(24)?,
            association_id: AssociationId(r.i32_at(28)?),
        })
    }
}

/// `struct sctp_sndinfo`, the extended send record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SndInfo {
    /// Stream id.
    pub stream: u16,
    /// Delivery flags.
    pub flags: SendFlags,
    /// Payload protocol identifier.
    pub ppid: u32,
    /// Context tag.
    pub context: u32,
    /// Association id.
    pub association_id: AssociationId,
}

impl SndInfo {
    /// Kernel size of the record.
    pub const SIZE: usize = 16;

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::zeroed(Self::SIZE);
        w.put_u16(0, self.stream)
            .put_u16(2, self.flags.bits())
            .put_u32(4, self.ppid)
            .put_u32(8, self.context)
            .put_i32(12, self.association_id.as_raw());
        w.finish()
    }

    /// Decodes the record.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "sndinfo");
        r.require(Self::SIZE)?;
        Ok(Self {
            stream: r.u16_at(0)?,
            flags: SendFlags::from_bits_retain(r.u16_at(2)?),
            ppid: r.u32_at(4)?,
            context: r.u32_at(8)?,
            association_id: AssociationId(r.i32_at(12)?),
        })
    }
}

/// `struct sctp_rcvinfo`, the extended receive record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RcvInfo {
    /// Stream id.
    pub stream: u16,
    /// Stream sequence number.
    pub ssn: u16,
    /// Delivery flags.
    pub flags: SendFlags,
    /// Payload protocol identifier.
    pub ppid: u32,
    /// Transmission sequence number.
    pub tsn: u32,
    /// Cumulative TSN.
    pub cumtsn: u32,
    /// Context tag.
    pub context: u32,
    /// Association id.
    pub association_id: AssociationId,
}

impl RcvInfo {
    /// Kernel size of the record.
    pub const SIZE: usize = 28;

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::zeroed(Self::SIZE);
        w.put_u16(0, self.stream)
            .put_u16(2, self.ssn)
            .put_u16(4, self.flags.bits())
            .put_u32(8, self.ppid)
            .put_u32(12, self.tsn)
            .put_u32(16, self.cumtsn)
            .put_u32(20, self.context)
            .put_i32(24, self.association_id.as_raw());
        w.finish()
    }

    /// Decodes the record.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "rcvinfo");
        r.require(Self::SIZE)?;
        Ok(Self {
            stream: r.u16_at(0)?,
            ssn: r.u16_at(2)?,
            flags: SendFlags::from_bits_retain(r.u16_at(4)?),
            ppid: r.u32_at(8)?,
            tsn: r.u32_at(12)?,
            cumtsn: r.u32_at(16)?,
            context: r.u32_at(20)?,
            association_id: AssociationId(r.i32_at(24)?),
        })
    }
}

/// `struct sctp_nxtinfo`: a preview of the next queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NxtInfo {
    /// Stream id.
    pub stream: u16,
    /// Flags of the next message.
    pub flags: SendFlags,
    /// Payload protocol identifier.
    pub ppid: u32,
    /// Length of the next message.
    pub length: u32,
    /// Association id.
    pub association_id: AssociationId,
}

impl NxtInfo {
    /// Kernel size of the record.
    pub const SIZE: usize = 16;

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::zeroed(Self::SIZE);
        w.put_u16(0, self.stream)
            .put_u16(2, self.flags.bits())
            .put_u32(4, self.ppid)
            .put_u32(8, self.length)
            .put_i32(12, self.association_id.as_raw());
        w.finish()
    }

    /// Decodes the record.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "nxtinfo");
        r.require(Self::SIZE)?;
        Ok(Self {
            stream: r.u16_at(0)?,
            flags: SendFlags::from_bits_retain(r.u16_at(2)?),
            ppid: r.u32_at(4)?,
            length: r.u32_at(8)?,
            association_id: AssociationId(r.i32_at(12)?),
        })
    }
}

/// `struct sctp_prinfo`: partial-reliability policy for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrInfo {
    /// `SCTP_PR_SCTP_*` policy.
    pub policy: u16,
    /// Policy value; milliseconds for the TTL policy.
    pub value: u32,
}

impl PrInfo {
    /// Kernel size of the record.
    pub const SIZE: usize = 8;

    /// Timed reliability with the given lifetime.
    pub fn ttl(millis: u32) -> Self {
        Self {
            policy: consts::SCTP_PR_SCTP_TTL,
            value: millis,
        }
    }

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::zeroed(Self::SIZE);
        w.put_u16(0, self.policy).put_u32(4, self.value);
        w.finish()
    }

    /// Decodes the record.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "prinfo");
        r.require(Self::SIZE)?;
        Ok(Self {
            policy: r.u16_at(0)?,
            value: r.u32_at(4)?,
        })
    }
}

/// `struct sctp_authinfo`: shared key to use for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthInfo {
    /// Key number.
    pub key_number: u16,
}

impl AuthInfo {
    /// Kernel size of the record.
    pub const SIZE: usize = 2;

    /// Encodes the record.
    pub fn encode(&self) -> Vec<u8> {
        self.key_number.to_ne_bytes().to_vec()
    }

    /// Decodes the record.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let r = WireReader::new(buf, "authinfo");
        Ok(Self {
            key_number: r.u16_at(0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sndrcvinfo_layout() {
        let info = SndRcvInfo {
            stream: 3,
            ppid: 0x01020304,
            association_id: AssociationId(-2),
            ..Default::default()
        };
        let buf = info.encode();
        assert_eq!(buf.len(), SndRcvInfo::SIZE);
        assert_eq!(&buf[0..2], &3u16.to_ne_bytes());
        assert_eq!(&buf[8..12], &0x01020304u32.to_ne_bytes());
        assert_eq!(&buf[28..32], &(-2i32).to_ne_bytes());
        assert_eq!(SndRcvInfo::decode(&buf).unwrap(), info);
    }

    #[test]
    fn test_empty_records_are_full_size() {
        assert_eq!(SndRcvInfo::default().encode(), vec![0u8; 32]);
        assert_eq!(SndInfo::default().encode(), vec![0u8; 16]);
        assert_eq!(RcvInfo::default().encode(), vec![0u8; 28]);
        assert_eq!(NxtInfo::default().encode(), vec![0u8; 16]);
        assert_eq!(PrInfo::default().encode(), vec![0u8; 8]);
    }

    #[test]
    fn test_unknown_flag_bits_pass_through() {
        let info = SndInfo {
            flags: SendFlags::from_bits_retain(0x4000 | consts::SCTP_UNORDERED),
            ..Default::default()
        };
        let decoded = SndInfo::decode(&info.encode()).unwrap();
        assert_eq!(decoded.flags.bits(), 0x4001);
        assert!(decoded.flags.contains(SendFlags::UNORDERED));
    }

    #[test]
    fn test_rcvinfo_fields() {
        let info = RcvInfo {
            stream: 1,
            ssn: 2,
            flags: SendFlags::UNORDERED,
            ppid: 3,
            tsn: 4,
            cumtsn: 5,
            context: 6,
            association_id: AssociationId(7),
        };
        let buf = info.encode();
        assert_eq!(&buf[12..16], &4u32.to_ne_bytes());
        assert_eq!(RcvInfo::decode(&buf).unwrap(), info);
    }

    #[test]
    fn test_nxtinfo_fields() {
        let info = NxtInfo {
            stream: 9,
            length: 1500,
            association_id: AssociationId(11),
            ..Default::default()
        };
        assert_eq!(NxtInfo::decode(&info.encode()).unwrap(), info);
    }

    #[test]
    fn test_short_buffers_are_truncated() {
        assert!(matches!(
            SndRcvInfo::decode(&[0u8; 31]),
            Err(DecodeError::Truncated { kind: "sndrcvinfo", needed: 32, available: 31 })
        ));
        assert!(RcvInfo::decode(&[0u8; 20]).is_err());
        assert!(AuthInfo::decode(&[0u8; 1]).is_err());
    }

    #[test]
    fn test_prinfo_ttl() {
        let pr = PrInfo::ttl(250);
        assert_eq!(pr.policy, consts::SCTP_PR_SCTP_TTL);
        assert_eq!(PrInfo::decode(&pr.encode()).unwrap(), pr);
    }

    #[test]
    fn test_authinfo() {
        let auth = AuthInfo { key_number: 5 };
        assert_eq!(AuthInfo::decode(&auth.encode()).unwrap(), auth);
    }

    #[test]
    fn test_key_scope_resolve() {
        let cached = AssociationId(17);
        assert_eq!(KeyScope::Endpoint.resolve(cached), 0);
        assert_eq!(KeyScope::Association(AssociationId(3)).resolve(cached), 3);
        assert_eq!(KeyScope::SocketDefault.resolve(cached), 17);
        assert_eq!(KeyScope::SocketDefault.resolve(AssociationId::IMPLICIT), 0);
    }

    #[test]
    fn test_send_flags_serde_as_bits() {
        let flags = SendFlags::UNORDERED | SendFlags::EOF;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, flags.bits().to_string());
        let back: SendFlags = serde_json::from_str("1").unwrap();
        assert_eq!(back, SendFlags::UNORDERED);
    }
}
