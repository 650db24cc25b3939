//! Address/endpoint codec.
//!
//! Converts textual IP addresses plus a port into the packed `sockaddr`
//! arrays that the multi-address SCTP calls (`bindx`, `connectx`, peer and
//! local address listings) exchange with the kernel, and back.
//!
//! Packed arrays hold entries back to back with no padding: 16 bytes for a
//! `sockaddr_in`, 28 bytes for a `sockaddr_in6`. The family field is native
//! endian, port and address are network byte order.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use serde::{Deserialize, Serialize};
use socket2::{Domain, SockAddr};

use crate::error::{DecodeError, SctpError, SctpResult};
use crate::wire::WireReader;

/// Length of a packed `sockaddr_in`.
pub const SOCKADDR_IN_LEN: usize = 16;
/// Length of a packed `sockaddr_in6`.
pub const SOCKADDR_IN6_LEN: usize = 28;

/// Address family of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// IPv4 (`AF_INET`).
    #[default]
    Inet,
    /// IPv6 (`AF_INET6`).
    Inet6,
}

impl Family {
    /// The `AF_*` constant.
    pub fn as_raw(self) -> i32 {
        match self {
            Family::Inet => libc::AF_INET,
            Family::Inet6 => libc::AF_INET6,
        }
    }

    /// The socket domain for this family.
    pub fn domain(self) -> Domain {
        match self {
            Family::Inet => Domain::IPV4,
            Family::Inet6 => Domain::IPV6,
        }
    }

    /// Maps an `AF_*` constant back to a family.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            libc::AF_INET => Some(Family::Inet),
            libc::AF_INET6 => Some(Family::Inet6),
            _ => None,
        }
    }

    /// Family of an IP address.
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::Inet,
            IpAddr::V6(_) => Family::Inet6,
        }
    }

    /// Human readable name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Family::Inet => "IPv4",
            Family::Inet6 => "IPv6",
        }
    }

    /// The "any" wildcard address for this family.
    pub fn wildcard(self) -> IpAddr {
        match self {
            Family::Inet => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::Inet6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Size of one packed socket address of this family.
    pub fn sockaddr_len(self) -> usize {
        match self {
            Family::Inet => SOCKADDR_IN_LEN,
            Family::Inet6 => SOCKADDR_IN6_LEN,
        }
    }
}

/// A multi-homed endpoint: one family, any number of addresses, one port.
///
/// An empty address list means every local address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Endpoint {
    /// Address family shared by every address.
    pub family: Family,
    /// Textual IP addresses.
    pub addresses: Vec<String>,
    /// Port, 0 to let the kernel pick one.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new<S: Into<String>>(
        family: Family,
        addresses: impl IntoIterator<Item = S>,
        port: u16,
    ) -> Self {
        Self {
            family,
            addresses: addresses.into_iter().map(Into::into).collect(),
            port,
        }
    }

    /// The wildcard endpoint on `port`.
    pub fn any(family: Family, port: u16) -> Self {
        Self {
            family,
            addresses: Vec::new(),
            port,
        }
    }

    /// Parses every address; the wildcard stands in for an empty list.
    pub fn socket_addrs(&self) -> SctpResult<Vec<SocketAddr>> {
        resolve(&self.addresses, self.port, self.family)
    }

    /// Packed binary form.
    pub fn encode(&self) -> SctpResult<Vec<u8>> {
        encode(&self.addresses, self.port, self.family)
    }
}

/// Parses `text` as an address of `family`.
pub fn parse_ip(text: &str, family: Family) -> SctpResult<IpAddr> {
    let invalid = || SctpError::InvalidAddress {
        address: text.to_string(),
        family: family.name(),
    };
    let ip: IpAddr = text.trim().parse().map_err(|_| invalid())?;
    if Family::of(&ip) != family {
        return Err(invalid());
    }
    Ok(ip)
}

/// Parses a list of address strings into socket addresses on `port`.
///
/// An empty list yields the single wildcard address of `family`.
pub fn resolve<S: AsRef<str>>(
    addresses: &[S],
    port: u16,
    family: Family,
) -> SctpResult<Vec<SocketAddr>> {
    if addresses.is_empty() {
        return Ok(vec![SocketAddr::new(family.wildcard(), port)]);
    }
    addresses
        .iter()
        .map(|a| parse_ip(a.as_ref(), family).map(|ip| SocketAddr::new(ip, port)))
        .collect()
}

/// Packs one socket address.
pub fn encode_one(addr: &SocketAddr) -> Vec<u8> {
    let raw = SockAddr::from(*addr);
    // SAFETY: `as_ptr` points at storage holding at least `len` initialized bytes.
    let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr().cast::<u8>(), raw.len() as usize) };
    bytes.to_vec()
}

/// Packs socket addresses back to back.
pub fn encode_all(addrs: &[SocketAddr]) -> Vec<u8> {
    addrs.iter().flat_map(encode_one).collect()
}

/// Parses and packs `addresses` on `port`; empty means the wildcard.
pub fn encode<S: AsRef<str>>(addresses: &[S], port: u16, family: Family) -> SctpResult<Vec<u8>> {
    Ok(encode_all(&resolve(addresses, port, family)?))
}

/// Decodes the socket address at the start of `buf`.
pub fn decode(buf: &[u8]) -> Result<SocketAddr, DecodeError> {
    decode_entry(buf).map(|(addr, _)| addr)
}

/// Decodes one packed address and reports how many bytes it occupied.
pub fn decode_entry(buf: &[u8]) -> Result<(SocketAddr, usize), DecodeError> {
    let r = WireReader::new(buf, "sockaddr");
    let raw_family = r.u16_at(0)? as i32;
    match Family::from_raw(raw_family) {
        Some(Family::Inet) => {
            r.require(SOCKADDR_IN_LEN)?;
            let port_bytes = r.slice_at(2, 2)?;
            let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
            let octets = r.slice_at(4, 4)?;
            let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
            Ok((SocketAddr::V4(SocketAddrV4::new(ip, port)), SOCKADDR_IN_LEN))
        }
        Some(Family::Inet6) => {
            r.require(SOCKADDR_IN6_LEN)?;
            let port_bytes = r.slice_at(2, 2)?;
            let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
            let flowinfo = r.u32_at(4)?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(r.slice_at(8, 16)?);
            let scope_id = r.u32_at(24)?;
            let addr = SocketAddrV6::new(Ipv6Addr::from(octets), port, flowinfo, scope_id);
            Ok((SocketAddr::V6(addr), SOCKADDR_IN6_LEN))
        }
        None => Err(DecodeError::Malformed {
            kind: "sockaddr",
            reason: format!("unsupported address family {}", raw_family),
        }),
    }
}

/// Decodes `count` packed addresses.
pub fn decode_all(buf: &[u8], count: usize) -> Result<Vec<SocketAddr>, DecodeError> {
    let mut out = Vec::with_capacity(count.min(64));
    let mut offset = 0;
    for _ in 0..count {
        let (addr, used) = decode_entry(buf.get(offset..).unwrap_or(&[]))?;
        out.push(addr);
        offset += used;
    }
    Ok(out)
}

/// Decodes a `sockaddr_storage`; an unset family (zero) yields `None`.
pub fn decode_storage(buf: &[u8]) -> Result<Option<SocketAddr>, DecodeError> {
    let r = WireReader::new(buf, "sockaddr");
    if r.u16_at(0)? == 0 {
        return Ok(None);
    }
    decode(buf).map(Some)
}
