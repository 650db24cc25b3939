//! Property-based tests for the address, metadata and notification codecs.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use proptest::prelude::*;
use sctp_socket::addr::{self, Family};
use sctp_socket::consts::{
    MAX_NOTIFICATION_DATA, SCTP_ASSOC_CHANGE, SCTP_REMOTE_ERROR, SCTP_SEND_FAILED,
    SCTP_SHUTDOWN_EVENT,
};
use sctp_socket::notification::{tail_len, Notification};
use sctp_socket::wire::WireWriter;
use sctp_socket::{AssociationId, SendFlags, SndRcvInfo};

/// Generator for IPv4 and IPv6 socket addresses.
fn any_socket_addr() -> impl Strategy<Value = SocketAddr> {
    prop_oneof![
        (any::<u32>(), any::<u16>())
            .prop_map(|(ip, port)| SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port)),
        (any::<u128>(), any::<u16>())
            .prop_map(|(ip, port)| SocketAddr::new(IpAddr::V6(Ipv6Addr::from(ip)), port)),
    ]
}

/// Generator for an `SndRcvInfo` with exactly one field set.
fn any_single_field_info() -> impl Strategy<Value = (usize, SndRcvInfo)> {
    (0usize..9, any::<u32>()).prop_map(|(field, v)| {
        let mut info = SndRcvInfo::default();
        match field {
            0 => info.stream = v as u16,
            1 => info.ssn = v as u16,
            2 => info.flags = SendFlags::from_bits_retain(v as u16),
            3 => info.ppid = v,
            4 => info.context = v,
            5 => info.ttl = v,
            6 => info.tsn = v,
            7 => info.cumtsn = v,
            _ => info.association_id = AssociationId(v as i32),
        }
        (field, info)
    })
}

fn notification_buf(kind: u16, length: u32, total: usize) -> Vec<u8> {
    let mut w = WireWriter::zeroed(total);
    w.put_u16(0, kind).put_u32(4, length);
    w.finish()
}

proptest! {
    /// Encoding then decoding a socket address is the identity.
    #[test]
    fn test_address_round_trip(sa in any_socket_addr()) {
        let raw = addr::encode_one(&sa);
        prop_assert_eq!(raw.len(), Family::of(&sa.ip()).sockaddr_len());
        prop_assert_eq!(addr::decode(&raw).unwrap(), sa);
    }

    /// Text form survives encode/decode through the endpoint codec.
    #[test]
    fn test_address_text_round_trip(ip in any::<u32>(), port in 1u16..) {
        let text = Ipv4Addr::from(ip).to_string();
        let raw = addr::encode(&[text.as_str()], port, Family::Inet).unwrap();
        let decoded = addr::decode(&raw).unwrap();
        prop_assert_eq!(decoded.ip().to_string(), text);
        prop_assert_eq!(decoded.port(), port);
    }

    /// One field set, the rest default: the round trip keeps exactly that.
    #[test]
    fn test_single_field_metadata((_field, info) in any_single_field_info()) {
        let decoded = SndRcvInfo::decode(&info.encode()).unwrap();
        prop_assert_eq!(decoded, info);
    }

    /// The tail never exceeds the claimed length, the cap, or the buffer.
    #[test]
    fn test_tail_len_clamp(length in any::<u32>(), fixed in 0usize..64, available in 0usize..20000) {
        let len = tail_len(length, fixed, available);
        prop_assert!(len <= MAX_NOTIFICATION_DATA);
        prop_assert!(len <= (length as usize).saturating_sub(fixed));
        prop_assert!(len <= available.saturating_sub(fixed));
    }

    /// A remote error with a corrupted length never reads past the buffer.
    #[test]
    fn test_remote_error_no_over_read(length in any::<u32>(), extra in 0usize..10000) {
        const FIXED: usize = 16;
        let buf = notification_buf(SCTP_REMOTE_ERROR, length, FIXED + extra);
        let n = Notification::decode(&buf).unwrap();
        let expected = (length as usize)
            .saturating_sub(FIXED)
            .min(MAX_NOTIFICATION_DATA)
            .min(extra);
        prop_assert_eq!(n.data().len(), expected);
    }

    /// Same for the legacy send-failed layout.
    #[test]
    fn test_send_failed_no_over_read(length in any::<u32>(), extra in 0usize..10000) {
        const FIXED: usize = 48;
        let buf = notification_buf(SCTP_SEND_FAILED, length, FIXED + extra);
        let n = Notification::decode(&buf).unwrap();
        prop_assert!(n.data().len() <= extra);
        prop_assert!(n.data().len() <= MAX_NOTIFICATION_DATA);
    }

    /// Kinds without a tail report no data whatever the length field says.
    #[test]
    fn test_fixed_kinds_have_no_tail(length in any::<u32>(), extra in 0usize..256) {
        for (kind, fixed) in [(SCTP_ASSOC_CHANGE, 20usize), (SCTP_SHUTDOWN_EVENT, 12)] {
            let buf = notification_buf(kind, length, fixed + extra);
            let n = Notification::decode(&buf).unwrap();
            prop_assert!(n.data().is_empty());
        }
    }

    /// Arbitrary bytes either decode or fail cleanly.
    #[test]
    fn test_arbitrary_bytes_never_panic(buf in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = Notification::decode(&buf);
    }
}
