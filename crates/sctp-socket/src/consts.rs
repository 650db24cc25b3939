//! Numeric constants fixed by the Linux kernel SCTP ABI (`linux/sctp.h`).
//!
//! These values are owned by the kernel and must never be renumbered.

/// `IPPROTO_SCTP`, also used as the socket option level (`SOL_SCTP`).
pub const IPPROTO_SCTP: i32 = libc::IPPROTO_SCTP;

/// `sctp_assoc_t`
pub type RawAssocId = i32;

// Socket options (level IPPROTO_SCTP).
pub(crate) const SCTP_RTOINFO: i32 = 0;
pub(crate) const SCTP_ASSOCINFO: i32 = 1;
pub(crate) const SCTP_INITMSG: i32 = 2;
pub(crate) const SCTP_NODELAY: i32 = 3;
pub(crate) const SCTP_AUTOCLOSE: i32 = 4;
pub(crate) const SCTP_PEER_ADDR_PARAMS: i32 = 9;
pub(crate) const SCTP_DEFAULT_SEND_PARAM: i32 = 10;
pub(crate) const SCTP_EVENTS: i32 = 11;
pub(crate) const SCTP_I_WANT_MAPPED_V4_ADDR: i32 = 12;
pub(crate) const SCTP_STATUS: i32 = 14;
pub(crate) const SCTP_AUTH_KEY: i32 = 23;
pub(crate) const SCTP_AUTH_ACTIVE_KEY: i32 = 24;
pub(crate) const SCTP_AUTH_DELETE_KEY: i32 = 25;
pub(crate) const SCTP_RECVRCVINFO: i32 = 32;
pub(crate) const SCTP_RECVNXTINFO: i32 = 33;
pub(crate) const SCTP_SOCKOPT_BINDX_ADD: i32 = 100;
pub(crate) const SCTP_SOCKOPT_BINDX_REM: i32 = 101;
pub(crate) const SCTP_SOCKOPT_PEELOFF: i32 = 102;
pub(crate) const SCTP_GET_PEER_ADDRS: i32 = 108;
pub(crate) const SCTP_GET_LOCAL_ADDRS: i32 = 109;
pub(crate) const SCTP_SOCKOPT_CONNECTX: i32 = 110;
pub(crate) const SCTP_SOCKOPT_PEELOFF_FLAGS: i32 = 122;
pub(crate) const SCTP_AUTH_SUPPORTED: i32 = 127;

// Control message types (`enum sctp_cmsg_type`).
pub(crate) const SCTP_SNDRCV: i32 = 1;
pub(crate) const SCTP_SNDINFO: i32 = 2;
pub(crate) const SCTP_RCVINFO: i32 = 3;
pub(crate) const SCTP_NXTINFO: i32 = 4;
pub(crate) const SCTP_PRINFO: i32 = 5;
pub(crate) const SCTP_AUTHINFO: i32 = 6;
pub(crate) const SCTP_DSTADDRV4: i32 = 7;
pub(crate) const SCTP_DSTADDRV6: i32 = 8;

/// `SCTP_PR_SCTP_TTL`, the timed-reliability policy used for message TTLs.
pub const SCTP_PR_SCTP_TTL: u16 = 0x0010;

/// `MSG_NOTIFICATION`: set in `msg_flags` when a read returned an event record.
pub const MSG_NOTIFICATION: i32 = 0x8000;

// Send/receive info flags (`sinfo_flags`).
/// Deliver without ordering guarantees.
pub const SCTP_UNORDERED: u16 = 1 << 0;
/// Override the primary destination address.
pub const SCTP_ADDR_OVER: u16 = 1 << 1;
/// Abort the association.
pub const SCTP_ABORT: u16 = 1 << 2;
/// Sack immediately.
pub const SCTP_SACK_IMMEDIATELY: u16 = 1 << 3;
/// Send to every association on the socket.
pub const SCTP_SENDALL: u16 = 1 << 6;
/// Graceful shutdown after the data is sent.
pub const SCTP_EOF: u16 = libc::MSG_FIN as u16;

// Notification types (`enum sctp_sn_type`).
/// Base of the notification type space.
pub const SCTP_SN_TYPE_BASE: u16 = 1 << 15;
/// Not a notification: marks data-io ancillary events in subscription space.
pub const SCTP_DATA_IO_EVENT: u16 = SCTP_SN_TYPE_BASE;
/// Association state changed.
pub const SCTP_ASSOC_CHANGE: u16 = SCTP_SN_TYPE_BASE + 1;
/// A peer transport address changed state.
pub const SCTP_PEER_ADDR_CHANGE: u16 = SCTP_SN_TYPE_BASE + 2;
/// Legacy send-failed event carrying a `sctp_sndrcvinfo`.
pub const SCTP_SEND_FAILED: u16 = SCTP_SN_TYPE_BASE + 3;
/// Peer sent an operation error.
pub const SCTP_REMOTE_ERROR: u16 = SCTP_SN_TYPE_BASE + 4;
/// Peer sent SHUTDOWN.
pub const SCTP_SHUTDOWN_EVENT: u16 = SCTP_SN_TYPE_BASE + 5;
/// Partial delivery was aborted.
pub const SCTP_PARTIAL_DELIVERY_EVENT: u16 = SCTP_SN_TYPE_BASE + 6;
/// Peer adaptation layer indication.
pub const SCTP_ADAPTATION_INDICATION: u16 = SCTP_SN_TYPE_BASE + 7;
/// Authentication key event.
pub const SCTP_AUTHENTICATION_EVENT: u16 = SCTP_SN_TYPE_BASE + 8;
/// No user data left to send.
pub const SCTP_SENDER_DRY_EVENT: u16 = SCTP_SN_TYPE_BASE + 9;
/// Streams were reset.
pub const SCTP_STREAM_RESET_EVENT: u16 = SCTP_SN_TYPE_BASE + 10;
/// Association was reset.
pub const SCTP_ASSOC_RESET_EVENT: u16 = SCTP_SN_TYPE_BASE + 11;
/// Stream counts changed.
pub const SCTP_STREAM_CHANGE_EVENT: u16 = SCTP_SN_TYPE_BASE + 12;
/// Send-failed event carrying a `sctp_sndinfo`.
pub const SCTP_SEND_FAILED_EVENT: u16 = SCTP_SN_TYPE_BASE + 13;

// Association change states (`sac_state`).
/// Association is up.
pub const SCTP_COMM_UP: u16 = 0;
/// Association was lost.
pub const SCTP_COMM_LOST: u16 = 1;
/// Peer restarted.
pub const SCTP_RESTART: u16 = 2;
/// Shutdown completed.
pub const SCTP_SHUTDOWN_COMP: u16 = 3;
/// Association could not be started.
pub const SCTP_CANT_STR_ASSOC: u16 = 4;

// Association states (`sstat_state`).
/// Closed.
pub const SCTP_CLOSED: i32 = 1;
/// COOKIE-WAIT.
pub const SCTP_COOKIE_WAIT: i32 = 2;
/// COOKIE-ECHOED.
pub const SCTP_COOKIE_ECHOED: i32 = 3;
/// ESTABLISHED.
pub const SCTP_ESTABLISHED: i32 = 4;
/// SHUTDOWN-PENDING.
pub const SCTP_SHUTDOWN_PENDING: i32 = 5;
/// SHUTDOWN-SENT.
pub const SCTP_SHUTDOWN_SENT: i32 = 6;
/// SHUTDOWN-RECEIVED.
pub const SCTP_SHUTDOWN_RECEIVED: i32 = 7;
/// SHUTDOWN-ACK-SENT.
pub const SCTP_SHUTDOWN_ACK_SENT: i32 = 8;

/// Special association id: future associations only (endpoint scope).
pub const SCTP_FUTURE_ASSOC: RawAssocId = 0;
/// Special association id: all current associations.
pub const SCTP_CURRENT_ASSOC: RawAssocId = 1;
/// Special association id: current and future associations.
pub const SCTP_ALL_ASSOC: RawAssocId = 2;

/// Upper bound on the opaque data copied out of a remote-error or send-failed event.
pub const MAX_NOTIFICATION_DATA: usize = 8192;

/// Size of `struct sockaddr_storage` on Linux.
pub(crate) const SOCKADDR_STORAGE_SIZE: usize = 128;
