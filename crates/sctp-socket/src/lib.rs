#![warn(missing_docs)]

//! SCTP socket API: multi-homed endpoints, multi-stream messaging, association lifecycle, notifications
//!
//! This crate is the boundary layer between the Linux kernel SCTP stack and
//! application code. It translates the kernel's ancillary send/receive
//! records, sockaddr arrays and tagged-union notification buffers into owned,
//! typed values, and wraps socket creation, bindx/connectx, peel-off and the
//! SCTP socket options. The protocol itself stays in the kernel.

pub mod addr;
pub mod config;
pub mod consts;
pub mod error;
pub mod info;
pub mod io;
pub mod notification;
pub mod options;
pub mod params;
pub mod server;
pub mod socket;
mod sys;
pub mod wire;

pub use addr::{Endpoint, Family};
pub use config::ServerConfig;
pub use error::{DecodeError, ErrorClass, SctpError, SctpResult};
pub use info::{AssociationId, KeyScope, NxtInfo, RcvInfo, SendFlags, SndInfo, SndRcvInfo};
pub use io::{
    capabilities, Capabilities, Message, ReceiveInfo, Received, RecvFlags, SendOptions,
    SendvOptions, DEFAULT_BUFFER_SIZE,
};
pub use notification::{AssocChangeState, Notification, NotificationHeader};
pub use options::{
    AssociationInfo, AssociationState, DefaultSendParams, EventSubscriptions, InitMsg,
    PeerAddrFlags, PeerAddressInfo, PeerAddressParams, RtoInfo, Status, TransportState,
};
pub use params::{from_params, SendRequest, SendvRequest, Truthy};
pub use server::Server;
pub use socket::{BindFlags, BindOptions, CloseOptions, SctpSocket, Shutdown, SocketKind, SocketState};
