//! Common fixtures for the loopback integration tests.
//!
//! Kernel SCTP may be missing (module not loaded, sandboxed CI). Every
//! fixture that opens a socket returns `None` in that case and the test
//! returns early.

#![allow(dead_code)]

use sctp_socket::{
    BindOptions, EventSubscriptions, Family, InitMsg, Message, Received, RecvFlags, SctpError,
    SctpResult, SctpSocket, Server, ServerConfig, SocketKind,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOOPBACK: &str = "127.0.0.1";
pub const BUFFER: usize = 64 * 1024;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Reports a skipped test on stderr, which the harness shows even without `RUST_LOG`.
pub fn skip(what: &str, error: &SctpError) {
    tracing::warn!(error = %error, "kernel SCTP unavailable, skipping {}", what);
    eprintln!("skipping: no kernel SCTP for {} ({})", what, error);
}

fn or_skip<T>(result: SctpResult<T>, what: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) if e.is_unsupported() => {
            skip(what, &e);
            None
        }
        Err(e) => panic!("{}: {}", what, e),
    }
}

pub fn init_msg(streams: u16) -> InitMsg {
    InitMsg {
        num_ostreams: streams,
        max_instreams: streams,
        ..Default::default()
    }
}

/// One-to-many server on 127.0.0.1 with an ephemeral port.
pub fn server(one_to_one: bool, streams: u16) -> Option<Server> {
    init_tracing();
    or_skip(
        Server::bind(ServerConfig {
            addresses: vec![LOOPBACK.into()],
            one_to_one,
            init_msg: Some(init_msg(streams)),
            ..Default::default()
        }),
        "server bind",
    )
}

/// One-to-many client connected to `port` on 127.0.0.1.
pub fn client(port: u16, streams: u16) -> Option<SctpSocket> {
    init_tracing();
    let socket = or_skip(SctpSocket::new(Family::Inet, SocketKind::OneToMany), "client socket")?;
    socket.set_init_msg(&init_msg(streams)).unwrap();
    socket
        .subscribe(&EventSubscriptions {
            data_io: true,
            association: true,
            ..Default::default()
        })
        .unwrap();
    socket
        .bindx(&BindOptions {
            addresses: vec![LOOPBACK.into()],
            ..Default::default()
        })
        .unwrap();
    socket.connectx(&[LOOPBACK], port).unwrap();
    Some(socket)
}

/// Reads until a data message arrives, dropping notifications.
pub fn next_message(recv: impl Fn() -> SctpResult<Received>) -> Message {
    loop {
        match recv().unwrap() {
            Received::Message(m) => return m,
            Received::Notification(n) => tracing::debug!(kind = n.kind_name(), "skipped notification"),
        }
    }
}

pub fn socket_message(socket: &SctpSocket) -> Message {
    next_message(|| socket.recv(RecvFlags::empty(), BUFFER))
}

pub fn server_message(server: &Server) -> Message {
    next_message(|| server.recv(RecvFlags::empty()))
}
