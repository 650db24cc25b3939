//! Server facade tests: one-to-one emulation over peel-off.

mod common;

use std::sync::Arc;

use common::{client, server, socket_message};
use sctp_socket::{
    AssocChangeState, ErrorClass, Notification, Received, RecvFlags, SctpError, SendOptions,
    SocketKind, SocketState,
};

#[test]
fn test_accept_on_one_to_many_is_state_error() {
    let Some(server) = server(false, 5) else { return };
    let err = server.accept().unwrap_err();
    assert_eq!(err.class(), ErrorClass::State);
    assert!(matches!(err, SctpError::InvalidState { .. }));
    // Nothing was read: a nonblocking receive still finds the socket empty.
    assert!(server
        .socket()
        .recv(RecvFlags::DONTWAIT, 1024)
        .unwrap_err()
        .is_would_block());
}

#[test]
fn test_accept_peels_off_and_stashes_first_message() {
    let Some(server) = server(true, 5) else { return };
    let Some(client) = client(server.local_port(), 5) else { return };

    client.send(b"hello", &SendOptions::default()).unwrap();
    let accepted = server.accept().unwrap();
    assert_eq!(accepted.kind(), SocketKind::OneToOne);
    assert_eq!(accepted.state(), SocketState::Connected);
    assert!(!accepted.association_id().is_implicit());

    let first = accepted.take_initial_message().unwrap();
    assert_eq!(first.data, b"hello");
    assert!(accepted.take_initial_message().is_none());

    accepted.send(b"world", &SendOptions::default()).unwrap();
    assert_eq!(socket_message(&client).data, b"world");

    client.send(b"again", &SendOptions::default()).unwrap();
    assert_eq!(socket_message(&accepted).data, b"again");
}

#[test]
fn test_peel_off_after_accept_returns_accepted_socket() {
    let Some(server) = server(true, 5) else { return };
    let Some(client) = client(server.local_port(), 5) else { return };

    client.send(b"hello", &SendOptions::default()).unwrap();
    let accepted = server.accept().unwrap();
    let again = server.peel_off(accepted.association_id()).unwrap();
    assert!(Arc::ptr_eq(&accepted, &again));
    assert_eq!(server.pending_count(), 0);
}

#[test]
fn test_peel_off_same_association_is_shared() {
    let Some(server) = server(true, 5) else { return };
    let Some(_client) = client(server.local_port(), 5) else { return };

    let assoc = loop {
        match server.recv(RecvFlags::empty()).unwrap() {
            Received::Notification(Notification::AssocChange(change))
                if change.state == AssocChangeState::CommUp =>
            {
                break change.association_id
            }
            _ => continue,
        }
    };

    let first = server.peel_off(assoc).unwrap();
    let second = server.peel_off(assoc).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(server.pending_count(), 1);
    assert_eq!(first.association_id(), assoc);

    let claimed = server.accept().unwrap();
    assert!(Arc::ptr_eq(&claimed, &first));
    assert_eq!(server.pending_count(), 0);
}

#[test]
fn test_close_releases_pending_sockets() {
    let Some(server) = server(true, 5) else { return };
    let Some(_client) = client(server.local_port(), 5) else { return };

    let assoc = loop {
        if let Received::Notification(n) = server.recv(RecvFlags::empty()).unwrap() {
            if let Some(id) = n.association_id() {
                break id;
            }
        }
    };
    let pending = server.peel_off(assoc).unwrap();
    server.close().unwrap();
    assert!(server.is_closed());
    assert!(pending.is_closed());
    assert_eq!(server.pending_count(), 0);
}
