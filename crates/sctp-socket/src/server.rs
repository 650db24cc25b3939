//! Server facade over one listening one-to-many socket.
//!
//! In the default mode every peer shares the socket and callers route by
//! association id. With `one_to_one` set, [`Server::accept`] hands out a
//! dedicated peeled-off socket per association instead.

use std::fmt;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{SctpError, SctpResult};
use crate::info::AssociationId;
use crate::io::{Received, RecvFlags, SendOptions};
use crate::notification::Notification;
use crate::socket::{BindFlags, BindOptions, CloseOptions, SctpSocket, SocketKind};

/// Receive buffer used by [`Server::recv`] and [`Server::accept`].
pub const SERVER_BUFFER_SIZE: usize = 64 * 1024;

enum Slot<S> {
    /// Peeled off, waiting for `accept`.
    Pending(Arc<S>),
    /// Handed out by `accept`; the caller owns it.
    Accepted(Weak<S>),
}

/// Peeled-off sockets by association.
///
/// Every transition for one association happens under that association's
/// shard lock, so a peel-off racing an accept peels the association once.
struct PeeledAssociations<S> {
    slots: DashMap<AssociationId, Slot<S>>,
}

impl<S> PeeledAssociations<S> {
    fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// The socket for `assoc`, running `peel` only when none exists yet.
    fn peel(&self, assoc: AssociationId, peel: impl FnOnce() -> SctpResult<S>) -> SctpResult<Arc<S>> {
        let slot = self
            .slots
            .entry(assoc)
            .or_try_insert_with(|| peel().map(|s| Slot::Pending(Arc::new(s))))?;
        match slot.value() {
            Slot::Pending(socket) => Ok(Arc::clone(socket)),
            Slot::Accepted(socket) => socket.upgrade().ok_or_else(|| {
                SctpError::invalid_state(format!("association {} was accepted and released", assoc))
            }),
        }
    }

    /// Marks `assoc` accepted and returns its socket, peeling it off if needed.
    fn claim(&self, assoc: AssociationId, peel: impl FnOnce() -> SctpResult<S>) -> SctpResult<Arc<S>> {
        let mut slot = self
            .slots
            .entry(assoc)
            .or_try_insert_with(|| peel().map(|s| Slot::Pending(Arc::new(s))))?;
        let socket = match slot.value() {
            Slot::Pending(socket) => Arc::clone(socket),
            Slot::Accepted(_) => {
                return Err(SctpError::invalid_state(format!(
                    "association {} was already accepted",
                    assoc
                )))
            }
        };
        *slot.value_mut() = Slot::Accepted(Arc::downgrade(&socket));
        Ok(socket)
    }

    /// Claims any pending socket.
    fn claim_any(&self) -> Option<(AssociationId, Arc<S>)> {
        for mut slot in self.slots.iter_mut() {
            let socket = match slot.value() {
                Slot::Pending(socket) => Arc::clone(socket),
                Slot::Accepted(_) => continue,
            };
            *slot.value_mut() = Slot::Accepted(Arc::downgrade(&socket));
            return Some((*slot.key(), socket));
        }
        None
    }

    /// Forgets accepted associations whose socket the caller has dropped.
    fn prune(&self) {
        self.slots
            .retain(|_, slot| !matches!(slot, Slot::Accepted(socket) if socket.strong_count() == 0));
    }

    fn evict(&self, assoc: AssociationId) -> bool {
        self.slots.remove(&assoc).is_some()
    }

    fn pending_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Pending(_)))
            .count()
    }

    /// Empties the registry, returning the sockets nobody claimed.
    fn drain_pending(&self) -> Vec<(AssociationId, Arc<S>)> {
        let keys: Vec<AssociationId> = self.slots.iter().map(|slot| *slot.key()).collect();
        keys.into_iter()
            .filter_map(|assoc| match self.slots.remove(&assoc) {
                Some((assoc, Slot::Pending(socket))) => Some((assoc, socket)),
                _ => None,
            })
            .collect()
    }
}

/// A bound, listening SCTP server.
pub struct Server {
    socket: SctpSocket,
    config: ServerConfig,
    port: u16,
    peeled: PeeledAssociations<SctpSocket>,
}

impl Server {
    /// Creates the listening socket, applies `config` and starts listening.
    ///
    /// The socket is always one-to-many; one-to-one mode is emulated with
    /// peel-off, which the kernel only offers on one-to-many sockets.
    pub fn bind(config: ServerConfig) -> SctpResult<Self> {
        let socket = SctpSocket::new(config.family, SocketKind::OneToMany)?;
        if let Some(init) = &config.init_msg {
            socket.set_init_msg(init)?;
        }
        if let Some(nodelay) = config.nodelay {
            socket.set_nodelay(nodelay)?;
        }
        if let Some(secs) = config.autoclose {
            socket.set_autoclose(secs)?;
        }
        socket.subscribe(&config.subscriptions)?;
        let port = socket.bindx(&BindOptions {
            addresses: config.addresses.clone(),
            port: config.port,
            flags: BindFlags::Add,
            reuse_addr: config.reuse_addr,
        })?;
        socket.listen(config.backlog)?;

        let server = Self {
            socket,
            config,
            port,
            peeled: PeeledAssociations::new(),
        };
        info!(server = %server, "sctp server listening");
        Ok(server)
    }

    /// The listening socket.
    pub fn socket(&self) -> &SctpSocket {
        &self.socket
    }

    /// Configuration the server was bound with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Whether [`accept`](Self::accept) is available.
    pub fn is_one_to_one(&self) -> bool {
        self.config.one_to_one
    }

    /// Port the server is bound to, after ephemeral-port resolution.
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Addresses the endpoint is bound to.
    pub fn local_addresses(&self) -> SctpResult<Vec<SocketAddr>> {
        self.socket.local_addresses(Some(AssociationId::IMPLICIT))
    }

    /// Receives the next message or notification from any association.
    pub fn recv(&self, flags: RecvFlags) -> SctpResult<Received> {
        self.socket.recv(flags, SERVER_BUFFER_SIZE)
    }

    /// Sends on the shared socket; `options.association_id` picks the peer.
    pub fn send(&self, data: &[u8], options: &SendOptions) -> SctpResult<usize> {
        self.socket.send(data, options)
    }

    /// Waits for data from an association nobody has claimed yet and
    /// returns a dedicated socket for it.
    ///
    /// Sockets already peeled off with [`peel_off`](Self::peel_off) are
    /// claimed first, without reading. The message that triggered the
    /// accept is stashed on the returned socket
    /// ([`SctpSocket::take_initial_message`]). Notifications are consumed;
    /// a terminal association change drops any pending socket for that
    /// association. Data still queued on the listening socket for an
    /// association that was already accepted is a state error.
    ///
    /// The association id comes from the message metadata, so the
    /// listening socket needs the `data_io` subscription (or extended
    /// receive info switched on by [`SctpSocket::recv_vectored`]).
    pub fn accept(&self) -> SctpResult<Arc<SctpSocket>> {
        if !self.config.one_to_one {
            return Err(SctpError::invalid_state(
                "accept requires a server in one-to-one mode",
            ));
        }
        self.peeled.prune();
        if let Some((assoc, socket)) = self.peeled.claim_any() {
            debug!(association_id = %assoc, "claimed pending association");
            return Ok(socket);
        }
        loop {
            let message = match self.socket.recv(RecvFlags::empty(), SERVER_BUFFER_SIZE)? {
                Received::Notification(notification) => {
                    self.observe(&notification);
                    continue;
                }
                Received::Message(message) => message,
            };
            let Some(assoc) = message.association_id() else {
                return Err(SctpError::invalid_state(
                    "received data without association info; subscribe to data_io events",
                ));
            };
            let peeled = self.peeled.claim(assoc, || self.socket.peel_off(assoc))?;
            peeled.stash_initial_message(message);
            info!(association_id = %assoc, fd = peeled.as_raw_fd(), "sctp association accepted");
            return Ok(peeled);
        }
    }

    fn observe(&self, notification: &Notification) {
        trace!(kind = notification.kind_name(), "server notification");
        if let Notification::AssocChange(change) = notification {
            if change.state.is_terminal() && self.peeled.evict(change.association_id) {
                debug!(association_id = %change.association_id, state = ?change.state, "dropped peeled association");
            }
        }
    }

    /// Peels `assoc` off into a pending socket that a later
    /// [`accept`](Self::accept) will claim.
    ///
    /// Peeling the same association again returns the same socket, also
    /// after `accept` has handed it out.
    pub fn peel_off(&self, assoc: AssociationId) -> SctpResult<Arc<SctpSocket>> {
        self.peeled.peel(assoc, || self.socket.peel_off(assoc))
    }

    /// Peeled-off sockets not yet claimed by `accept`.
    pub fn pending_count(&self) -> usize {
        self.peeled.pending_count()
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.socket.is_closed()
    }

    /// Closes the listening socket and every unclaimed peeled-off socket.
    ///
    /// Sockets already handed out by `accept` belong to the caller and stay open.
    pub fn close(&self) -> SctpResult<()> {
        let options = CloseOptions {
            linger: None,
            reuse_addr: self.config.reuse_addr,
        };
        for (assoc, socket) in self.peeled.drain_pending() {
            if let Err(e) = socket.close(&CloseOptions::default()) {
                warn!(association_id = %assoc, error = %e, "failed to close pending socket");
            }
        }
        self.socket.close(&options)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_closed() {
            return f.write_str("sctp-server[closed]");
        }
        let addresses = if self.config.addresses.is_empty() {
            self.config.family.wildcard().to_string()
        } else {
            self.config.addresses.join(",")
        };
        let mode = if self.config.one_to_one {
            "one-to-one"
        } else {
            "one-to-many"
        };
        write!(f, "sctp-server[{}:{} {}]", addresses, self.port, mode)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("socket", &self.socket)
            .field("one_to_one", &self.config.one_to_one)
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorClass;

    const ASSOC: AssociationId = AssociationId(5);

    /// Registry whose peel-off hands out increasing ids and counts calls.
    struct Fixture {
        registry: PeeledAssociations<usize>,
        peels: AtomicUsize,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                registry: PeeledAssociations::new(),
                peels: AtomicUsize::new(0),
            }
        }

        fn peel_fn(&self) -> impl FnOnce() -> SctpResult<usize> + '_ {
            move || Ok(self.peels.fetch_add(1, Ordering::SeqCst))
        }

        fn peel(&self, assoc: AssociationId) -> SctpResult<Arc<usize>> {
            self.registry.peel(assoc, self.peel_fn())
        }

        fn claim(&self, assoc: AssociationId) -> SctpResult<Arc<usize>> {
            self.registry.claim(assoc, self.peel_fn())
        }

        fn peels(&self) -> usize {
            self.peels.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_peel_twice_peels_once() {
        let f = Fixture::new();
        let first = f.peel(ASSOC).unwrap();
        let second = f.peel(ASSOC).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.peels(), 1);
        assert_eq!(f.registry.pending_count(), 1);
    }

    #[test]
    fn test_failed_peel_leaves_no_entry() {
        let f = Fixture::new();
        let err = f
            .registry
            .peel(ASSOC, || Err(SctpError::from_errno("sctp_peeloff", libc::EINVAL)))
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
        assert_eq!(f.registry.pending_count(), 0);
        f.peel(ASSOC).unwrap();
        assert_eq!(f.peels(), 1);
    }

    #[test]
    fn test_claim_takes_pending_socket() {
        let f = Fixture::new();
        let pending = f.peel(ASSOC).unwrap();
        let claimed = f.claim(ASSOC).unwrap();
        assert!(Arc::ptr_eq(&pending, &claimed));
        assert_eq!(f.peels(), 1);
        assert_eq!(f.registry.pending_count(), 0);
    }

    #[test]
    fn test_peel_after_claim_returns_accepted_socket() {
        let f = Fixture::new();
        let accepted = f.claim(ASSOC).unwrap();
        let again = f.peel(ASSOC).unwrap();
        assert!(Arc::ptr_eq(&accepted, &again));
        assert_eq!(f.peels(), 1);
        assert_eq!(f.registry.pending_count(), 0);
    }

    #[test]
    fn test_second_claim_is_state_error() {
        let f = Fixture::new();
        let _accepted = f.claim(ASSOC).unwrap();
        let err = f.claim(ASSOC).unwrap_err();
        assert_eq!(err.class(), ErrorClass::State);
        assert_eq!(f.peels(), 1);
    }

    #[test]
    fn test_released_association_is_pruned() {
        let f = Fixture::new();
        drop(f.claim(ASSOC).unwrap());
        let err = f.peel(ASSOC).unwrap_err();
        assert!(matches!(err, SctpError::InvalidState { .. }));
        f.registry.prune();
        assert!(!f.registry.evict(ASSOC));
    }

    #[test]
    fn test_claim_any_skips_accepted() {
        let f = Fixture::new();
        let _accepted = f.claim(AssociationId(1)).unwrap();
        assert!(f.registry.claim_any().is_none());
        let pending = f.peel(AssociationId(2)).unwrap();
        let (assoc, claimed) = f.registry.claim_any().unwrap();
        assert_eq!(assoc, AssociationId(2));
        assert!(Arc::ptr_eq(&pending, &claimed));
        assert!(f.registry.claim_any().is_none());
    }

    #[test]
    fn test_evict_and_drain() {
        let f = Fixture::new();
        f.peel(AssociationId(1)).unwrap();
        f.peel(AssociationId(2)).unwrap();
        let _accepted = f.claim(AssociationId(3)).unwrap();
        assert!(f.registry.evict(AssociationId(1)));
        assert!(!f.registry.evict(AssociationId(1)));

        let drained = f.registry.drain_pending();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, AssociationId(2));
        assert_eq!(f.registry.pending_count(), 0);
        assert!(!f.registry.evict(AssociationId(3)));
    }

    #[test]
    fn test_concurrent_peel_and_claim_peel_once() {
        const PEELERS: usize = 8;
        let registry = PeeledAssociations::<usize>::new();
        let peels = AtomicUsize::new(0);
        let barrier = Barrier::new(PEELERS + 1);
        let slow_peel = || -> SctpResult<usize> {
            thread::sleep(Duration::from_millis(20));
            Ok(peels.fetch_add(1, Ordering::SeqCst))
        };

        let (claimed, peeled) = thread::scope(|scope| {
            let peelers: Vec<_> = (0..PEELERS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        registry.peel(ASSOC, slow_peel).unwrap()
                    })
                })
                .collect();
            let claimer = scope.spawn(|| {
                barrier.wait();
                registry.claim(ASSOC, slow_peel).unwrap()
            });
            let peeled: Vec<Arc<usize>> = peelers.into_iter().map(|h| h.join().unwrap()).collect();
            (claimer.join().unwrap(), peeled)
        });

        assert_eq!(peels.load(Ordering::SeqCst), 1);
        assert!(peeled.iter().all(|p| Arc::ptr_eq(p, &claimed)));
        assert_eq!(registry.pending_count(), 0);
    }

    fn bind_or_skip(config: ServerConfig) -> Option<Server> {
        match Server::bind(config) {
            Ok(s) => Some(s),
            Err(e) if e.is_unsupported() => {
                eprintln!("skipping: no kernel SCTP ({})", e);
                None
            }
            Err(e) => panic!("bind: {}", e),
        }
    }

    fn loopback(one_to_one: bool) -> ServerConfig {
        ServerConfig {
            addresses: vec!["127.0.0.1".into()],
            one_to_one,
            ..Default::default()
        }
    }

    #[test]
    fn test_bind_resolves_port() {
        let Some(server) = bind_or_skip(loopback(false)) else {
            return;
        };
        assert_ne!(server.local_port(), 0);
        assert_eq!(server.socket().kind(), SocketKind::OneToMany);
        let addrs = server.local_addresses().unwrap();
        assert!(addrs.iter().any(|a| a.port() == server.local_port()));
    }

    #[test]
    fn test_display() {
        let Some(server) = bind_or_skip(loopback(false)) else {
            return;
        };
        assert_eq!(
            server.to_string(),
            format!("sctp-server[127.0.0.1:{} one-to-many]", server.local_port())
        );
    }

    #[test]
    fn test_display_wildcard() {
        let Some(server) = bind_or_skip(ServerConfig {
            one_to_one: true,
            ..Default::default()
        }) else {
            return;
        };
        assert_eq!(
            server.to_string(),
            format!("sctp-server[0.0.0.0:{} one-to-one]", server.local_port())
        );
    }

    #[test]
    fn test_accept_requires_one_to_one() {
        let Some(server) = bind_or_skip(loopback(false)) else {
            return;
        };
        let err = server.accept().unwrap_err();
        assert!(matches!(err, SctpError::InvalidState { .. }));
    }

    #[test]
    fn test_close_idempotent() {
        let Some(server) = bind_or_skip(loopback(true)) else {
            return;
        };
        assert!(!server.is_closed());
        server.close().unwrap();
        server.close().unwrap();
        assert!(server.is_closed());
        assert_eq!(server.to_string(), "sctp-server[closed]");
        assert!(matches!(server.accept().unwrap_err(), SctpError::Closed));
    }

    #[test]
    fn test_peel_off_unknown_association_fails() {
        let Some(server) = bind_or_skip(loopback(true)) else {
            return;
        };
        let err = server.peel_off(AssociationId(12345)).unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::System);
        assert_eq!(server.pending_count(), 0);
    }
}
