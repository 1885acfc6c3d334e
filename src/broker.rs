//! Broker facade and the single-owner event loop.
//!
//! All mutable state — live reservations, client entries, the interface
//! name counter — lives on one spawned task and is never locked. Blocking
//! accept/connect workers run on dedicated threads and post terminal
//! [`Event`]s; offer callbacks from the matching broker arrive the same
//! way. Every handler re-validates that the originating offer or entry
//! still exists before acting, which is what makes withdrawn-while-in-
//! flight races safe: the stale result is simply discarded, closing any
//! socket it delivered.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::ClientEntry;
use crate::deps::Dependencies;
use crate::error::SetupError;
use crate::matching::{MatchingBroker, OfferHandle, OfferId, OfferScore};
use crate::network::{NetworkHandle, NetworkWatch};
use crate::server::ReservedOffer;
use crate::specifier::{CapabilityRequest, HeaderCompression, ReservationId, Role, Specifier};
use crate::transport::{ChannelSocket, ChannelTransport};

/// Prefix for generated virtual interface names. The suffix is a
/// process-lifetime monotonic counter; names are not reused across
/// restarts.
const IFNAME_PREFIX: &str = "canal-tun";

/// Score hint used for every offer this broker registers. Scoring policy
/// belongs to the matching broker; the hint is just passed through.
pub(crate) const OFFER_SCORE: OfferScore = OfferScore(0);

/// Messages processed by the event loop.
pub(crate) enum Event {
    /// A request matched one of our offers.
    NetworkNeeded {
        offer: OfferId,
        request: CapabilityRequest,
    },
    /// A previously matched request went away.
    NetworkUnneeded {
        offer: OfferId,
        request: CapabilityRequest,
    },
    /// Accept worker: one inbound connection.
    Accepted {
        reservation: ReservationId,
        socket: Arc<dyn ChannelSocket>,
    },
    /// Accept worker: the listening socket failed or was closed. Terminal;
    /// the worker has stopped looping.
    AcceptFailed { reservation: ReservationId },
    /// Connect worker: the outbound attempt succeeded.
    Connected { specifier: Specifier },
    /// Connect worker: the outbound attempt failed. Terminal.
    ConnectFailed { specifier: Specifier },
    /// Forwarder reported an unrecoverable error.
    NetworkError { owner: NetworkOwner },
    /// Forwarder reported the network is no longer wanted.
    NetworkUnwanted { owner: NetworkOwner },
    /// Tear everything down and stop the loop.
    Shutdown,
}

/// Which offer a live network belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NetworkOwner {
    Reservation(ReservationId),
    Client(Specifier),
}

/// The broker facade. Registers the two blanket offers and runs the event
/// loop that owns every piece of mutable state.
pub struct Broker;

impl Broker {
    /// Register the blanket server-reservation and client offers with the
    /// matching broker and start the event loop.
    pub fn spawn(
        transport: Arc<dyn ChannelTransport>,
        deps: Arc<dyn Dependencies>,
        matching: Arc<dyn MatchingBroker>,
    ) -> BrokerHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let blanket_server = OfferId(0);
        let blanket_client = OfferId(1);
        matching.register_offer(
            OFFER_SCORE,
            &Specifier::blanket(Role::Server),
            OfferHandle {
                id: blanket_server,
                tx: tx.clone(),
            },
        );
        matching.register_offer(
            OFFER_SCORE,
            &Specifier::blanket(Role::Client),
            OfferHandle {
                id: blanket_client,
                tx: tx.clone(),
            },
        );
        info!("broker started, blanket offers registered");

        let mut event_loop = EventLoop {
            transport,
            deps,
            matching,
            tx: tx.clone(),
            blanket_server,
            blanket_client,
            reserved: HashMap::new(),
            clients: HashMap::new(),
            next_offer: 2,
            next_ifindex: 0,
        };
        let task = tokio::spawn(async move { event_loop.run(rx).await });

        BrokerHandle { tx, task }
    }
}

/// Handle to a running broker.
pub struct BrokerHandle {
    tx: UnboundedSender<Event>,
    task: JoinHandle<()>,
}

impl BrokerHandle {
    /// Tear down every live reservation and client entry, unregister all
    /// offers, and stop the event loop. Resolves once the loop has drained.
    pub async fn shutdown(self) {
        let _ = self.tx.send(Event::Shutdown);
        let _ = self.task.await;
    }
}

/// Event-loop state. Only ever touched from `run`, so none of it is
/// locked.
pub(crate) struct EventLoop {
    pub(crate) transport: Arc<dyn ChannelTransport>,
    pub(crate) deps: Arc<dyn Dependencies>,
    pub(crate) matching: Arc<dyn MatchingBroker>,
    pub(crate) tx: UnboundedSender<Event>,
    pub(crate) blanket_server: OfferId,
    pub(crate) blanket_client: OfferId,
    pub(crate) reserved: HashMap<ReservationId, ReservedOffer>,
    pub(crate) clients: HashMap<Specifier, ClientEntry>,
    next_offer: u64,
    next_ifindex: u64,
}

impl EventLoop {
    async fn run(&mut self, mut rx: UnboundedReceiver<Event>) {
        while let Some(event) = rx.recv().await {
            match event {
                Event::NetworkNeeded { offer, request } => self.on_network_needed(offer, request),
                Event::NetworkUnneeded { offer, request } => {
                    self.on_network_unneeded(offer, request)
                }
                Event::Accepted {
                    reservation,
                    socket,
                } => self.on_accepted(reservation, socket),
                Event::AcceptFailed { reservation } => self.on_accept_failed(reservation),
                Event::Connected { specifier } => self.on_connected(specifier),
                Event::ConnectFailed { specifier } => self.on_connect_failed(specifier),
                Event::NetworkError { owner } => self.on_network_signal(owner, "error"),
                Event::NetworkUnwanted { owner } => self.on_network_signal(owner, "unwanted"),
                Event::Shutdown => break,
            }
        }
        self.tear_down_all();
    }

    fn on_network_needed(&mut self, offer: OfferId, request: CapabilityRequest) {
        if offer == self.blanket_server {
            self.reservation_needed(request);
        } else if offer == self.blanket_client {
            self.client_needed(request);
        } else {
            // Reserved offers start their accept loop at reservation time;
            // a match on the narrow offer needs no additional work.
            debug!(offer = offer.0, "network needed on reserved offer");
        }
    }

    fn on_network_unneeded(&mut self, offer: OfferId, request: CapabilityRequest) {
        if offer == self.blanket_client {
            self.client_unneeded(request);
        } else {
            // Blanket and narrow server offers both resolve through the
            // reservation id; a double delivery hits the membership check
            // in the teardown path and becomes a no-op.
            self.reservation_unneeded(request);
        }
    }

    fn on_network_signal(&mut self, owner: NetworkOwner, signal: &'static str) {
        match owner {
            NetworkOwner::Reservation(reservation) => {
                if self.reserved.contains_key(&reservation) {
                    // The reservation, not the single connection, is the
                    // unit of lifetime for a server-side network.
                    info!(
                        reservation = reservation.0,
                        signal, "server network signal, destroying reservation"
                    );
                    self.tear_down_reservation(reservation);
                }
            }
            NetworkOwner::Client(specifier) => {
                if self.clients.contains_key(&specifier) {
                    info!(signal, "client network signal, releasing entry");
                    self.fail_client_entry(&specifier);
                }
            }
        }
    }

    pub(crate) fn next_offer_id(&mut self) -> OfferId {
        let id = OfferId(self.next_offer);
        self.next_offer += 1;
        id
    }

    fn next_ifname(&mut self) -> String {
        let n = self.next_ifindex;
        self.next_ifindex += 1;
        format!("{IFNAME_PREFIX}{n}")
    }

    /// Build the interface + ip-config + forwarder group for an established
    /// channel socket. Runs synchronously on the event loop.
    pub(crate) fn build_network(
        &mut self,
        socket: Arc<dyn ChannelSocket>,
        compression: HeaderCompression,
        owner: NetworkOwner,
    ) -> Result<NetworkHandle, SetupError> {
        let ifname = self.next_ifname();
        let iface = self.deps.create_virtual_interface(&ifname)?;
        let ip_config = self.deps.create_ip_config_client("canal", &ifname);
        let watch = NetworkWatch {
            owner,
            tx: self.tx.clone(),
        };
        let forwarder =
            match self
                .deps
                .create_packet_forwarder(iface.as_ref(), socket.clone(), compression, watch)
            {
                Ok(f) => f,
                Err(e) => {
                    ip_config.shutdown();
                    iface.destroy();
                    return Err(e);
                }
            };
        Ok(NetworkHandle::new(ifname, iface, ip_config, socket, forwarder))
    }

    fn tear_down_all(&mut self) {
        let reservations: Vec<ReservationId> = self.reserved.keys().copied().collect();
        for reservation in reservations {
            self.tear_down_reservation(reservation);
        }
        let specifiers: Vec<Specifier> = self.clients.keys().cloned().collect();
        for specifier in specifiers {
            self.release_client_entry(&specifier);
        }
        self.matching.unregister_offer(self.blanket_server);
        self.matching.unregister_offer(self.blanket_client);
        info!("broker stopped");
    }
}
