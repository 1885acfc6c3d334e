//! Server-role offers: the blanket reservation offer and the narrow
//! reserved offers it derives.
//!
//! A reservation request reserves a listening endpoint before any
//! connection exists. The reserved offer owns the listening socket, its
//! accept worker and every network accepted under it; the reservation —
//! not the individual connection — is the unit of lifetime, so all of it
//! is torn down together.

use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::broker::{Event, EventLoop, NetworkOwner, OFFER_SCORE};
use crate::matching::{OfferHandle, OfferId};
use crate::network::NetworkHandle;
use crate::specifier::{CapabilityRequest, ReservationId, Role, Specifier};
use crate::transport::{ChannelSocket, ListeningSocket};

/// One live reservation: a narrow server offer plus its accept loop.
///
/// `live_networks` normally holds at most one entry; more than one is a
/// tolerated transient when several remotes connect before the broker
/// re-evaluates, and all of them share the reservation's fate.
pub(crate) struct ReservedOffer {
    pub(crate) offer: OfferId,
    pub(crate) specifier: Specifier,
    pub(crate) listener: Arc<dyn ListeningSocket>,
    pub(crate) worker: Option<thread::JoinHandle<()>>,
    pub(crate) live_networks: Vec<NetworkHandle>,
}

impl EventLoop {
    /// Blanket reservation offer matched a request.
    pub(crate) fn reservation_needed(&mut self, request: CapabilityRequest) {
        let Some(spec) = request.specifier.clone() else {
            return;
        };
        if spec.role != Role::Server || spec.remote.is_some() || spec.endpoint.is_some() {
            debug!(request = request.id.0, "ignoring non-reservation specifier");
            return;
        }
        let Some(reservation) = request.reservation else {
            debug!(
                request = request.id.0,
                "ignoring server request without reservation id"
            );
            return;
        };
        if self.reserved.contains_key(&reservation) {
            debug!(
                reservation = reservation.0,
                "duplicate reservation request ignored"
            );
            return;
        }

        let listener = match self.transport.listen() {
            Ok(listener) => listener,
            Err(e) => {
                warn!(
                    reservation = reservation.0,
                    error = %e,
                    "failed to allocate listening socket"
                );
                self.matching.declare_unfulfillable(&request);
                return;
            }
        };
        let endpoint = listener.endpoint_id();

        // Narrow the blanket specifier down to the endpoint we just bound.
        let reserved_spec = Specifier {
            endpoint: Some(endpoint),
            ..spec
        };
        let offer = self.next_offer_id();
        self.matching.register_offer(
            OFFER_SCORE,
            &reserved_spec,
            OfferHandle {
                id: offer,
                tx: self.tx.clone(),
            },
        );
        let worker = spawn_accept_worker(reservation, listener.clone(), self.tx.clone());
        info!(
            reservation = reservation.0,
            endpoint = endpoint.0,
            "reserved server offer registered"
        );
        self.reserved.insert(
            reservation,
            ReservedOffer {
                offer,
                specifier: reserved_spec,
                listener,
                worker: Some(worker),
                live_networks: Vec::new(),
            },
        );
    }

    /// The governing reservation request went away.
    pub(crate) fn reservation_unneeded(&mut self, request: CapabilityRequest) {
        let Some(reservation) = request.reservation else {
            return;
        };
        self.tear_down_reservation(reservation);
    }

    /// One inbound connection arrived on a reserved listening socket.
    pub(crate) fn on_accepted(&mut self, reservation: ReservationId, socket: Arc<dyn ChannelSocket>) {
        let Some(offer) = self.reserved.get(&reservation) else {
            // Torn down while the accept was in flight.
            debug!(
                reservation = reservation.0,
                "discarding connection for dead reservation"
            );
            socket.close();
            return;
        };
        let compression = offer.specifier.compression;
        let owner = NetworkOwner::Reservation(reservation);
        match self.build_network(socket.clone(), compression, owner) {
            Ok(network) => {
                info!(
                    reservation = reservation.0,
                    ifname = network.interface_name(),
                    "inbound network up"
                );
                if let Some(offer) = self.reserved.get_mut(&reservation) {
                    offer.live_networks.push(network);
                }
            }
            Err(e) => {
                warn!(
                    reservation = reservation.0,
                    error = %e,
                    "network setup failed, dropping connection"
                );
                socket.close();
            }
        }
    }

    /// The accept worker hit an error, or observed its socket closing.
    /// If the reservation is already gone, our own teardown caused the
    /// close and there is nothing left to do.
    pub(crate) fn on_accept_failed(&mut self, reservation: ReservationId) {
        if self.reserved.contains_key(&reservation) {
            info!(
                reservation = reservation.0,
                "accept loop failed, destroying reservation"
            );
            self.tear_down_reservation(reservation);
        }
    }

    /// Destroy a reservation: narrow offer, listening socket, accept
    /// worker, and every network accepted under it. A second call for the
    /// same id is a no-op.
    pub(crate) fn tear_down_reservation(&mut self, reservation: ReservationId) {
        let Some(mut offer) = self.reserved.remove(&reservation) else {
            return;
        };
        self.matching.unregister_offer(offer.offer);
        offer.listener.close();
        if let Some(worker) = offer.worker.take() {
            // Bounded stall: the close above unblocks the worker promptly.
            let _ = worker.join();
        }
        for network in &mut offer.live_networks {
            network.tear_down();
        }
        info!(reservation = reservation.0, "reservation torn down");
    }
}

/// Accept loop. Posts one `Accepted` per inbound connection and a single
/// terminal `AcceptFailed` on any error, including close-by-teardown.
/// Errors are never retried, spurious or not.
fn spawn_accept_worker(
    reservation: ReservationId,
    listener: Arc<dyn ListeningSocket>,
    tx: UnboundedSender<Event>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        match listener.accept() {
            Ok(socket) => {
                let delivered = socket.clone();
                if tx
                    .send(Event::Accepted {
                        reservation,
                        socket,
                    })
                    .is_err()
                {
                    // Event loop is gone; nobody will ever own this socket.
                    delivered.close();
                    return;
                }
            }
            Err(_) => {
                let _ = tx.send(Event::AcceptFailed { reservation });
                return;
            }
        }
    })
}
