//! Client-role offer: one connection attempt per distinct specifier.
//!
//! Identical specifiers share a single attempt through reference counting.
//! A specifier that differs only in compression mode from a live entry can
//! never be satisfied without contradicting the in-flight attempt, so it
//! is rejected outright.

use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::broker::{Event, EventLoop, NetworkOwner};
use crate::network::NetworkHandle;
use crate::specifier::{CapabilityRequest, EndpointId, RemoteAddress, Role, Specifier};
use crate::transport::ChannelSocket;

/// Bookkeeping for one distinct client specifier.
///
/// `requests` is never empty while the entry exists; when the last request
/// is withdrawn the entry and everything it owns are released.
pub(crate) struct ClientEntry {
    pub(crate) requests: Vec<CapabilityRequest>,
    pub(crate) socket: Arc<dyn ChannelSocket>,
    pub(crate) worker: Option<thread::JoinHandle<()>>,
    pub(crate) network: Option<NetworkHandle>,
}

impl EventLoop {
    /// Blanket client offer matched a request.
    pub(crate) fn client_needed(&mut self, request: CapabilityRequest) {
        let Some(spec) = request.specifier.clone() else {
            return;
        };
        if spec.role != Role::Client {
            debug!(request = request.id.0, "ignoring non-client specifier");
            return;
        }
        let (Some(remote), Some(endpoint)) = (spec.remote.clone(), spec.endpoint) else {
            debug!(request = request.id.0, "ignoring incomplete client specifier");
            return;
        };

        if let Some(entry) = self.clients.get_mut(&spec) {
            // Same specifier: share the existing attempt or network.
            if !entry.requests.iter().any(|r| r.id == request.id) {
                entry.requests.push(request);
            }
            return;
        }
        if self.clients.keys().any(|existing| existing.fuzzy_matches(&spec)) {
            // Same target, different compression mode: can never coexist
            // with the attempt already in flight.
            info!(
                request = request.id.0,
                remote = %remote,
                endpoint = endpoint.0,
                "conflicting client specifier, unfulfillable"
            );
            self.matching.declare_unfulfillable(&request);
            return;
        }

        let socket = match self.transport.open_channel() {
            Ok(socket) => socket,
            Err(e) => {
                warn!(request = request.id.0, error = %e, "failed to open channel socket");
                self.matching.declare_unfulfillable(&request);
                return;
            }
        };
        let worker = spawn_connect_worker(
            spec.clone(),
            socket.clone(),
            remote.clone(),
            endpoint,
            self.tx.clone(),
        );
        info!(remote = %remote, endpoint = endpoint.0, "connection attempt started");
        self.clients.insert(
            spec,
            ClientEntry {
                requests: vec![request],
                socket,
                worker: Some(worker),
                network: None,
            },
        );
    }

    /// A previously matched client request went away.
    pub(crate) fn client_unneeded(&mut self, request: CapabilityRequest) {
        let Some(spec) = request.specifier else {
            return;
        };
        let Some(entry) = self.clients.get_mut(&spec) else {
            return;
        };
        entry.requests.retain(|r| r.id != request.id);
        if entry.requests.is_empty() {
            debug!("last client request withdrawn");
            self.release_client_entry(&spec);
        }
    }

    /// The connect worker completed its attempt.
    pub(crate) fn on_connected(&mut self, specifier: Specifier) {
        let Some(entry) = self.clients.get(&specifier) else {
            // Withdrawn while the connect was in flight; releasing the
            // entry already closed the socket the worker used.
            debug!("discarding stale connect result");
            return;
        };
        let socket = entry.socket.clone();
        let owner = NetworkOwner::Client(specifier.clone());
        match self.build_network(socket.clone(), specifier.compression, owner) {
            Ok(network) => {
                info!(ifname = network.interface_name(), "outbound network up");
                if let Some(entry) = self.clients.get_mut(&specifier) {
                    entry.network = Some(network);
                }
            }
            Err(e) => {
                warn!(error = %e, "network setup failed for outbound connection");
                socket.close();
                self.fail_client_entry(&specifier);
            }
        }
    }

    /// The connect worker failed. If the entry was already released (the
    /// withdrawal closed the socket out from under it), there is nothing
    /// to report.
    pub(crate) fn on_connect_failed(&mut self, specifier: Specifier) {
        if self.clients.contains_key(&specifier) {
            info!("connect attempt failed");
            self.fail_client_entry(&specifier);
        }
    }

    /// Declare every aggregated request unfulfillable, then release the
    /// entry.
    pub(crate) fn fail_client_entry(&mut self, specifier: &Specifier) {
        let Some(entry) = self.clients.get(specifier) else {
            return;
        };
        for request in &entry.requests {
            self.matching.declare_unfulfillable(request);
        }
        self.release_client_entry(specifier);
    }

    /// Drop a client entry and everything it owns: cancel and join the
    /// connect worker, tear down the network if one was built.
    pub(crate) fn release_client_entry(&mut self, specifier: &Specifier) {
        let Some(mut entry) = self.clients.remove(specifier) else {
            return;
        };
        // Closing the socket is the cancellation: a still-blocked connect
        // returns, the worker posts its terminal message and exits. A
        // concurrent success is harmless — the loop sees the entry gone
        // and discards it.
        entry.socket.close();
        if let Some(worker) = entry.worker.take() {
            let _ = worker.join();
        }
        if let Some(mut network) = entry.network.take() {
            network.tear_down();
        }
        debug!("client entry released");
    }
}

/// Single connection attempt. Posts exactly one terminal message; a failed
/// or cancelled attempt closes its socket before reporting. There is no
/// retry.
fn spawn_connect_worker(
    specifier: Specifier,
    socket: Arc<dyn ChannelSocket>,
    remote: RemoteAddress,
    endpoint: EndpointId,
    tx: UnboundedSender<Event>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || match socket.connect(&remote, endpoint) {
        Ok(()) => {
            let _ = tx.send(Event::Connected { specifier });
        }
        Err(_) => {
            socket.close();
            let _ = tx.send(Event::ConnectFailed { specifier });
        }
    })
}
