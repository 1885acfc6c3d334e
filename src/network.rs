//! One live network: the (interface, socket, forwarder) group plus the
//! watch callback the forwarder reports through.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::broker::{Event, NetworkOwner};
use crate::deps::{IpConfigClient, PacketForwarder, VirtualInterface};
use crate::transport::ChannelSocket;

/// Posted-event callback handed to the packet forwarder.
///
/// Both signals are terminal for the owning offer: a server-side network
/// destroys its whole reservation, a client-side network releases its entry
/// and fails every aggregated request. Signals posted after teardown are
/// discarded by the event loop's membership checks.
#[derive(Clone)]
pub struct NetworkWatch {
    pub(crate) owner: NetworkOwner,
    pub(crate) tx: UnboundedSender<Event>,
}

impl NetworkWatch {
    /// Report an unrecoverable forwarder or socket error.
    pub fn error(&self) {
        let _ = self.tx.send(Event::NetworkError {
            owner: self.owner.clone(),
        });
    }

    /// Report that the network is no longer wanted.
    pub fn unwanted(&self) {
        let _ = self.tx.send(Event::NetworkUnwanted {
            owner: self.owner.clone(),
        });
    }
}

/// A materialized network. Owns its virtual interface, channel socket,
/// packet forwarder and ip-config client as a unit.
pub struct NetworkHandle {
    ifname: String,
    iface: Box<dyn VirtualInterface>,
    ip_config: Box<dyn IpConfigClient>,
    socket: Arc<dyn ChannelSocket>,
    forwarder: Box<dyn PacketForwarder>,
    torn_down: bool,
}

impl NetworkHandle {
    pub(crate) fn new(
        ifname: String,
        iface: Box<dyn VirtualInterface>,
        ip_config: Box<dyn IpConfigClient>,
        socket: Arc<dyn ChannelSocket>,
        forwarder: Box<dyn PacketForwarder>,
    ) -> Self {
        Self {
            ifname,
            iface,
            ip_config,
            socket,
            forwarder,
            torn_down: false,
        }
    }

    pub fn interface_name(&self) -> &str {
        &self.ifname
    }

    /// Release everything, in order: forwarder, channel socket, ip-config
    /// client, virtual interface. Idempotent — a second call is a no-op.
    pub fn tear_down(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.forwarder.shutdown();
        self.socket.close();
        self.ip_config.shutdown();
        self.iface.destroy();
        debug!(ifname = %self.ifname, "network torn down");
    }
}
