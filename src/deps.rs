//! OS-facing dependency seam.
//!
//! Virtual interface creation, packet forwarding and peer-side IP
//! configuration are external collaborators. The broker only drives their
//! lifecycles; swapping in fakes here is how the whole state machine is
//! tested without a kernel.

use std::sync::Arc;

use crate::error::SetupError;
use crate::network::NetworkWatch;
use crate::specifier::HeaderCompression;
use crate::transport::ChannelSocket;

/// Handle to a created virtual network interface.
pub trait VirtualInterface: Send {
    fn name(&self) -> &str;

    /// Destroy the interface. Called at most once, during teardown.
    fn destroy(&self);
}

/// Handle to a running packet forwarder, relaying frames between a virtual
/// interface and a channel socket.
pub trait PacketForwarder: Send {
    /// Stop relaying. The forwarder must not touch the socket afterwards.
    fn shutdown(&self);
}

/// Peer-side IP configuration helper. Opaque to this crate.
pub trait IpConfigClient: Send {
    fn shutdown(&self);
}

/// Factory bundle for everything the broker cannot create itself.
pub trait Dependencies: Send + Sync {
    fn create_virtual_interface(&self, name: &str)
        -> Result<Box<dyn VirtualInterface>, SetupError>;

    /// Bind a forwarder to an interface and an established channel socket.
    /// Unrecoverable conditions are reported through `watch`.
    fn create_packet_forwarder(
        &self,
        interface: &dyn VirtualInterface,
        socket: Arc<dyn ChannelSocket>,
        compression: HeaderCompression,
        watch: NetworkWatch,
    ) -> Result<Box<dyn PacketForwarder>, SetupError>;

    fn create_ip_config_client(&self, log_tag: &str, ifname: &str) -> Box<dyn IpConfigClient>;
}
