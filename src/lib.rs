//! canal — on-demand virtual networks over channel sockets.
//!
//! An external matching broker pairs capability requests ("I need a
//! network satisfying these attributes") with registered offers. canal
//! registers the offers that answer them — a blanket server-reservation
//! offer, narrow reserved offers derived from it, and a blanket client
//! offer — owns the reservation and connection-attempt lifecycle, and
//! materializes a virtual network interface for every established channel
//! socket. Packet relaying, interface creation and the channel transport
//! itself are external collaborators behind traits.
//!
//! # Architecture
//!
//! - **specifier**: the attribute tuples requests and offers are matched on
//! - **transport**: blocking channel-socket primitives (accept/connect/close)
//! - **matching**: registration/callback contract with the external broker
//! - **deps**: virtual interface, packet forwarder and ip-config factories
//! - **network**: one live (interface, socket, forwarder) group
//! - **broker**: the single-owner event loop and public facade
//! - **server**/**client**: the two offer roles and their worker threads
//!
//! All mutable state is confined to one event-loop task; blocking
//! accept/connect calls run on dedicated threads that post exactly one
//! terminal message back. Closing a socket from the event loop is the sole
//! cancellation mechanism.

pub mod broker;
pub mod deps;
pub mod error;
pub mod matching;
pub mod network;
pub mod specifier;
pub mod transport;

mod client;
mod server;

pub use broker::{Broker, BrokerHandle};
pub use deps::{Dependencies, IpConfigClient, PacketForwarder, VirtualInterface};
pub use error::{SetupError, TransportError};
pub use matching::{MatchingBroker, OfferHandle, OfferId, OfferScore};
pub use network::{NetworkHandle, NetworkWatch};
pub use specifier::{
    CapabilityRequest, EndpointId, HeaderCompression, RemoteAddress, RequestId, ReservationId,
    Role, Specifier,
};
pub use transport::{ChannelSocket, ChannelTransport, ListeningSocket};
