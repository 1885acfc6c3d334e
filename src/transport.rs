//! Channel-socket transport seam.
//!
//! The broker consumes the transport as opaque blocking primitives:
//! `accept` and `connect` park their worker thread until the operation
//! completes or the socket is closed from another thread. `close` is
//! idempotent and safe to call concurrently with a blocking call on the
//! same object — it is the sole cancellation mechanism; there is no
//! separate cancellation token and no timeout.

use std::sync::Arc;

use crate::error::TransportError;
use crate::specifier::{EndpointId, RemoteAddress};

/// Connection-oriented, packet-based channel transport.
pub trait ChannelTransport: Send + Sync {
    /// Bind a listening socket on a fresh channel endpoint.
    fn listen(&self) -> Result<Arc<dyn ListeningSocket>, TransportError>;

    /// Open an unconnected channel socket for an outbound attempt.
    fn open_channel(&self) -> Result<Arc<dyn ChannelSocket>, TransportError>;
}

/// A channel socket bound to accept inbound connections.
pub trait ListeningSocket: Send + Sync {
    /// The channel endpoint this socket is bound to.
    fn endpoint_id(&self) -> EndpointId;

    /// Block until an inbound connection arrives. Returns an error once the
    /// socket fails or is closed; there is no spurious-wakeup contract.
    fn accept(&self) -> Result<Arc<dyn ChannelSocket>, TransportError>;

    /// Close the socket, forcing a concurrent `accept` to return.
    /// Idempotent.
    fn close(&self);
}

/// A point-to-point channel socket.
pub trait ChannelSocket: Send + Sync {
    /// Block until connected to `endpoint` on `remote`. Returns an error if
    /// the socket is closed mid-attempt.
    fn connect(&self, remote: &RemoteAddress, endpoint: EndpointId) -> Result<(), TransportError>;

    /// Close the socket. Idempotent, safe concurrently with `connect` or
    /// with the forwarder still attached.
    fn close(&self);
}
