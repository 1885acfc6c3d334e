//! Network specifiers — the attribute tuples that identify what kind of
//! network a request or offer describes.
//!
//! Exact equality is used for deduplication. A separate compression-blind
//! relation (`fuzzy_matches`) exists only to detect conflicting duplicate
//! requests for the same (role, remote, endpoint) target.

use std::fmt;

/// Which side of the channel this network sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Accept inbound channel connections on a reserved endpoint.
    Server,
    /// Actively connect to a remote endpoint.
    Client,
}

/// Header compression mode applied by the packet forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeaderCompression {
    #[default]
    Any,
    On,
    Off,
}

/// Channel identifier on an endpoint (e.g. an L2CAP PSM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(pub u16);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque remote endpoint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteAddress(pub String);

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The attribute tuple identifying a requested or offered network.
///
/// `remote` is present for the client role and absent for servers;
/// `endpoint` is absent on a blanket server offer and present once a
/// listening endpoint has been reserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    pub role: Role,
    pub remote: Option<RemoteAddress>,
    pub endpoint: Option<EndpointId>,
    pub compression: HeaderCompression,
}

impl Specifier {
    /// A wildcard specifier covering every request of `role`.
    pub fn blanket(role: Role) -> Self {
        Self {
            role,
            remote: None,
            endpoint: None,
            compression: HeaderCompression::Any,
        }
    }

    /// Compression-blind match: true when role, remote address and endpoint
    /// all agree. Two specifiers that fuzzy-match but are not equal differ
    /// only in compression mode and can never be served by the same channel.
    pub fn fuzzy_matches(&self, other: &Specifier) -> bool {
        self.role == other.role && self.remote == other.remote && self.endpoint == other.endpoint
    }
}

/// Identity of a capability request, used for reference counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

/// Correlates a reservation-style request with the narrow offer it
/// produced. Unique per live reservation, and the only identifier that
/// stays stable across the narrowing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId(pub u64);

/// A request token from the matching broker.
///
/// Identity is `id`; the specifier may be absent for wildcard requests.
/// Reservation-style requests additionally carry a `reservation` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRequest {
    pub id: RequestId,
    pub specifier: Option<Specifier>,
    pub reservation: Option<ReservationId>,
}
