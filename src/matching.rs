//! Matching-broker seam.
//!
//! The external capability-matching broker pairs requests with registered
//! offers; this crate only registers offers and reacts to the resulting
//! match/unmatch notifications. The broker holds an [`OfferHandle`] per
//! offer and reports through it; both notification methods post onto the
//! event loop, so callbacks are always handled there regardless of the
//! calling thread.

use tokio::sync::mpsc::UnboundedSender;

use crate::broker::Event;
use crate::specifier::{CapabilityRequest, Specifier};

/// Identifies one registered offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OfferId(pub u64);

/// Score hint passed through at registration. Scoring policy is external;
/// the broker just forwards the hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferScore(pub i32);

/// Callback target handed to the matching broker at registration.
#[derive(Clone)]
pub struct OfferHandle {
    pub(crate) id: OfferId,
    pub(crate) tx: UnboundedSender<Event>,
}

impl OfferHandle {
    pub fn id(&self) -> OfferId {
        self.id
    }

    /// A request matching this offer needs a network.
    pub fn network_needed(&self, request: CapabilityRequest) {
        let _ = self.tx.send(Event::NetworkNeeded {
            offer: self.id,
            request,
        });
    }

    /// A previously matched request no longer needs a network.
    pub fn network_unneeded(&self, request: CapabilityRequest) {
        let _ = self.tx.send(Event::NetworkUnneeded {
            offer: self.id,
            request,
        });
    }
}

/// The external capability-matching broker.
pub trait MatchingBroker: Send + Sync {
    /// Register an offer described by `descriptor`. The broker keeps the
    /// handle and delivers match/unmatch notifications through it.
    fn register_offer(&self, score: OfferScore, descriptor: &Specifier, offer: OfferHandle);

    /// Remove a previously registered offer. No notifications are delivered
    /// for it afterwards.
    fn unregister_offer(&self, offer: OfferId);

    /// Tell the broker this request can never be satisfied here.
    fn declare_unfulfillable(&self, request: &CapabilityRequest);
}
