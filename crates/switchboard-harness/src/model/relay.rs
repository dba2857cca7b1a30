//! Reference relay.
//!
//! The simplest possible statement of the routing rules: a set of connected
//! peers, a map of announced names, and a function from operation to the
//! deliveries it must cause.

use std::collections::{BTreeMap, BTreeSet};

use super::operation::{Operation, OperationError, PeerId, Target, body_bytes};

/// Message as the model sees it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelMessage {
    /// Handshake with the assigned ID.
    Connected,
    /// Online Set: peer → announced name.
    Presence(BTreeMap<PeerId, String>),
    /// Incoming call from an announced peer.
    CallIncoming {
        /// Caller.
        caller: PeerId,
    },
    /// Call accepted.
    CallAccepted {
        /// Accepting peer, if it announced.
        caller: Option<PeerId>,
    },
    /// Call rejected.
    CallRejected,
    /// Offer relayed with sender context.
    OfferRelay {
        /// Sender, if it announced.
        caller: Option<PeerId>,
        /// `sdpMid` carried inside the relayed body.
        sdp_mid: u8,
    },
    /// Answer forwarded as-is.
    Answer {
        /// Opaque body bytes.
        body: Vec<u8>,
    },
    /// ICE candidate forwarded as-is.
    IceCandidate {
        /// Opaque body bytes.
        body: Vec<u8>,
    },
}

/// One message to one peer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Delivery {
    /// Recipient.
    pub to: PeerId,
    /// Message.
    pub message: ModelMessage,
}

/// Reference relay state.
#[derive(Debug, Clone, Default)]
pub struct ModelRelay {
    connected: BTreeSet<PeerId>,
    online: BTreeMap<PeerId, String>,
}

impl ModelRelay {
    /// Empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connected peers.
    pub fn connected(&self) -> &BTreeSet<PeerId> {
        &self.connected
    }

    /// Announced peers and their names.
    pub fn online(&self) -> &BTreeMap<PeerId, String> {
        &self.online
    }

    /// Apply an operation and return the deliveries it causes, sorted.
    pub fn apply(&mut self, op: &Operation) -> Result<Vec<Delivery>, OperationError> {
        let mut deliveries = match op {
            Operation::Connect { peer } => {
                if !self.connected.insert(*peer) {
                    return Err(OperationError::AlreadyConnected);
                }
                vec![Delivery { to: *peer, message: ModelMessage::Connected }]
            },

            Operation::Disconnect { peer } => {
                if !self.connected.remove(peer) {
                    return Ok(Vec::new());
                }
                self.online.remove(peer);
                self.presence_broadcast()
            },

            other => {
                if !self.connected.contains(&other.actor()) {
                    return Err(OperationError::NotConnected);
                }
                self.route(other)
            },
        };

        deliveries.sort();
        Ok(deliveries)
    }

    fn route(&mut self, op: &Operation) -> Vec<Delivery> {
        if op.reply_target() == Some(Target::Peer(op.actor())) {
            return Vec::new();
        }

        let (to, message) = match op {
            Operation::Announce { peer, descriptor } => {
                self.online.insert(*peer, descriptor.name());
                return self.presence_broadcast();
            },
            Operation::CallRequest { from, to } => {
                if !self.online.contains_key(from) {
                    return Vec::new();
                }
                (*to, ModelMessage::CallIncoming { caller: *from })
            },
            Operation::CallAccept { from, to } => {
                (*to, ModelMessage::CallAccepted { caller: self.announced(*from) })
            },
            Operation::CallReject { to, .. } => (*to, ModelMessage::CallRejected),
            Operation::Offer { from, to, sdp_mid } => {
                let caller = self.announced(*from);
                (*to, ModelMessage::OfferRelay { caller, sdp_mid: *sdp_mid })
            },
            Operation::Answer { to, body, .. } => {
                (*to, ModelMessage::Answer { body: body_bytes(*body) })
            },
            Operation::IceCandidate { to, body, .. } => {
                (*to, ModelMessage::IceCandidate { body: body_bytes(*body) })
            },
            Operation::Connect { .. } | Operation::Disconnect { .. } => return Vec::new(),
        };

        match to {
            Target::Peer(peer) if self.connected.contains(&peer) => {
                vec![Delivery { to: peer, message }]
            },
            Target::Peer(_) | Target::Unknown => Vec::new(),
        }
    }

    fn announced(&self, peer: PeerId) -> Option<PeerId> {
        self.online.contains_key(&peer).then_some(peer)
    }

    fn presence_broadcast(&self) -> Vec<Delivery> {
        let message = ModelMessage::Presence(self.online.clone());
        self.connected.iter().map(|peer| Delivery { to: *peer, message: message.clone() }).collect()
    }
}
