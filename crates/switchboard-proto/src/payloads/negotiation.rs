//! Media negotiation payloads.
//!
//! The session description and candidate bodies are opaque CBOR values. The
//! relay reads `to` and nothing else.

use ciborium::Value;
use serde::{Deserialize, Serialize};

use super::from_cbor;
use crate::{ConnectionId, PresenceEntry, errors::Result};

/// Session offer sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Connection the offer is for
    pub to: ConnectionId,
    /// Opaque session description
    pub offer: Value,
}

/// Offer as delivered to its target.
///
/// `data` is the sender's original offer body, `to` and any fields the relay
/// does not model included. `caller` is the sender's presence entry, omitted
/// when the sender has not announced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRelay {
    /// Offer body exactly as the sender wrote it
    pub data: Value,
    /// Sender's presence entry, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<PresenceEntry>,
}

impl OfferRelay {
    /// Wrap a raw offer body.
    ///
    /// The body is kept as a whole CBOR value, so fields outside [`Offer`]
    /// reach the target unchanged.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborDecode` if `body` is not valid CBOR
    pub fn from_body(body: &[u8], caller: Option<PresenceEntry>) -> Result<Self> {
        Ok(Self { data: from_cbor(body)?, caller })
    }

    /// Session description inside `data`, if the body is a map carrying one.
    pub fn offer(&self) -> Option<&Value> {
        self.data
            .as_map()?
            .iter()
            .find(|(key, _)| key.as_text() == Some("offer"))
            .map(|(_, value)| value)
    }
}


/// Session answer. Forwarded to `to` without re-encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Connection the answer is for
    pub to: ConnectionId,
    /// Opaque session description
    pub answer: Value,
}

/// ICE candidate. Forwarded to `to` without re-encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Connection the candidate is for
    pub to: ConnectionId,
    /// Opaque candidate
    pub candidate: Value,
}
