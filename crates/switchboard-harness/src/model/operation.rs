//! Operations for model-based testing.
//!
//! Operations represent everything a client can make the relay do. They are
//! generated randomly (proptest or a fuzzer) and applied to both the model
//! and the real driver.

use arbitrary::Arbitrary;
use ciborium::Value;
use switchboard_proto::{
    CONNECTION_ID_KEY, ConnectionId, Descriptor, Frame, FrameHeader, Opcode, Payload,
    ProtocolError,
    payloads::{
        call::CallTarget,
        negotiation::{Answer, IceCandidate},
    },
};
use switchboard_server::ServerEvent;

/// Peer identifier (0-indexed, below [`MAX_PEERS`] after normalization).
pub type PeerId = u8;

/// Number of distinct peers operations refer to.
pub const MAX_PEERS: u8 = 4;

/// Connection ID a peer is registered under.
pub fn peer_connection_id(peer: PeerId) -> ConnectionId {
    ConnectionId::new(format!("peer-{peer}"))
}

/// Who a routed message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Target {
    /// One of the simulated peers, connected or not.
    Peer(PeerId),
    /// An ID no connection has ever had.
    Unknown,
}

impl Target {
    /// Connection ID the message is addressed to.
    pub fn connection_id(self) -> ConnectionId {
        match self {
            Self::Peer(peer) => peer_connection_id(peer),
            Self::Unknown => ConnectionId::new("nonexistent"),
        }
    }
}

/// Compact descriptor for announces.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub struct SmallDescriptor {
    /// Seed for the display name.
    pub name_seed: u8,
    /// Include a forged `connectionId` field.
    pub spoof_id: bool,
}

impl SmallDescriptor {
    /// Display name derived from the seed.
    pub fn name(&self) -> String {
        format!("user-{}", self.name_seed)
    }

    /// Descriptor as a client would send it.
    pub fn to_descriptor(&self) -> Descriptor {
        let descriptor = if self.spoof_id {
            Descriptor::new().with(CONNECTION_ID_KEY, "spoofed")
        } else {
            Descriptor::new()
        };
        descriptor.with("name", self.name())
    }
}

/// Operations that can be applied to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum Operation {
    /// A peer opens a connection.
    Connect {
        /// Connecting peer.
        peer: PeerId,
    },

    /// A peer's connection goes away.
    Disconnect {
        /// Disconnecting peer.
        peer: PeerId,
    },

    /// A peer announces or re-announces its presence.
    Announce {
        /// Announcing peer.
        peer: PeerId,
        /// Descriptor to publish.
        descriptor: SmallDescriptor,
    },

    /// Call request.
    CallRequest {
        /// Caller.
        from: PeerId,
        /// Callee.
        to: Target,
    },

    /// Call accept.
    CallAccept {
        /// Accepting peer.
        from: PeerId,
        /// Original caller.
        to: Target,
    },

    /// Call reject.
    CallReject {
        /// Rejecting peer.
        from: PeerId,
        /// Original caller.
        to: Target,
    },

    /// Session offer carrying a field the relay does not model.
    Offer {
        /// Offering peer.
        from: PeerId,
        /// Target.
        to: Target,
        /// `sdpMid` value sent alongside the offer.
        sdp_mid: u8,
    },

    /// Session answer with an opaque body.
    Answer {
        /// Answering peer.
        from: PeerId,
        /// Target.
        to: Target,
        /// Body seed.
        body: u8,
    },

    /// ICE candidate with an opaque body.
    IceCandidate {
        /// Sending peer.
        from: PeerId,
        /// Target.
        to: Target,
        /// Body seed.
        body: u8,
    },
}

impl Operation {
    /// Fold every peer ID into `0..MAX_PEERS`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let fold = |peer: &mut PeerId| *peer %= MAX_PEERS;
        let fold_target = |target: &mut Target| {
            if let Target::Peer(peer) = target {
                *peer %= MAX_PEERS;
            }
        };

        match &mut self {
            Self::Connect { peer } | Self::Disconnect { peer } | Self::Announce { peer, .. } => {
                fold(peer);
            },
            Self::CallRequest { from, to }
            | Self::CallAccept { from, to }
            | Self::CallReject { from, to }
            | Self::Offer { from, to, .. }
            | Self::Answer { from, to, .. }
            | Self::IceCandidate { from, to, .. } => {
                fold(from);
                fold_target(to);
            },
        }
        self
    }

    /// Peer whose connection the operation arrives on.
    pub fn actor(&self) -> PeerId {
        match self {
            Self::Connect { peer } | Self::Disconnect { peer } | Self::Announce { peer, .. } => {
                *peer
            },
            Self::CallRequest { from, .. }
            | Self::CallAccept { from, .. }
            | Self::CallReject { from, .. }
            | Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. } => *from,
        }
    }

    /// Target of a message that is never delivered back to its sender.
    ///
    /// Call requests are absent: a connection may ring itself.
    pub fn reply_target(&self) -> Option<Target> {
        match self {
            Self::CallAccept { to, .. }
            | Self::CallReject { to, .. }
            | Self::Offer { to, .. }
            | Self::Answer { to, .. }
            | Self::IceCandidate { to, .. } => Some(*to),
            Self::Connect { .. }
            | Self::Disconnect { .. }
            | Self::Announce { .. }
            | Self::CallRequest { .. } => None,
        }
    }

    /// Driver event this operation produces.
    pub fn to_event(&self) -> Result<ServerEvent, ProtocolError> {
        let payload = match self {
            Self::Connect { peer } => {
                return Ok(ServerEvent::ConnectionAccepted {
                    connection_id: peer_connection_id(*peer),
                });
            },
            Self::Disconnect { peer } => {
                return Ok(ServerEvent::ConnectionClosed {
                    connection_id: peer_connection_id(*peer),
                    reason: "disconnect".to_string(),
                });
            },
            Self::Announce { descriptor, .. } => Payload::Announce(descriptor.to_descriptor()),
            Self::CallRequest { to, .. } => {
                Payload::CallRequest(CallTarget { to: to.connection_id() })
            },
            Self::CallAccept { to, .. } => {
                Payload::CallAccept(CallTarget { to: to.connection_id() })
            },
            Self::CallReject { to, .. } => {
                Payload::CallReject(CallTarget { to: to.connection_id() })
            },
            Self::Offer { to, sdp_mid, .. } => {
                return Ok(ServerEvent::FrameReceived {
                    connection_id: peer_connection_id(self.actor()),
                    frame: offer_frame(&to.connection_id(), *sdp_mid)?,
                });
            },
            Self::Answer { to, body, .. } => Payload::Answer(Answer {
                to: to.connection_id(),
                answer: Value::Bytes(body_bytes(*body)),
            }),
            Self::IceCandidate { to, body, .. } => Payload::IceCandidate(IceCandidate {
                to: to.connection_id(),
                candidate: Value::Bytes(body_bytes(*body)),
            }),
        };

        Ok(ServerEvent::FrameReceived {
            connection_id: peer_connection_id(self.actor()),
            frame: payload.to_frame()?,
        })
    }
}

/// Offer body as a client writes it: the typed fields plus `sdpMid`.
pub fn offer_body(to: &ConnectionId, sdp_mid: u8) -> Value {
    Value::Map(vec![
        (Value::Text("to".into()), Value::Text(to.as_str().into())),
        (Value::Text("offer".into()), Value::Text("v=0".into())),
        (Value::Text("sdpMid".into()), Value::Integer(sdp_mid.into())),
    ])
}

fn offer_frame(to: &ConnectionId, sdp_mid: u8) -> Result<Frame, ProtocolError> {
    let mut body = Vec::new();
    ciborium::ser::into_writer(&offer_body(to, sdp_mid), &mut body)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(Frame::new(FrameHeader::new(Opcode::Offer), body))
}

/// Opaque body bytes for a seed.
pub fn body_bytes(seed: u8) -> Vec<u8> {
    (0..usize::from(seed % 32)).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// Expected errors from applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// A frame arrived on a connection the relay does not know.
    NotConnected,

    /// The peer is already connected.
    AlreadyConnected,
}
