//! Client state machine.
//!
//! [`SignalingClient`] turns application intents into frames and relay frames
//! into notifications. It keeps only what the relay tells it: the connection
//! ID from the handshake and the most recent Online Set.

use ciborium::Value;
use switchboard_proto::{
    ConnectionId, Frame, PresenceEntry,
    payloads::{
        Payload,
        call::CallTarget,
        negotiation::{Answer, IceCandidate, Offer},
        presence::PresenceSnapshot,
    },
};

use crate::{ClientAction, ClientError, ClientEvent};

/// Sans-IO signaling client.
#[derive(Debug, Clone, Default)]
pub struct SignalingClient {
    connection_id: Option<ConnectionId>,
    online: PresenceSnapshot,
}

impl SignalingClient {
    /// Create a client that has not yet received its handshake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connection ID assigned by the relay, once the handshake arrived.
    #[must_use]
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    /// Most recent Online Set received from the relay.
    #[must_use]
    pub fn online(&self) -> &PresenceSnapshot {
        &self.online
    }

    /// Presence entry of a connection, if it is in the Online Set.
    #[must_use]
    pub fn peer(&self, connection_id: &ConnectionId) -> Option<&PresenceEntry> {
        self.online.get(connection_id)
    }

    /// Process an event and return the resulting actions.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidFrame`] if an outgoing payload cannot be
    ///   encoded or an incoming frame cannot be decoded
    /// - [`ClientError::UnexpectedOpcode`] if the relay sends a frame only
    ///   clients may originate
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        let payload = match event {
            ClientEvent::FrameReceived(frame) => return self.handle_frame(&frame),
            ClientEvent::Announce(descriptor) => Payload::Announce(descriptor),
            ClientEvent::Call { to } => Payload::CallRequest(CallTarget { to }),
            ClientEvent::AcceptCall { to } => Payload::CallAccept(CallTarget { to }),
            ClientEvent::RejectCall { to } => Payload::CallReject(CallTarget { to }),
            ClientEvent::SendOffer { to, offer } => Payload::Offer(Offer { to, offer }),
            ClientEvent::SendAnswer { to, answer } => Payload::Answer(Answer { to, answer }),
            ClientEvent::SendIceCandidate { to, candidate } => {
                Payload::IceCandidate(IceCandidate { to, candidate })
            },
        };

        Ok(vec![ClientAction::Send(payload.to_frame()?)])
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let action = match Payload::from_frame(frame)? {
            Payload::Connected(connected) => {
                self.connection_id = Some(connected.connection_id.clone());
                ClientAction::Connected { connection_id: connected.connection_id }
            },
            Payload::PresenceSnapshot(snapshot) => {
                self.online = snapshot;
                ClientAction::PresenceChanged { online: self.online.entries.clone() }
            },
            Payload::CallIncoming(incoming) => {
                ClientAction::IncomingCall { caller: incoming.caller }
            },
            Payload::CallAccepted(accepted) => {
                ClientAction::CallAccepted { caller: accepted.caller }
            },
            Payload::CallRejected => ClientAction::CallRejected,
            Payload::OfferRelay(relay) => ClientAction::OfferReceived {
                offer: relay.offer().cloned().unwrap_or(Value::Null),
                data: relay.data,
                caller: relay.caller,
            },
            Payload::Answer(answer) => ClientAction::AnswerReceived { answer: answer.answer },
            Payload::IceCandidate(candidate) => {
                ClientAction::IceCandidateReceived { candidate: candidate.candidate }
            },
            other => return Err(ClientError::UnexpectedOpcode(other.opcode())),
        };

        Ok(vec![action])
    }
}
