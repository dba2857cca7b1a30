//! Client events and actions.

use ciborium::Value;
use switchboard_proto::{ConnectionId, Descriptor, Frame, PresenceEntry};

/// Events the caller feeds into the client.
///
/// The caller is responsible for receiving frames from the network and
/// forwarding application intents (announce, call, negotiate).
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Frame received from the relay.
    FrameReceived(Frame),

    /// Publish or replace our presence descriptor.
    Announce(Descriptor),

    /// Ring another connection.
    Call {
        /// Connection to call.
        to: ConnectionId,
    },

    /// Accept a call from another connection.
    AcceptCall {
        /// Connection whose call we accept.
        to: ConnectionId,
    },

    /// Reject a call from another connection.
    RejectCall {
        /// Connection whose call we reject.
        to: ConnectionId,
    },

    /// Send a session offer.
    SendOffer {
        /// Target connection.
        to: ConnectionId,
        /// Opaque session description.
        offer: Value,
    },

    /// Send a session answer.
    SendAnswer {
        /// Target connection.
        to: ConnectionId,
        /// Opaque session description.
        answer: Value,
    },

    /// Send an ICE candidate.
    SendIceCandidate {
        /// Target connection.
        to: ConnectionId,
        /// Opaque candidate.
        candidate: Value,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Send a frame to the relay.
    Send(Frame),

    /// The relay told us our connection ID.
    Connected {
        /// Our connection ID.
        connection_id: ConnectionId,
    },

    /// The Online Set changed.
    PresenceChanged {
        /// Everyone currently announced, ourselves included if we announced.
        online: Vec<PresenceEntry>,
    },

    /// Someone is calling us.
    IncomingCall {
        /// Caller's presence entry.
        caller: PresenceEntry,
    },

    /// Our call was accepted.
    CallAccepted {
        /// Accepting side's presence entry, absent if it never announced.
        caller: Option<PresenceEntry>,
    },

    /// Our call was rejected.
    CallRejected,

    /// A session offer arrived.
    OfferReceived {
        /// Opaque session description, `Null` if the body carried none.
        offer: Value,
        /// Whole offer body as the sender wrote it.
        data: Value,
        /// Sender's presence entry, absent if it never announced.
        caller: Option<PresenceEntry>,
    },

    /// A session answer arrived.
    AnswerReceived {
        /// Opaque session description.
        answer: Value,
    },

    /// An ICE candidate arrived.
    IceCandidateReceived {
        /// Opaque candidate.
        candidate: Value,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },
}
