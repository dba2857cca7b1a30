//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, payloads are CBOR. The opcode in the header
//! selects the payload type, so only the inner body is serialized (no variant
//! tag).
//!
//! # Invariants
//!
//! Each payload variant maps to exactly one opcode (enforced by match
//! exhaustiveness in [`Payload::opcode`], [`Payload::encode`] and
//! [`Payload::decode`]).

pub mod call;
pub mod negotiation;
pub mod presence;

use bytes::BufMut;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    ConnectionId, Descriptor, Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads.
///
/// # Security
///
/// The relay decodes every client-originated payload before acting on it.
/// Anything that fails to decode into the type its opcode names is dropped,
/// so a client cannot smuggle a differently shaped body past the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    // Session
    /// Handshake carrying the new connection's ID
    Connected(presence::Connected),

    // Presence
    /// Presence announcement
    Announce(Descriptor),
    /// Online Set broadcast
    PresenceSnapshot(presence::PresenceSnapshot),

    // Call control
    /// Ask the relay to ring a connection
    CallRequest(call::CallTarget),
    /// Incoming call notification
    CallIncoming(call::CallIncoming),
    /// Accept a call
    CallAccept(call::CallTarget),
    /// Call accepted notification
    CallAccepted(call::CallAccepted),
    /// Reject a call
    CallReject(call::CallTarget),
    /// Call rejected notification (empty body)
    CallRejected,

    // Negotiation
    /// Session offer from a client
    Offer(negotiation::Offer),
    /// Session offer as delivered to its target
    OfferRelay(negotiation::OfferRelay),
    /// Session answer
    Answer(negotiation::Answer),
    /// ICE candidate
    IceCandidate(negotiation::IceCandidate),
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Connected(_) => Opcode::Connected,
            Self::Announce(_) => Opcode::Announce,
            Self::PresenceSnapshot(_) => Opcode::PresenceSnapshot,
            Self::CallRequest(_) => Opcode::CallRequest,
            Self::CallIncoming(_) => Opcode::CallIncoming,
            Self::CallAccept(_) => Opcode::CallAccept,
            Self::CallAccepted(_) => Opcode::CallAccepted,
            Self::CallReject(_) => Opcode::CallReject,
            Self::CallRejected => Opcode::CallRejected,
            Self::Offer(_) => Opcode::Offer,
            Self::OfferRelay(_) => Opcode::OfferRelay,
            Self::Answer(_) => Opcode::Answer,
            Self::IceCandidate(_) => Opcode::IceCandidate,
        }
    }

    /// Connection a routed message is addressed to.
    ///
    /// `None` for presence and session payloads, which are not point-to-point
    /// client requests.
    #[must_use]
    pub fn target(&self) -> Option<&ConnectionId> {
        match self {
            Self::CallRequest(target) | Self::CallAccept(target) | Self::CallReject(target) => {
                Some(&target.to)
            },
            Self::Offer(offer) => Some(&offer.to),
            Self::Answer(answer) => Some(&answer.to),
            Self::IceCandidate(candidate) => Some(&candidate.to),
            Self::Connected(_)
            | Self::Announce(_)
            | Self::PresenceSnapshot(_)
            | Self::CallIncoming(_)
            | Self::CallAccepted(_)
            | Self::CallRejected
            | Self::OfferRelay(_) => None,
        }
    }

    /// Encode the payload body (no variant tag) into a buffer.
    ///
    /// Does not enforce [`FrameHeader::MAX_PAYLOAD_SIZE`]; that happens in
    /// [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Connected(inner) => to_cbor(inner, &mut writer),
            Self::Announce(inner) => to_cbor(inner, &mut writer),
            Self::PresenceSnapshot(inner) => to_cbor(inner, &mut writer),
            Self::CallRequest(inner) | Self::CallAccept(inner) | Self::CallReject(inner) => {
                to_cbor(inner, &mut writer)
            },
            Self::CallIncoming(inner) => to_cbor(inner, &mut writer),
            Self::CallAccepted(inner) => to_cbor(inner, &mut writer),
            Self::CallRejected => Ok(()),
            Self::Offer(inner) => to_cbor(inner, &mut writer),
            Self::OfferRelay(inner) => to_cbor(inner, &mut writer),
            Self::Answer(inner) => to_cbor(inner, &mut writer),
            Self::IceCandidate(inner) => to_cbor(inner, &mut writer),
        }
    }

    /// Decode a payload body for the given opcode.
    ///
    /// The size check runs before any CBOR parsing.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::CborDecode` if the body does not match the opcode's
    ///   payload type
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Connected => Self::Connected(from_cbor(bytes)?),
            Opcode::Announce => Self::Announce(from_cbor(bytes)?),
            Opcode::PresenceSnapshot => Self::PresenceSnapshot(from_cbor(bytes)?),
            Opcode::CallRequest => Self::CallRequest(from_cbor(bytes)?),
            Opcode::CallIncoming => Self::CallIncoming(from_cbor(bytes)?),
            Opcode::CallAccept => Self::CallAccept(from_cbor(bytes)?),
            Opcode::CallAccepted => Self::CallAccepted(from_cbor(bytes)?),
            Opcode::CallReject => Self::CallReject(from_cbor(bytes)?),
            Opcode::CallRejected => Self::CallRejected,
            Opcode::Offer => Self::Offer(from_cbor(bytes)?),
            Opcode::OfferRelay => Self::OfferRelay(from_cbor(bytes)?),
            Opcode::Answer => Self::Answer(from_cbor(bytes)?),
            Opcode::IceCandidate => Self::IceCandidate(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame.
    ///
    /// The header's opcode comes from the payload type and its payload size
    /// from the encoded body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn to_frame(&self) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(Frame::new(FrameHeader::new(self.opcode()), buf))
    }

    /// Parse payload from a raw transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the opcode is not in the catalog
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    /// - `ProtocolError::PayloadTooLarge` if payload exceeds maximum size
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn to_cbor<T: Serialize, W: std::io::Write>(value: &T, writer: W) -> Result<()> {
    ciborium::ser::into_writer(value, writer).map_err(|e| ProtocolError::CborEncode(e.to_string()))
}

pub(crate) fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
