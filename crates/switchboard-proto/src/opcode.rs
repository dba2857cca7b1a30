//! Message catalog.

/// Which side of the relay may originate a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sent by clients, consumed by the relay
    ClientToRelay,
    /// Sent by the relay, consumed by clients
    RelayToClient,
    /// Sent by a client and forwarded verbatim to another client
    Relayed,
}

/// Frame operation codes.
///
/// Codes are grouped by concern: `0x00xx` session, `0x001x` presence,
/// `0x002x` call control, `0x003x` media negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Relay tells a new client its connection ID
    Connected = 0x0001,

    /// Client announces its presence descriptor
    Announce = 0x0010,
    /// Relay broadcasts the full Online Set
    PresenceSnapshot = 0x0011,

    /// Client asks the relay to ring another connection
    CallRequest = 0x0020,
    /// Relay notifies the callee of an incoming call
    CallIncoming = 0x0021,
    /// Client accepts a call from another connection
    CallAccept = 0x0022,
    /// Relay notifies the caller that the call was accepted
    CallAccepted = 0x0023,
    /// Client rejects a call from another connection
    CallReject = 0x0024,
    /// Relay notifies the caller that the call was rejected
    CallRejected = 0x0025,

    /// Client sends a session offer to another connection
    Offer = 0x0030,
    /// Relay delivers an offer enriched with the sender's presence entry
    OfferRelay = 0x0031,
    /// Session answer, forwarded unchanged
    Answer = 0x0032,
    /// ICE candidate, forwarded unchanged
    IceCandidate = 0x0033,
}

impl Opcode {
    /// Every opcode in the catalog.
    pub const ALL: [Self; 13] = [
        Self::Connected,
        Self::Announce,
        Self::PresenceSnapshot,
        Self::CallRequest,
        Self::CallIncoming,
        Self::CallAccept,
        Self::CallAccepted,
        Self::CallReject,
        Self::CallRejected,
        Self::Offer,
        Self::OfferRelay,
        Self::Answer,
        Self::IceCandidate,
    ];

    /// Wire representation.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire opcode. `None` if not part of the catalog.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Connected),
            0x0010 => Some(Self::Announce),
            0x0011 => Some(Self::PresenceSnapshot),
            0x0020 => Some(Self::CallRequest),
            0x0021 => Some(Self::CallIncoming),
            0x0022 => Some(Self::CallAccept),
            0x0023 => Some(Self::CallAccepted),
            0x0024 => Some(Self::CallReject),
            0x0025 => Some(Self::CallRejected),
            0x0030 => Some(Self::Offer),
            0x0031 => Some(Self::OfferRelay),
            0x0032 => Some(Self::Answer),
            0x0033 => Some(Self::IceCandidate),
            _ => None,
        }
    }

    /// Who is allowed to originate this message.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Announce
            | Self::CallRequest
            | Self::CallAccept
            | Self::CallReject
            | Self::Offer => Direction::ClientToRelay,
            Self::Connected
            | Self::PresenceSnapshot
            | Self::CallIncoming
            | Self::CallAccepted
            | Self::CallRejected
            | Self::OfferRelay => Direction::RelayToClient,
            Self::Answer | Self::IceCandidate => Direction::Relayed,
        }
    }

    /// Whether a client may send this opcode to the relay.
    #[must_use]
    pub const fn is_client_originated(self) -> bool {
        !matches!(self.direction(), Direction::RelayToClient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_round_trip() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert_eq!(Opcode::from_u16(0x0000), None);
        assert_eq!(Opcode::from_u16(0x0034), None);
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }

    #[test]
    fn relay_only_opcodes_are_not_client_originated() {
        assert!(!Opcode::PresenceSnapshot.is_client_originated());
        assert!(!Opcode::CallIncoming.is_client_originated());
        assert!(!Opcode::OfferRelay.is_client_originated());
        assert!(Opcode::Announce.is_client_originated());
        assert!(Opcode::Answer.is_client_originated());
        assert!(Opcode::IceCandidate.is_client_originated());
    }
}
