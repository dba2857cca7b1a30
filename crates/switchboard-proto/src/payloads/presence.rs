//! Session and presence payloads.

use serde::{Deserialize, Serialize};

use crate::{ConnectionId, PresenceEntry};

/// Handshake sent to a client right after its connection is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connected {
    /// Identifier the relay assigned to this connection
    #[serde(rename = "connectionId")]
    pub connection_id: ConnectionId,
}

/// Full Online Set, broadcast after every presence change.
///
/// Encoded as a bare CBOR array of presence entries. Entry order is
/// unspecified; receivers must not rely on it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceSnapshot {
    /// Every announced connection, one entry each
    pub entries: Vec<PresenceEntry>,
}

impl PresenceSnapshot {
    /// Entry for a given connection, if it has announced.
    #[must_use]
    pub fn get(&self, connection_id: &ConnectionId) -> Option<&PresenceEntry> {
        self.entries.iter().find(|entry| entry.connection_id() == connection_id)
    }

    /// Whether a connection is part of the snapshot.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.get(connection_id).is_some()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<PresenceEntry>> for PresenceSnapshot {
    fn from(entries: Vec<PresenceEntry>) -> Self {
        Self { entries }
    }
}
