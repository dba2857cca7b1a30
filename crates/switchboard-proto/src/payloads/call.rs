//! Call-control payloads.
//!
//! There is no call session on the relay. A call request, accept or reject is
//! a single routed notification; the relay does not check that an accept
//! answers a request that was actually made.

use serde::{Deserialize, Serialize};

use crate::{ConnectionId, PresenceEntry};

/// Client-to-relay body shared by call request, accept and reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTarget {
    /// Connection the notification is for
    pub to: ConnectionId,
}

impl CallTarget {
    /// Target a connection.
    pub fn new(to: impl Into<ConnectionId>) -> Self {
        Self { to: to.into() }
    }
}

/// Delivered to the callee when someone calls it.
///
/// Only sent when the caller has announced, so `caller` is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallIncoming {
    /// Caller's presence entry at the time of the request
    pub caller: PresenceEntry,
}

/// Delivered to the original caller when the callee accepts.
///
/// Unlike [`CallIncoming`], the accepting side does not need to have
/// announced. In that case the field is omitted from the encoding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallAccepted {
    /// Accepting side's presence entry, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<PresenceEntry>,
}
