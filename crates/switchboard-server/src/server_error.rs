//! Driver error types.
//!
//! Client mistakes (bad payloads, unknown targets) are not errors: the driver
//! logs and drops them. A `DriverError` means the runtime fed the driver an
//! event that contradicts its own bookkeeping.

use switchboard_proto::{ConnectionId, ProtocolError};
use thiserror::Error;

/// Errors that can occur while the driver processes an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Event refers to a connection the registry does not know.
    ///
    /// The runtime delivered a frame for a connection it never announced or
    /// already closed. The event is discarded.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection ID was accepted twice.
    ///
    /// Connection IDs must be unique for the process lifetime. The runtime
    /// regenerates and retries.
    #[error("connection already exists: {0}")]
    ConnectionAlreadyExists(ConnectionId),

    /// Failed to encode an outbound message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        let err = DriverError::ConnectionNotFound(ConnectionId::from("abc"));
        assert_eq!(err.to_string(), "connection not found: abc");

        let err = DriverError::ConnectionAlreadyExists(ConnectionId::from("abc"));
        assert_eq!(err.to_string(), "connection already exists: abc");

        let err = DriverError::from(ProtocolError::InvalidMagic);
        assert_eq!(err.to_string(), "protocol error: invalid magic number");
    }
}
