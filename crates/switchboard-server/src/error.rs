//! Runtime error types.

use thiserror::Error;

use crate::server_error::DriverError;

/// Errors that can occur in the server runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable TLS files).
    ///
    /// Fatal at startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, I/O error).
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed data from a client.
    ///
    /// Fatal for that stream only; other connections are unaffected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unexpected state. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// Error from the driver.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<switchboard_proto::ProtocolError> for ServerError {
    fn from(err: switchboard_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
