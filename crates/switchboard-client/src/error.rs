//! Client error types.

use switchboard_proto::{Opcode, ProtocolError};
use thiserror::Error;

/// Errors from the client state machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Frame could not be decoded.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] ProtocolError),

    /// The relay sent an opcode only clients may originate.
    #[error("unexpected opcode from relay: {0:?}")]
    UnexpectedOpcode(Opcode),
}
