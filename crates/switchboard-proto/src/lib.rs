//! Switchboard wire protocol.
//!
//! Every message between a client and the relay is a [`Frame`]: a fixed
//! 16-byte binary [`FrameHeader`] followed by a CBOR payload. The header
//! carries the [`Opcode`], so the relay can route a frame (and forward answer
//! and ICE bodies untouched) without knowing anything about the negotiation
//! protocol riding inside it.
//!
//! # Components
//!
//! - [`Frame`] / [`FrameHeader`]: transport envelope
//! - [`Opcode`]: message catalog, with the direction each message travels
//! - [`Payload`]: typed CBOR bodies, one per opcode
//! - [`ConnectionId`], [`Descriptor`], [`PresenceEntry`]: presence data model

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;
mod presence;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::{Direction, Opcode};
pub use payloads::Payload;
pub use presence::{CONNECTION_ID_KEY, ConnectionId, Descriptor, PresenceEntry};

/// ALPN protocol identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"switchboard";
