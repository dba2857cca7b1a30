//! Client
//!
//! Action-based client state machine for the Switchboard relay. Tracks the
//! connection ID the relay assigned and the latest Online Set, and turns
//! application intents into wire frames.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO pattern as the relay driver. It
//! receives events ([`ClientEvent`]), processes them through pure state
//! machine logic, and returns actions ([`ClientAction`]) for the caller to
//! execute.
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: Client with QUIC transport
//! - [`transport::connect`]: Connect to a relay

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod event;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::SignalingClient;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
