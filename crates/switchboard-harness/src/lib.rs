//! Deterministic simulation harness for Switchboard relay testing.
//!
//! Turmoil-based server and client wrappers plus a seeded [`SimEnv`] for
//! deterministic, reproducible testing of the relay under simulated
//! networking.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference relay. Operations are applied to
//! both the model and the real driver, and the deliveries each produces are
//! compared.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks properties that must hold after every
//! event. Use [`InvariantRegistry::standard()`] for the full relay set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod model;
pub mod sim_client;
pub mod sim_env;
pub mod sim_server;
pub mod wire;

pub use invariants::{
    BroadcastCompleteness, DeliveriesToLiveConnections, Invariant, InvariantRegistry,
    InvariantResult, ObservedDelivery, OnlineWithinConnected, PayloadTransparency,
    PresenceKeyConsistency, RelaySnapshot, RoutingIsolation, Trigger, Violation,
};
pub use model::{
    Delivery, MAX_PEERS, ModelMessage, ModelRelay, Operation, OperationError, PeerId,
    SmallDescriptor, Target, body_bytes, offer_body, peer_connection_id,
};
pub use sim_client::SimClient;
pub use sim_env::SimEnv;
pub use sim_server::SimServer;
