//! Reference model for model-based testing.
//!
//! [`ModelRelay`] states the routing rules as plainly as possible. Tests
//! apply the same [`Operation`] sequence to the model and to the real driver
//! and compare the deliveries each produces.

mod operation;
mod relay;

pub use operation::{
    MAX_PEERS, Operation, OperationError, PeerId, SmallDescriptor, Target, body_bytes,
    offer_body, peer_connection_id,
};
pub use relay::{Delivery, ModelMessage, ModelRelay};
