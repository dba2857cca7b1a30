//! Observable state snapshots for invariant checking.
//!
//! A snapshot captures the relay right after one event: the registry as it
//! now stands, the frame that triggered the event (if any), and every
//! delivery the event produced.

use std::collections::BTreeSet;

use switchboard_proto::{ConnectionId, Frame, PresenceEntry};
use switchboard_server::{Environment, ServerAction, ServerDriver};

/// Inbound frame that caused the step.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Connection the frame arrived on.
    pub sender: ConnectionId,
    /// The frame as received.
    pub frame: Frame,
}

/// One frame queued for one connection.
#[derive(Debug, Clone)]
pub struct ObservedDelivery {
    /// Recipient.
    pub to: ConnectionId,
    /// Frame as it would be written.
    pub frame: Frame,
}

/// Relay state after one event.
#[derive(Debug, Clone, Default)]
pub struct RelaySnapshot {
    /// Registered connections.
    pub connected: BTreeSet<ConnectionId>,
    /// Online Set held by the registry.
    pub online: Vec<PresenceEntry>,
    /// Frame that triggered the event, `None` for accept and close.
    pub trigger: Option<Trigger>,
    /// Deliveries the event produced, broadcasts expanded.
    pub deliveries: Vec<ObservedDelivery>,
}

impl RelaySnapshot {
    /// Snapshot with no connections and no deliveries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the driver's registry together with one event's actions.
    pub fn capture<E: Environment>(
        driver: &ServerDriver<E>,
        trigger: Option<Trigger>,
        actions: &[ServerAction<E::Instant>],
    ) -> Self {
        let registry = driver.registry();
        let mut deliveries = Vec::new();

        for action in actions {
            match action {
                ServerAction::SendToConnection { connection_id, frame } => {
                    deliveries.push(ObservedDelivery {
                        to: connection_id.clone(),
                        frame: frame.clone(),
                    });
                },
                ServerAction::Broadcast { recipients, frame } => {
                    deliveries.extend(
                        recipients
                            .iter()
                            .map(|to| ObservedDelivery { to: to.clone(), frame: frame.clone() }),
                    );
                },
                ServerAction::CloseConnection { .. } | ServerAction::Log { .. } => {},
            }
        }

        Self {
            connected: registry.connections().cloned().collect(),
            online: registry.snapshot(),
            trigger,
            deliveries,
        }
    }
}
