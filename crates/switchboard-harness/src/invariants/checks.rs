//! Standard relay invariants.

use std::collections::BTreeSet;

use ciborium::Value;
use switchboard_proto::{CONNECTION_ID_KEY, ConnectionId, Opcode, Payload, PresenceEntry};

use super::{Invariant, InvariantResult, ObservedDelivery, RelaySnapshot, Trigger};

fn presence_snapshots(
    state: &RelaySnapshot,
) -> impl Iterator<Item = (&ConnectionId, Vec<PresenceEntry>)> {
    state.deliveries.iter().filter_map(|delivery| {
        match Payload::from_frame(&delivery.frame) {
            Ok(Payload::PresenceSnapshot(snapshot)) => Some((&delivery.to, snapshot.entries)),
            _ => None,
        }
    })
}

fn sorted_ids(entries: &[PresenceEntry]) -> Vec<&ConnectionId> {
    let mut ids: Vec<_> = entries.iter().map(PresenceEntry::connection_id).collect();
    ids.sort();
    ids
}

/// Every presence entry carries exactly one `connectionId`, equal to the
/// connection it belongs to, and no connection appears twice in one snapshot.
///
/// Checked on the registry and on every snapshot delivered in the step.
pub struct PresenceKeyConsistency;

impl PresenceKeyConsistency {
    fn check_entries(&self, entries: &[PresenceEntry], context: &str) -> InvariantResult {
        let mut seen = BTreeSet::new();

        for entry in entries {
            let id_fields: Vec<_> = entry
                .fields()
                .iter()
                .filter(|(key, _)| key.as_text() == Some(CONNECTION_ID_KEY))
                .collect();

            if id_fields.len() != 1 {
                return Err(self.violation(format!(
                    "{context}: entry {} has {} connectionId fields",
                    entry.connection_id(),
                    id_fields.len()
                )));
            }

            if id_fields[0].1.as_text() != Some(entry.connection_id().as_str()) {
                return Err(self.violation(format!(
                    "{context}: entry {} carries connectionId {:?}",
                    entry.connection_id(),
                    id_fields[0].1
                )));
            }

            if !seen.insert(entry.connection_id()) {
                return Err(self.violation(format!(
                    "{context}: {} appears twice",
                    entry.connection_id()
                )));
            }
        }
        Ok(())
    }
}

impl Invariant for PresenceKeyConsistency {
    fn name(&self) -> &'static str {
        "presence_key_consistency"
    }

    fn check(&self, state: &RelaySnapshot) -> InvariantResult {
        self.check_entries(&state.online, "registry")?;

        for (to, entries) in presence_snapshots(state) {
            self.check_entries(&entries, &format!("snapshot to {to}"))?;

            if sorted_ids(&entries) != sorted_ids(&state.online) {
                return Err(self.violation(format!(
                    "snapshot to {to} lists {:?}, registry holds {:?}",
                    sorted_ids(&entries),
                    sorted_ids(&state.online)
                )));
            }
        }
        Ok(())
    }
}

/// Only registered connections can be online.
pub struct OnlineWithinConnected;

impl Invariant for OnlineWithinConnected {
    fn name(&self) -> &'static str {
        "online_within_connected"
    }

    fn check(&self, state: &RelaySnapshot) -> InvariantResult {
        for entry in &state.online {
            if !state.connected.contains(entry.connection_id()) {
                return Err(self.violation(format!(
                    "{} is online but not connected",
                    entry.connection_id()
                )));
            }
        }
        Ok(())
    }
}

/// A presence broadcast reaches every registered connection exactly once,
/// the triggering connection included.
pub struct BroadcastCompleteness;

impl Invariant for BroadcastCompleteness {
    fn name(&self) -> &'static str {
        "broadcast_completeness"
    }

    fn check(&self, state: &RelaySnapshot) -> InvariantResult {
        let mut recipients = BTreeSet::new();

        for (to, _) in presence_snapshots(state) {
            if !recipients.insert(to) {
                return Err(self.violation(format!("{to} received two snapshots in one step")));
            }
        }

        if recipients.is_empty() {
            return Ok(());
        }

        let connected: BTreeSet<_> = state.connected.iter().collect();
        if recipients != connected {
            return Err(self.violation(format!(
                "snapshot reached {recipients:?}, connected are {connected:?}"
            )));
        }
        Ok(())
    }
}

/// Targeted messages reach their target and nobody else. Only a call request
/// may be delivered back to the connection that sent it.
pub struct RoutingIsolation;

impl Invariant for RoutingIsolation {
    fn name(&self) -> &'static str {
        "routing_isolation"
    }

    fn check(&self, state: &RelaySnapshot) -> InvariantResult {
        let Some(trigger) = &state.trigger else {
            return Ok(());
        };
        let Ok(payload) = Payload::from_frame(&trigger.frame) else {
            if state.deliveries.is_empty() {
                return Ok(());
            }
            return Err(self.violation("undecodable frame produced deliveries".to_string()));
        };
        let Some(target) = payload.target() else {
            return Ok(());
        };

        if target == &trigger.sender
            && payload.opcode() != Opcode::CallRequest
            && !state.deliveries.is_empty()
        {
            return Err(self.violation(format!(
                "{:?} from {target} to itself was delivered",
                payload.opcode()
            )));
        }

        if state.deliveries.len() > 1 {
            return Err(self.violation(format!(
                "{:?} to {target} produced {} deliveries",
                payload.opcode(),
                state.deliveries.len()
            )));
        }

        for delivery in &state.deliveries {
            if &delivery.to != target {
                return Err(self.violation(format!(
                    "{:?} addressed to {target} was delivered to {}",
                    payload.opcode(),
                    delivery.to
                )));
            }
        }
        Ok(())
    }
}

/// Answers and ICE candidates arrive with the sender's payload bytes, and an
/// offer relay's `data` is the sender's whole offer body.
pub struct PayloadTransparency;

impl PayloadTransparency {
    fn check_offer(&self, trigger: &Trigger, delivery: &ObservedDelivery) -> InvariantResult {
        let body = trigger.frame.payload.as_ref();
        let Ok(sent) = ciborium::de::from_reader::<Value, _>(body) else {
            return Ok(());
        };

        match Payload::from_frame(&delivery.frame) {
            Ok(Payload::OfferRelay(relay)) if relay.data == sent => Ok(()),
            Ok(Payload::OfferRelay(relay)) => Err(self.violation(format!(
                "offer from {} to {} relayed as {:?}, sent {sent:?}",
                trigger.sender, delivery.to, relay.data
            ))),
            other => Err(self.violation(format!(
                "offer from {} reached {} as {other:?}",
                trigger.sender, delivery.to
            ))),
        }
    }
}

impl Invariant for PayloadTransparency {
    fn name(&self) -> &'static str {
        "payload_transparency"
    }

    fn check(&self, state: &RelaySnapshot) -> InvariantResult {
        let Some(trigger) = &state.trigger else {
            return Ok(());
        };

        match trigger.frame.header.opcode_enum() {
            Some(Opcode::Offer) => {
                for delivery in &state.deliveries {
                    self.check_offer(trigger, delivery)?;
                }
            },
            Some(Opcode::Answer | Opcode::IceCandidate) => {
                for delivery in &state.deliveries {
                    if delivery.frame.payload != trigger.frame.payload
                        || delivery.frame.header.opcode() != trigger.frame.header.opcode()
                    {
                        return Err(self.violation(format!(
                            "frame from {} to {} was altered in transit",
                            trigger.sender, delivery.to
                        )));
                    }
                }
            },
            _ => {},
        }
        Ok(())
    }
}

/// Nothing is queued for a connection the registry does not hold.
pub struct DeliveriesToLiveConnections;

impl Invariant for DeliveriesToLiveConnections {
    fn name(&self) -> &'static str {
        "deliveries_to_live_connections"
    }

    fn check(&self, state: &RelaySnapshot) -> InvariantResult {
        for delivery in &state.deliveries {
            if !state.connected.contains(&delivery.to) {
                return Err(self.violation(format!("delivery to unregistered {}", delivery.to)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use switchboard_proto::{
        Descriptor, Frame, FrameHeader,
        payloads::{call::CallTarget, negotiation::OfferRelay},
    };

    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    fn snapshot_frame(entries: Vec<PresenceEntry>) -> Frame {
        Payload::PresenceSnapshot(entries.into()).to_frame().unwrap()
    }

    #[test]
    fn snapshot_missing_a_connection_is_incomplete() {
        let frame = snapshot_frame(Vec::new());
        let state = RelaySnapshot {
            connected: [id("a"), id("b")].into_iter().collect(),
            online: Vec::new(),
            trigger: None,
            deliveries: vec![ObservedDelivery { to: id("a"), frame }],
        };

        assert!(BroadcastCompleteness.check(&state).is_err());
    }

    #[test]
    fn stale_snapshot_is_inconsistent() {
        let alice = PresenceEntry::new(id("a"), Descriptor::new().with("name", "alice"));
        let state = RelaySnapshot {
            connected: [id("a")].into_iter().collect(),
            online: Vec::new(),
            trigger: None,
            deliveries: vec![ObservedDelivery { to: id("a"), frame: snapshot_frame(vec![alice]) }],
        };

        assert!(PresenceKeyConsistency.check(&state).is_err());
    }

    #[test]
    fn misrouted_call_breaks_isolation() {
        let frame = Payload::CallReject(CallTarget::new("b")).to_frame().unwrap();
        let state = RelaySnapshot {
            connected: [id("a"), id("b"), id("c")].into_iter().collect(),
            online: Vec::new(),
            trigger: Some(Trigger { sender: id("a"), frame: frame.clone() }),
            deliveries: vec![ObservedDelivery { to: id("c"), frame }],
        };

        let violation = RoutingIsolation.check(&state).unwrap_err();
        assert_eq!(violation.invariant, "routing_isolation");
    }

    #[test]
    fn rejection_echoed_to_sender_breaks_isolation() {
        let frame = Payload::CallReject(CallTarget::new("a")).to_frame().unwrap();
        let state = RelaySnapshot {
            connected: [id("a")].into_iter().collect(),
            online: Vec::new(),
            trigger: Some(Trigger { sender: id("a"), frame }),
            deliveries: vec![ObservedDelivery {
                to: id("a"),
                frame: Payload::CallRejected.to_frame().unwrap(),
            }],
        };

        assert!(RoutingIsolation.check(&state).is_err());
    }

    #[test]
    fn offer_relay_missing_a_field_is_not_transparent() {
        let text = |s: &str| Value::Text(s.into());
        let full = Value::Map(vec![
            (text("to"), text("b")),
            (text("offer"), text("v=0")),
            (text("sdpMid"), text("0")),
        ]);
        let trimmed = Value::Map(vec![(text("to"), text("b")), (text("offer"), text("v=0"))]);
        let mut body = Vec::new();
        ciborium::ser::into_writer(&full, &mut body).unwrap();

        let relayed = |data: Value| ObservedDelivery {
            to: id("b"),
            frame: Payload::OfferRelay(OfferRelay { data, caller: None }).to_frame().unwrap(),
        };
        let state = |delivery| RelaySnapshot {
            connected: [id("a"), id("b")].into_iter().collect(),
            online: Vec::new(),
            trigger: Some(Trigger {
                sender: id("a"),
                frame: Frame::new(FrameHeader::new(Opcode::Offer), body.clone()),
            }),
            deliveries: vec![delivery],
        };

        assert!(PayloadTransparency.check(&state(relayed(full.clone()))).is_ok());
        assert!(PayloadTransparency.check(&state(relayed(trimmed))).is_err());
    }
}
