//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! driver delivers exactly what the reference model says it should, while
//! every relay invariant holds after each step.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelRelay     ServerDriver     Compare
//!      (reference)    (SimEnv)         deliveries
//! ```

use std::collections::BTreeMap;

use ciborium::Value;
use proptest::prelude::*;
use switchboard_harness::{
    Delivery, InvariantRegistry, MAX_PEERS, ModelMessage, ModelRelay, Operation, OperationError,
    PeerId, RelaySnapshot, SimEnv, SmallDescriptor, Target, Trigger, offer_body,
    peer_connection_id,
};
use switchboard_proto::{ConnectionId, Payload};
use switchboard_server::{DriverConfig, DriverError, ServerAction, ServerDriver, ServerEvent};

fn peer_of(connection_id: &ConnectionId) -> PeerId {
    connection_id
        .as_str()
        .strip_prefix("peer-")
        .and_then(|n| n.parse().ok())
        .unwrap_or_else(|| panic!("unexpected connection id {connection_id}"))
}

fn name_of(fields: &[(Value, Value)]) -> String {
    fields
        .iter()
        .find(|(k, _)| k.as_text() == Some("name"))
        .and_then(|(_, v)| v.as_text())
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn sdp_mid_of(data: &Value) -> u8 {
    data.as_map()
        .and_then(|fields| fields.iter().find(|(k, _)| k.as_text() == Some("sdpMid")))
        .and_then(|(_, v)| v.as_integer())
        .and_then(|n| u8::try_from(n).ok())
        .unwrap_or_else(|| panic!("offer relay lost sdpMid: {data:?}"))
}

fn bytes_of(value: &Value) -> Vec<u8> {
    value.as_bytes().cloned().unwrap_or_default()
}

/// Translate a real frame into the model's vocabulary.
fn to_model(payload: Payload) -> ModelMessage {
    match payload {
        Payload::Connected(_) => ModelMessage::Connected,
        Payload::PresenceSnapshot(snapshot) => ModelMessage::Presence(
            snapshot
                .entries
                .iter()
                .map(|e| (peer_of(e.connection_id()), name_of(e.fields())))
                .collect::<BTreeMap<_, _>>(),
        ),
        Payload::CallIncoming(incoming) => {
            ModelMessage::CallIncoming { caller: peer_of(incoming.caller.connection_id()) }
        },
        Payload::CallAccepted(accepted) => ModelMessage::CallAccepted {
            caller: accepted.caller.map(|c| peer_of(c.connection_id())),
        },
        Payload::CallRejected => ModelMessage::CallRejected,
        Payload::OfferRelay(relay) => ModelMessage::OfferRelay {
            sdp_mid: sdp_mid_of(&relay.data),
            caller: relay.caller.map(|c| peer_of(c.connection_id())),
        },
        Payload::Answer(answer) => ModelMessage::Answer { body: bytes_of(&answer.answer) },
        Payload::IceCandidate(ice) => ModelMessage::IceCandidate { body: bytes_of(&ice.candidate) },
        other => panic!("relay emitted client-only payload {other:?}"),
    }
}

fn observe(actions: &[ServerAction<tokio::time::Instant>]) -> Vec<Delivery> {
    let mut deliveries = Vec::new();
    for action in actions {
        let (recipients, frame) = match action {
            ServerAction::SendToConnection { connection_id, frame } => {
                (std::slice::from_ref(connection_id), frame)
            },
            ServerAction::Broadcast { recipients, frame } => (recipients.as_slice(), frame),
            _ => continue,
        };
        let message = to_model(Payload::from_frame(frame).expect("relay frame decodes"));
        deliveries.extend(
            recipients.iter().map(|to| Delivery { to: peer_of(to), message: message.clone() }),
        );
    }
    deliveries.sort();
    deliveries
}

/// Real driver plus invariant checking.
struct RealRelay {
    driver: ServerDriver<SimEnv>,
    invariants: InvariantRegistry,
}

impl RealRelay {
    fn new(seed: u64) -> Self {
        Self {
            driver: ServerDriver::new(SimEnv::with_seed(seed), DriverConfig::default()),
            invariants: InvariantRegistry::standard(),
        }
    }

    fn apply(&mut self, op: &Operation) -> Result<Vec<Delivery>, OperationError> {
        let event = op.to_event().expect("operation encodes");
        let trigger = match &event {
            ServerEvent::FrameReceived { connection_id, frame } => {
                Some(Trigger { sender: connection_id.clone(), frame: frame.clone() })
            },
            _ => None,
        };

        let actions = match self.driver.process_event(event) {
            Ok(actions) => actions,
            Err(DriverError::ConnectionNotFound(_)) => return Err(OperationError::NotConnected),
            Err(DriverError::ConnectionAlreadyExists(_)) => {
                return Err(OperationError::AlreadyConnected);
            },
            Err(e) => panic!("unexpected driver error: {e}"),
        };

        let snapshot = RelaySnapshot::capture(&self.driver, trigger, &actions);
        self.invariants.assert_all(&snapshot, &format!("after {op:?}"));

        Ok(observe(&actions))
    }
}

fn peer() -> impl Strategy<Value = PeerId> {
    0..MAX_PEERS
}

fn target() -> impl Strategy<Value = Target> {
    prop_oneof![
        6 => peer().prop_map(Target::Peer),
        1 => Just(Target::Unknown),
    ]
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => peer().prop_map(|peer| Operation::Connect { peer }),
        1 => peer().prop_map(|peer| Operation::Disconnect { peer }),
        4 => (peer(), any::<u8>(), any::<bool>()).prop_map(|(peer, name_seed, spoof_id)| {
            Operation::Announce { peer, descriptor: SmallDescriptor { name_seed, spoof_id } }
        }),
        2 => (peer(), target()).prop_map(|(from, to)| Operation::CallRequest { from, to }),
        1 => (peer(), target()).prop_map(|(from, to)| Operation::CallAccept { from, to }),
        1 => (peer(), target()).prop_map(|(from, to)| Operation::CallReject { from, to }),
        1 => (peer(), target(), any::<u8>())
            .prop_map(|(from, to, sdp_mid)| Operation::Offer { from, to, sdp_mid }),
        1 => (peer(), target(), any::<u8>())
            .prop_map(|(from, to, body)| Operation::Answer { from, to, body }),
        1 => (peer(), target(), any::<u8>())
            .prop_map(|(from, to, body)| Operation::IceCandidate { from, to, body }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn driver_matches_model(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation(), 1..80),
    ) {
        let mut model = ModelRelay::new();
        let mut real = RealRelay::new(seed);

        for op in &ops {
            let expected = model.apply(op);
            let actual = real.apply(op);
            prop_assert_eq!(actual, expected, "diverged on {:?}", op);
        }

        prop_assert_eq!(real.driver.connection_count(), model.connected().len());
        prop_assert_eq!(real.driver.online_count(), model.online().len());
    }

    #[test]
    fn arbitrary_peer_ids_normalize_into_the_model(
        raw in prop::collection::vec((any::<u8>(), any::<u8>()), 1..40),
    ) {
        let mut model = ModelRelay::new();
        let mut real = RealRelay::new(0);

        for (kind, peer) in raw {
            let op = match kind % 3 {
                0 => Operation::Connect { peer },
                1 => Operation::Disconnect { peer },
                _ => Operation::Offer {
                    from: peer,
                    to: Target::Peer(peer.wrapping_add(1)),
                    sdp_mid: kind,
                },
            }
            .normalized();

            prop_assert!(op.actor() < MAX_PEERS);
            prop_assert_eq!(real.apply(&op), model.apply(&op));
        }
    }
}

#[test]
fn offer_body_reaches_target_whole() {
    let mut real = RealRelay::new(2);
    real.apply(&Operation::Connect { peer: 0 }).unwrap();
    real.apply(&Operation::Connect { peer: 1 }).unwrap();

    let op = Operation::Offer { from: 0, to: Target::Peer(1), sdp_mid: 7 };
    let actions = real.driver.process_event(op.to_event().unwrap()).unwrap();

    let [ServerAction::SendToConnection { connection_id, frame }] = actions.as_slice() else {
        panic!("expected a single delivery, got {actions:?}");
    };
    assert_eq!(connection_id, &peer_connection_id(1));
    let Payload::OfferRelay(relay) = Payload::from_frame(frame).unwrap() else {
        panic!("expected an offer relay");
    };
    assert_eq!(relay.data, offer_body(&peer_connection_id(1), 7));
}

#[test]
fn spoofed_connection_id_never_survives() {
    let mut model = ModelRelay::new();
    let mut real = RealRelay::new(1);

    let ops = [
        Operation::Connect { peer: 0 },
        Operation::Connect { peer: 1 },
        Operation::Announce {
            peer: 0,
            descriptor: SmallDescriptor { name_seed: 9, spoof_id: true },
        },
    ];

    for op in &ops {
        assert_eq!(real.apply(op), model.apply(op));
    }

    let entry = real.driver.registry().presence(&ConnectionId::new("peer-0")).unwrap();
    assert_eq!(entry.get("connectionId"), Some(&Value::Text("peer-0".into())));
}
