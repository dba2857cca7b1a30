//! Server driver.
//!
//! Sans-IO core of the relay: consumes [`ServerEvent`]s, mutates the
//! [`ConnectionRegistry`], and returns [`ServerAction`]s for the runtime to
//! execute. Every event is handled to completion before the next one, so a
//! handler's read of the sender's entry, the registry write, the snapshot
//! build and the recipient list are one atomic step from the point of view of
//! every other connection.
//!
//! Client mistakes never surface as errors. Malformed frames, relay-only
//! opcodes and unknown targets produce a [`ServerAction::Log`] and nothing
//! else.

use switchboard_proto::{
    ConnectionId, Descriptor, Frame, Opcode, Payload,
    payloads::{
        call::{CallAccepted, CallIncoming, CallTarget},
        negotiation::OfferRelay,
        presence::{Connected, PresenceSnapshot},
    },
};

use crate::{env::Environment, registry::ConnectionRegistry, server_error::DriverError};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Events that the server driver processes.
///
/// These are produced by the external runtime (simulation or production).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted
    ConnectionAccepted {
        /// Unique connection ID assigned by the runtime
        connection_id: ConnectionId,
    },

    /// A frame was received from a connection
    FrameReceived {
        /// Connection that sent the frame
        connection_id: ConnectionId,
        /// The received frame
        frame: Frame,
    },

    /// A connection was closed (by peer, error or shutdown)
    ConnectionClosed {
        /// Connection that was closed
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the server driver produces.
///
/// These are executed by runtime-specific code (production or simulation).
#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction<I = std::time::Instant> {
    /// Send a frame to one connection
    SendToConnection {
        /// Target connection
        connection_id: ConnectionId,
        /// Frame to send
        frame: Frame,
    },

    /// Send the same frame to a fixed set of connections
    ///
    /// Recipients are resolved while the event is handled, so a connection
    /// that joins afterwards is not included.
    Broadcast {
        /// Connections to deliver to
        recipients: Vec<ConnectionId>,
        /// Frame to broadcast
        frame: Frame,
    },

    /// Close a connection
    CloseConnection {
        /// Connection to close
        connection_id: ConnectionId,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
        /// When the event occurred
        timestamp: I,
    },
}

/// Log levels for server actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

type Actions<E> = Vec<ServerAction<<E as Environment>::Instant>>;

/// Action-based relay driver.
pub struct ServerDriver<E>
where
    E: Environment,
{
    /// Live connections and the Online Set
    registry: ConnectionRegistry,
    /// Environment (time, RNG)
    env: E,
    /// Driver configuration
    config: DriverConfig,
}

impl<E> ServerDriver<E>
where
    E: Environment,
{
    /// Create a new server driver.
    pub fn new(env: E, config: DriverConfig) -> Self {
        Self { registry: ConnectionRegistry::new(), env, config }
    }

    /// Process a server event and return actions to execute.
    ///
    /// # Errors
    ///
    /// - `DriverError::ConnectionNotFound` if a frame arrives for a connection
    ///   that was never accepted or is already closed
    /// - `DriverError::ConnectionAlreadyExists` if a connection ID is reused
    /// - `DriverError::Protocol` if an outbound message fails to encode
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Actions<E>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { connection_id } => {
                self.handle_connection_accepted(connection_id)
            },
            ServerEvent::FrameReceived { connection_id, frame } => {
                self.handle_frame_received(&connection_id, frame)
            },
            ServerEvent::ConnectionClosed { connection_id, reason } => {
                self.handle_connection_closed(&connection_id, &reason)
            },
        }
    }

    fn handle_connection_accepted(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Actions<E>, DriverError> {
        let now = self.env.now();

        if self.registry.connection_count() >= self.config.max_connections {
            return Ok(vec![
                ServerAction::CloseConnection {
                    connection_id: connection_id.clone(),
                    reason: "max connections exceeded".to_string(),
                },
                ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "connection {connection_id} refused: limit of {} reached",
                        self.config.max_connections
                    ),
                    timestamp: now,
                },
            ]);
        }

        if self.registry.is_connected(&connection_id) {
            return Err(DriverError::ConnectionAlreadyExists(connection_id));
        }

        let frame = Payload::Connected(Connected { connection_id: connection_id.clone() })
            .to_frame()?;
        self.registry.register_connection(connection_id.clone());

        Ok(vec![
            ServerAction::SendToConnection { connection_id: connection_id.clone(), frame },
            ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {connection_id} accepted"),
                timestamp: now,
            },
        ])
    }

    fn handle_frame_received(
        &mut self,
        sender: &ConnectionId,
        frame: Frame,
    ) -> Result<Actions<E>, DriverError> {
        if !self.registry.is_connected(sender) {
            return Err(DriverError::ConnectionNotFound(sender.clone()));
        }

        let Some(opcode) = frame.header.opcode_enum() else {
            return Ok(self.dropped(
                sender,
                &format!("unknown opcode {:#06x}", frame.header.opcode()),
            ));
        };

        if !opcode.is_client_originated() {
            return Ok(self.dropped(sender, &format!("relay-only opcode {opcode:?}")));
        }

        let payload = match Payload::decode(opcode, &frame.payload) {
            Ok(payload) => payload,
            Err(e) => return Ok(self.dropped(sender, &format!("malformed {opcode:?}: {e}"))),
        };

        match payload {
            Payload::Announce(descriptor) => self.handle_announce(sender, descriptor),
            Payload::CallRequest(target) => self.handle_call_request(sender, &target),
            Payload::CallAccept(target) => self.handle_call_accept(sender, &target),
            Payload::CallReject(target) => self.handle_call_reject(sender, &target),
            Payload::Offer(offer) => self.handle_offer(sender, &offer.to, &frame.payload),
            Payload::Answer(answer) => Ok(self.forward(sender, &answer.to, opcode, frame)),
            Payload::IceCandidate(candidate) => {
                Ok(self.forward(sender, &candidate.to, opcode, frame))
            },
            Payload::Connected(_)
            | Payload::PresenceSnapshot(_)
            | Payload::CallIncoming(_)
            | Payload::CallAccepted(_)
            | Payload::CallRejected
            | Payload::OfferRelay(_) => {
                Ok(self.dropped(sender, &format!("relay-only opcode {opcode:?}")))
            },
        }
    }

    fn handle_announce(
        &mut self,
        sender: &ConnectionId,
        descriptor: Descriptor,
    ) -> Result<Actions<E>, DriverError> {
        let now = self.env.now();

        if self.registry.announce(sender, descriptor).is_none() {
            return Err(DriverError::ConnectionNotFound(sender.clone()));
        }

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!(
                "connection {sender} announced, {} online",
                self.registry.online_count()
            ),
            timestamp: now,
        }];
        actions.extend(self.broadcast_presence()?);

        Ok(actions)
    }

    fn handle_call_request(
        &self,
        sender: &ConnectionId,
        target: &CallTarget,
    ) -> Result<Actions<E>, DriverError> {
        let Some(caller) = self.registry.presence(sender) else {
            return Ok(vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "call request from {sender} to {} dropped: caller has not announced",
                    target.to
                ),
                timestamp: self.env.now(),
            }]);
        };

        let payload = Payload::CallIncoming(CallIncoming { caller: caller.clone() });
        self.deliver(sender, &target.to, &payload)
    }

    fn handle_call_accept(
        &self,
        sender: &ConnectionId,
        target: &CallTarget,
    ) -> Result<Actions<E>, DriverError> {
        if &target.to == sender {
            return Ok(self.self_addressed(sender, Opcode::CallAccept));
        }

        let caller = self.registry.presence(sender).cloned();
        self.deliver(sender, &target.to, &Payload::CallAccepted(CallAccepted { caller }))
    }

    fn handle_call_reject(
        &self,
        sender: &ConnectionId,
        target: &CallTarget,
    ) -> Result<Actions<E>, DriverError> {
        if &target.to == sender {
            return Ok(self.self_addressed(sender, Opcode::CallReject));
        }

        self.deliver(sender, &target.to, &Payload::CallRejected)
    }

    /// Relay an offer with the sender's whole body as `data`.
    fn handle_offer(
        &self,
        sender: &ConnectionId,
        to: &ConnectionId,
        body: &[u8],
    ) -> Result<Actions<E>, DriverError> {
        if to == sender {
            return Ok(self.self_addressed(sender, Opcode::Offer));
        }

        let caller = self.registry.presence(sender).cloned();
        let relay = OfferRelay::from_body(body, caller)?;
        self.deliver(sender, to, &Payload::OfferRelay(relay))
    }

    fn handle_connection_closed(
        &mut self,
        connection_id: &ConnectionId,
        reason: &str,
    ) -> Result<Actions<E>, DriverError> {
        let Some(departure) = self.registry.unregister_connection(connection_id) else {
            return Ok(Vec::new());
        };

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Info,
            message: format!(
                "connection {connection_id} closed: {reason} (announced: {})",
                departure.presence.is_some()
            ),
            timestamp: self.env.now(),
        }];
        actions.extend(self.broadcast_presence()?);

        Ok(actions)
    }

    /// Broadcast the current Online Set to every live connection.
    fn broadcast_presence(&self) -> Result<Actions<E>, DriverError> {
        let recipients: Vec<ConnectionId> = self.registry.connections().cloned().collect();
        if recipients.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = PresenceSnapshot::from(self.registry.snapshot());
        let frame = Payload::PresenceSnapshot(snapshot).to_frame()?;

        Ok(vec![ServerAction::Broadcast { recipients, frame }])
    }

    /// Encode a payload and send it to `target` if that connection is live.
    fn deliver(
        &self,
        sender: &ConnectionId,
        target: &ConnectionId,
        payload: &Payload,
    ) -> Result<Actions<E>, DriverError> {
        if !self.registry.is_connected(target) {
            return Ok(self.unknown_target(sender, target, payload.opcode()));
        }

        let frame = payload.to_frame()?;
        Ok(vec![ServerAction::SendToConnection { connection_id: target.clone(), frame }])
    }

    /// Forward a frame unchanged to `target` if that connection is live.
    fn forward(
        &self,
        sender: &ConnectionId,
        target: &ConnectionId,
        opcode: Opcode,
        frame: Frame,
    ) -> Actions<E> {
        if target == sender {
            return self.self_addressed(sender, opcode);
        }

        if !self.registry.is_connected(target) {
            return self.unknown_target(sender, target, opcode);
        }

        vec![ServerAction::SendToConnection { connection_id: target.clone(), frame }]
    }

    /// Replies and negotiation never echo back to their sender. Only a call
    /// request may ring the connection that sent it.
    fn self_addressed(&self, sender: &ConnectionId, opcode: Opcode) -> Actions<E> {
        vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("{opcode:?} from {sender} dropped: addressed to its sender"),
            timestamp: self.env.now(),
        }]
    }

    fn unknown_target(
        &self,
        sender: &ConnectionId,
        target: &ConnectionId,
        opcode: Opcode,
    ) -> Actions<E> {
        vec![ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("{opcode:?} from {sender} dropped: {target} is not connected"),
            timestamp: self.env.now(),
        }]
    }

    fn dropped(&self, sender: &ConnectionId, reason: &str) -> Actions<E> {
        vec![ServerAction::Log {
            level: LogLevel::Warn,
            message: format!("frame from {sender} dropped: {reason}"),
            timestamp: self.env.now(),
        }]
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Number of announced connections.
    pub fn online_count(&self) -> usize {
        self.registry.online_count()
    }

    /// Whether a connection is live.
    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.registry.is_connected(connection_id)
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Environment the driver was built with.
    pub fn env(&self) -> &E {
        &self.env
    }
}

impl<E> std::fmt::Debug for ServerDriver<E>
where
    E: Environment,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("connection_count", &self.registry.connection_count())
            .field("online_count", &self.registry.online_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    };

    use ciborium::Value;
    use switchboard_proto::{
        FrameHeader, PresenceEntry,
        payloads::negotiation::{Answer, IceCandidate, Offer},
    };

    use super::*;

    #[derive(Clone, Default)]
    struct TestEnv {
        counter: Arc<AtomicU64>,
    }

    impl Environment for TestEnv {
        type Instant = std::time::Instant;

        #[allow(clippy::disallowed_methods)]
        fn now(&self) -> Self::Instant {
            std::time::Instant::now()
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = n.to_be_bytes()[i % 8];
            }
        }
    }

    fn driver() -> ServerDriver<TestEnv> {
        ServerDriver::new(TestEnv::default(), DriverConfig::default())
    }

    fn id(s: &str) -> ConnectionId {
        ConnectionId::from(s)
    }

    fn accept(driver: &mut ServerDriver<TestEnv>, name: &str) {
        driver.process_event(ServerEvent::ConnectionAccepted { connection_id: id(name) }).unwrap();
    }

    fn receive(
        driver: &mut ServerDriver<TestEnv>,
        from: &str,
        payload: Payload,
    ) -> Vec<ServerAction> {
        let frame = payload.to_frame().unwrap();
        driver.process_event(ServerEvent::FrameReceived { connection_id: id(from), frame }).unwrap()
    }

    fn sends(actions: &[ServerAction]) -> Vec<(ConnectionId, Payload)> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::SendToConnection { connection_id, frame } => {
                    Some((connection_id.clone(), Payload::from_frame(frame).unwrap()))
                },
                _ => None,
            })
            .collect()
    }

    fn broadcasts(actions: &[ServerAction]) -> Vec<(Vec<ConnectionId>, PresenceSnapshot)> {
        actions
            .iter()
            .filter_map(|action| match action {
                ServerAction::Broadcast { recipients, frame } => {
                    match Payload::from_frame(frame).unwrap() {
                        Payload::PresenceSnapshot(snapshot) => Some((recipients.clone(), snapshot)),
                        other => panic!("unexpected broadcast payload: {other:?}"),
                    }
                },
                _ => None,
            })
            .collect()
    }

    fn has_log(actions: &[ServerAction], level: LogLevel) -> bool {
        actions.iter().any(|a| matches!(a, ServerAction::Log { level: l, .. } if *l == level))
    }

    fn named(name: &str) -> Descriptor {
        Descriptor::new().with("name", name)
    }

    #[test]
    fn accept_sends_connection_id() {
        let mut driver = driver();

        let actions = driver
            .process_event(ServerEvent::ConnectionAccepted { connection_id: id("a") })
            .unwrap();

        assert_eq!(driver.connection_count(), 1);
        assert_eq!(
            sends(&actions),
            vec![(id("a"), Payload::Connected(Connected { connection_id: id("a") }))]
        );
        assert!(broadcasts(&actions).is_empty());
    }

    #[test]
    fn rejects_when_max_connections_exceeded() {
        let config = DriverConfig { max_connections: 2 };
        let mut driver = ServerDriver::new(TestEnv::default(), config);

        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let actions = driver
            .process_event(ServerEvent::ConnectionAccepted { connection_id: id("c") })
            .unwrap();

        assert_eq!(driver.connection_count(), 2);
        assert!(matches!(actions[0], ServerAction::CloseConnection { .. }));
        assert!(!driver.is_connected(&id("c")));
    }

    #[test]
    fn duplicate_accept_is_an_error() {
        let mut driver = driver();
        accept(&mut driver, "a");

        let result = driver.process_event(ServerEvent::ConnectionAccepted { connection_id: id("a") });
        assert_eq!(result, Err(DriverError::ConnectionAlreadyExists(id("a"))));
    }

    #[test]
    fn frame_from_unknown_connection_is_an_error() {
        let mut driver = driver();
        let frame = Payload::Announce(named("ghost")).to_frame().unwrap();

        let result =
            driver.process_event(ServerEvent::FrameReceived { connection_id: id("ghost"), frame });
        assert_eq!(result, Err(DriverError::ConnectionNotFound(id("ghost"))));
    }

    #[test]
    fn announce_broadcasts_to_everyone_including_sender() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let actions = receive(&mut driver, "a", Payload::Announce(named("alice")));

        let broadcasts = broadcasts(&actions);
        assert_eq!(broadcasts.len(), 1);
        let (recipients, snapshot) = &broadcasts[0];
        assert_eq!(recipients, &vec![id("a"), id("b")]);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&id("a")));
    }

    #[test]
    fn announce_replaces_spoofed_connection_id() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let spoof = named("mallory").with("connectionId", "b");
        let actions = receive(&mut driver, "a", Payload::Announce(spoof));

        let (_, snapshot) = &broadcasts(&actions)[0];
        let entry = snapshot.get(&id("a")).unwrap();
        assert_eq!(entry.get("connectionId").and_then(Value::as_text), Some("a"));
        assert!(!snapshot.contains(&id("b")));
    }

    #[test]
    fn close_without_announce_still_broadcasts() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");
        receive(&mut driver, "b", Payload::Announce(named("bob")));

        let actions = driver
            .process_event(ServerEvent::ConnectionClosed {
                connection_id: id("a"),
                reason: "client disconnect".to_string(),
            })
            .unwrap();

        let broadcasts = broadcasts(&actions);
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(broadcasts[0].0, vec![id("b")]);
        assert_eq!(broadcasts[0].1.len(), 1);
        assert_eq!(driver.connection_count(), 1);
    }

    #[test]
    fn close_runs_once() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let close = || ServerEvent::ConnectionClosed {
            connection_id: id("a"),
            reason: "gone".to_string(),
        };
        assert!(!driver.process_event(close()).unwrap().is_empty());
        assert!(driver.process_event(close()).unwrap().is_empty());
    }

    #[test]
    fn last_connection_closing_broadcasts_nothing() {
        let mut driver = driver();
        accept(&mut driver, "a");
        receive(&mut driver, "a", Payload::Announce(named("alice")));

        let actions = driver
            .process_event(ServerEvent::ConnectionClosed {
                connection_id: id("a"),
                reason: "gone".to_string(),
            })
            .unwrap();

        assert!(broadcasts(&actions).is_empty());
        assert_eq!(driver.online_count(), 0);
    }

    #[test]
    fn call_request_requires_announced_caller() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let actions = receive(&mut driver, "a", Payload::CallRequest(CallTarget::new("b")));
        assert!(sends(&actions).is_empty());
        assert!(has_log(&actions, LogLevel::Debug));

        receive(&mut driver, "a", Payload::Announce(named("alice")));
        let actions = receive(&mut driver, "a", Payload::CallRequest(CallTarget::new("b")));

        let sent = sends(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, id("b"));
        let Payload::CallIncoming(incoming) = &sent[0].1 else {
            panic!("expected CallIncoming, got {:?}", sent[0].1);
        };
        assert_eq!(incoming.caller.connection_id(), &id("a"));
    }

    #[test]
    fn call_accept_without_announce_omits_caller() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let actions = receive(&mut driver, "b", Payload::CallAccept(CallTarget::new("a")));

        assert_eq!(
            sends(&actions),
            vec![(id("a"), Payload::CallAccepted(CallAccepted { caller: None }))]
        );
    }

    #[test]
    fn call_reject_has_no_body() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let actions = receive(&mut driver, "b", Payload::CallReject(CallTarget::new("a")));

        let ServerAction::SendToConnection { connection_id, frame } = &actions[0] else {
            panic!("expected a send, got {:?}", actions[0]);
        };
        assert_eq!(connection_id, &id("a"));
        assert_eq!(frame.header.opcode_enum(), Some(Opcode::CallRejected));
        assert!(frame.payload.is_empty());
    }

    fn cbor(value: &Value) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(value, &mut bytes).unwrap();
        bytes
    }

    #[test]
    fn offer_is_enriched_with_caller() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");
        receive(&mut driver, "a", Payload::Announce(named("alice")));

        let offer = Offer { to: id("b"), offer: Value::Text("v=0".into()) };
        let actions = receive(&mut driver, "a", Payload::Offer(offer.clone()));

        let sent = sends(&actions);
        let relay = OfferRelay {
            data: Value::serialized(&offer).unwrap(),
            caller: Some(PresenceEntry::new(id("a"), named("alice"))),
        };
        assert_eq!(sent, vec![(id("b"), Payload::OfferRelay(relay))]);
    }

    #[test]
    fn offer_relay_keeps_fields_outside_the_offer() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let body = Value::Map(vec![
            (Value::Text("to".into()), Value::Text("b".into())),
            (Value::Text("offer".into()), Value::Text("v=0".into())),
            (Value::Text("sdpMid".into()), Value::Text("0".into())),
        ]);
        let frame = Frame::new(FrameHeader::new(Opcode::Offer), cbor(&body));

        let actions = driver
            .process_event(ServerEvent::FrameReceived { connection_id: id("a"), frame })
            .unwrap();

        assert_eq!(
            sends(&actions),
            vec![(id("b"), Payload::OfferRelay(OfferRelay { data: body, caller: None }))]
        );
    }

    #[test]
    fn replies_addressed_to_sender_are_dropped() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");
        receive(&mut driver, "a", Payload::Announce(named("alice")));

        let to_self = [
            Payload::CallAccept(CallTarget::new("a")),
            Payload::CallReject(CallTarget::new("a")),
            Payload::Offer(Offer { to: id("a"), offer: Value::Null }),
            Payload::Answer(Answer { to: id("a"), answer: Value::Null }),
            Payload::IceCandidate(IceCandidate { to: id("a"), candidate: Value::Null }),
        ];

        for payload in to_self {
            let actions = receive(&mut driver, "a", payload);
            assert!(sends(&actions).is_empty());
            assert!(has_log(&actions, LogLevel::Debug));
        }
    }

    #[test]
    fn call_request_to_self_rings_sender() {
        let mut driver = driver();
        accept(&mut driver, "a");
        receive(&mut driver, "a", Payload::Announce(named("alice")));

        let actions = receive(&mut driver, "a", Payload::CallRequest(CallTarget::new("a")));

        let caller = PresenceEntry::new(id("a"), named("alice"));
        assert_eq!(
            sends(&actions),
            vec![(id("a"), Payload::CallIncoming(CallIncoming { caller }))]
        );
    }

    #[test]
    fn answer_is_forwarded_byte_for_byte() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        // Extra field the relay does not model must survive.
        let body = Value::Map(vec![
            (Value::Text("to".into()), Value::Text("a".into())),
            (Value::Text("answer".into()), Value::Bytes(vec![1, 2, 3])),
            (Value::Text("extra".into()), Value::Bool(true)),
        ]);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&body, &mut bytes).unwrap();
        let frame = Frame::new(FrameHeader::new(Opcode::Answer), bytes);

        let actions = driver
            .process_event(ServerEvent::FrameReceived {
                connection_id: id("b"),
                frame: frame.clone(),
            })
            .unwrap();

        assert_eq!(
            actions,
            vec![ServerAction::SendToConnection { connection_id: id("a"), frame }]
        );
    }

    #[test]
    fn unknown_target_is_silent_for_sender() {
        let mut driver = driver();
        accept(&mut driver, "a");
        receive(&mut driver, "a", Payload::Announce(named("alice")));

        let actions = receive(&mut driver, "a", Payload::CallRequest(CallTarget::new("nobody")));

        assert!(sends(&actions).is_empty());
        assert!(broadcasts(&actions).is_empty());
        assert!(has_log(&actions, LogLevel::Debug));
    }

    #[test]
    fn malformed_and_relay_only_frames_are_dropped_with_warning() {
        let mut driver = driver();
        accept(&mut driver, "a");
        accept(&mut driver, "b");

        let garbage = Frame::new(FrameHeader::new(Opcode::CallRequest), vec![0xFF, 0x00]);
        let relay_only =
            Payload::PresenceSnapshot(PresenceSnapshot::default()).to_frame().unwrap();
        let mut unknown = Frame::new(FrameHeader::new(Opcode::Announce), Vec::new());
        unknown.header = {
            let mut bytes = unknown.header.to_bytes();
            bytes[6..8].copy_from_slice(&0x0999u16.to_be_bytes());
            *FrameHeader::from_bytes(&bytes).unwrap()
        };

        for frame in [garbage, relay_only, unknown] {
            let actions = driver
                .process_event(ServerEvent::FrameReceived { connection_id: id("a"), frame })
                .unwrap();
            assert_eq!(actions.len(), 1);
            assert!(has_log(&actions, LogLevel::Warn));
        }
        assert_eq!(driver.online_count(), 0);
    }
}
