//! End-to-end tests over real QUIC.
//!
//! A relay is bound to an ephemeral localhost port and driven by real
//! clients from `switchboard-client`.

use std::{net::SocketAddr, time::Duration};

use ciborium::Value;
use switchboard_client::{
    ClientAction, ClientEvent, SignalingClient,
    transport::{self, ConnectedClient},
};
use switchboard_proto::{ConnectionId, Descriptor};
use switchboard_server::{DriverConfig, Server, ServerRuntimeConfig};
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Peer {
    transport: ConnectedClient,
    state: SignalingClient,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> (Self, ConnectionId) {
        let transport = transport::connect(addr).await.unwrap();
        let mut peer = Self { transport, state: SignalingClient::new() };

        match peer.next().await {
            ClientAction::Connected { connection_id } => (peer, connection_id),
            other => panic!("expected handshake, got {other:?}"),
        }
    }

    async fn next(&mut self) -> ClientAction {
        let frame = timeout(RECV_TIMEOUT, self.transport.from_server.recv())
            .await
            .expect("timed out waiting for relay")
            .expect("relay closed the stream");

        let mut actions = self.state.handle(ClientEvent::FrameReceived(frame)).unwrap();
        assert_eq!(actions.len(), 1);
        actions.remove(0)
    }

    async fn act(&mut self, event: ClientEvent) {
        for action in self.state.handle(event).unwrap() {
            if let ClientAction::Send(frame) = action {
                self.transport.to_server.send(frame).await.unwrap();
            }
        }
    }
}

async fn start_relay(max_connections: usize) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<()>) {
    let config = ServerRuntimeConfig {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        driver: DriverConfig { max_connections },
        ..ServerRuntimeConfig::default()
    };
    let server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
            .unwrap();
    });

    (addr, stop_tx, handle)
}

#[tokio::test]
async fn client_receives_connection_id() {
    let (addr, _stop, _relay) = start_relay(16).await;

    let (peer, connection_id) = Peer::connect(addr).await;

    assert_eq!(connection_id.as_str().len(), 16);
    assert_eq!(peer.state.connection_id(), Some(&connection_id));
}

#[tokio::test]
async fn announce_call_and_disconnect_over_quic() {
    let (addr, _stop, _relay) = start_relay(16).await;

    let (mut alice, alice_id) = Peer::connect(addr).await;
    let (mut bob, bob_id) = Peer::connect(addr).await;
    assert_ne!(alice_id, bob_id);

    alice.act(ClientEvent::Announce(Descriptor::new().with("name", "alice"))).await;

    for peer in [&mut alice, &mut bob] {
        match peer.next().await {
            ClientAction::PresenceChanged { online } => {
                assert_eq!(online.len(), 1);
                assert_eq!(online[0].connection_id(), &alice_id);
                assert_eq!(online[0].get("name"), Some(&Value::Text("alice".into())));
            },
            other => panic!("expected presence, got {other:?}"),
        }
    }

    alice.act(ClientEvent::Call { to: bob_id.clone() }).await;
    match bob.next().await {
        ClientAction::IncomingCall { caller } => assert_eq!(caller.connection_id(), &alice_id),
        other => panic!("expected incoming call, got {other:?}"),
    }

    bob.act(ClientEvent::AcceptCall { to: alice_id.clone() }).await;
    assert_eq!(alice.next().await, ClientAction::CallAccepted { caller: None });

    alice.transport.close().await;

    match bob.next().await {
        ClientAction::PresenceChanged { online } => assert!(online.is_empty()),
        other => panic!("expected presence, got {other:?}"),
    }
}

#[tokio::test]
async fn answer_reaches_target_unchanged() {
    let (addr, _stop, _relay) = start_relay(16).await;

    let (mut alice, alice_id) = Peer::connect(addr).await;
    let (mut bob, _bob_id) = Peer::connect(addr).await;

    let answer = Value::Map(vec![
        (Value::Text("type".into()), Value::Text("answer".into())),
        (Value::Text("sdp".into()), Value::Text("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n".into())),
    ]);
    bob.act(ClientEvent::SendAnswer { to: alice_id, answer: answer.clone() }).await;

    assert_eq!(alice.next().await, ClientAction::AnswerReceived { answer });
}

#[tokio::test]
async fn shutdown_returns_after_clients_are_dropped() {
    let (addr, stop, relay) = start_relay(16).await;
    let (_peer, _id) = Peer::connect(addr).await;

    stop.send(()).unwrap();

    timeout(Duration::from_secs(10), relay).await.expect("relay did not stop").unwrap();
}
