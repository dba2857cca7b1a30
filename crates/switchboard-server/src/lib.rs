//! Switchboard relay server.
//!
//! Presence and call-signaling relay. Clients connect over QUIC, announce a
//! presence descriptor, and exchange call-control and media-negotiation
//! messages addressed by connection ID.
//!
//! # Architecture
//!
//! [`ServerDriver`] is the Sans-IO core: it owns the [`ConnectionRegistry`]
//! and turns [`ServerEvent`]s into [`ServerAction`]s. [`Server`] is the
//! production runtime that feeds it events from Quinn and executes its
//! actions. The simulation harness drives the same [`ServerDriver`] over a
//! simulated network.
//!
//! # Components
//!
//! - [`ServerDriver`]: routing logic (pure, no I/O)
//! - [`ConnectionRegistry`]: live connections and the Online Set
//! - [`Server`]: production runtime executing driver actions
//! - [`QuinnTransport`]: QUIC transport via Quinn
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod env;
mod error;
mod registry;
mod server_error;
mod system_env;
mod transport;

use std::{
    collections::HashMap,
    future::Future,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
pub use driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use env::Environment;
pub use error::ServerError;
pub use registry::{ConnectionRegistry, Departure};
pub use server_error::DriverError;
use switchboard_proto::{ConnectionId, Frame, FrameHeader};
pub use system_env::SystemEnv;
use tokio::{
    sync::{Mutex, RwLock, mpsc},
    task::JoinSet,
};
pub use transport::{Connecting, QuinnConnection, QuinnTransport};

type SharedDriver = Arc<Mutex<ServerDriver<SystemEnv>>>;

/// Routing handles for live connections.
///
/// Entries are added before the driver learns about a connection and removed
/// before the driver is told it closed, so every action the driver emits for
/// a live connection finds its queue.
struct SharedState {
    /// Connection ID → QUIC connection (for closing)
    connections: RwLock<HashMap<ConnectionId, QuinnConnection>>,
    /// Connection ID → outbound queue drained by the connection's writer task
    outbound: RwLock<HashMap<ConnectionId, mpsc::Sender<Bytes>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to
    pub bind_address: SocketAddr,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<PathBuf>,
    /// Driver configuration (limits)
    pub driver: DriverConfig,
    /// Frames buffered per connection before deliveries to it are dropped
    pub outbound_capacity: usize,
    /// QUIC keep-alive interval
    pub keep_alive: Duration,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 5000)),
            cert_path: None,
            key_path: None,
            driver: DriverConfig::default(),
            outbound_capacity: 256,
            keep_alive: Duration::from_secs(10),
        }
    }
}

/// Production Switchboard relay.
///
/// Wraps [`ServerDriver`] with Quinn QUIC transport and the system
/// environment.
pub struct Server {
    /// The action-based driver
    driver: ServerDriver<SystemEnv>,
    /// QUIC endpoint
    transport: QuinnTransport,
    /// Environment
    env: SystemEnv,
    /// Per-connection outbound queue capacity
    outbound_capacity: usize,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.outbound_capacity == 0 {
            return Err(ServerError::Config("outbound capacity must be at least 1".to_string()));
        }

        let env = SystemEnv::new();
        let driver = ServerDriver::new(env.clone(), config.driver);

        let transport = QuinnTransport::bind(
            config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
            config.keep_alive,
        )?;

        Ok(Self { driver, transport, env, outbound_capacity: config.outbound_capacity })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run until the process is killed.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` resolves.
    ///
    /// On shutdown the endpoint is closed, every connection runs its
    /// disconnect handling, and the call returns once all connection tasks
    /// have finished.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(addr = %self.transport.local_addr()?, "relay starting");

        let Self { driver, transport, env, outbound_capacity } = self;
        let driver: SharedDriver = Arc::new(Mutex::new(driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
        });
        let mut tasks = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                },
                incoming = transport.accept() => {
                    let Some(connecting) = incoming else { break };
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tasks.spawn(async move {
                        let conn = match connecting.establish().await {
                            Ok(conn) => conn,
                            Err(e) => {
                                tracing::warn!("handshake failed: {e}");
                                return;
                            },
                        };
                        if let Err(e) =
                            handle_connection(conn, driver, shared, env, outbound_capacity).await
                        {
                            tracing::error!("connection error: {e}");
                        }
                    });
                },
                // Reap finished connection tasks so the set does not grow.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {},
            }
        }

        transport.close("relay shutting down");
        while tasks.join_next().await.is_some() {}
        transport.wait_idle().await;

        tracing::info!("relay stopped");
        Ok(())
    }
}

fn generate_connection_id(env: &SystemEnv, driver: &ServerDriver<SystemEnv>) -> ConnectionId {
    loop {
        let id = ConnectionId::new(format!("{:016x}", env.random_u64()));
        if !driver.is_connected(&id) {
            return id;
        }
    }
}

/// Handle a single QUIC connection from accept to disconnect.
async fn handle_connection(
    conn: QuinnConnection,
    driver: SharedDriver,
    shared: Arc<SharedState>,
    env: SystemEnv,
    outbound_capacity: usize,
) -> Result<(), ServerError> {
    let outbound_stream = conn.open_uni().await?;
    let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);

    let connection_id = {
        let mut driver = driver.lock().await;
        let connection_id = generate_connection_id(&env, &driver);

        shared.connections.write().await.insert(connection_id.clone(), conn.clone());
        shared.outbound.write().await.insert(connection_id.clone(), outbound_tx);

        let actions = driver.process_event(ServerEvent::ConnectionAccepted {
            connection_id: connection_id.clone(),
        })?;
        execute_actions(actions, &shared).await;

        if !driver.is_connected(&connection_id) {
            // Refused (connection limit). The close action already ran.
            shared.outbound.write().await.remove(&connection_id);
            return Ok(());
        }

        connection_id
    };

    tracing::debug!(%connection_id, remote = %conn.remote_addr(), "connection registered");

    tokio::spawn(write_outbound(connection_id.clone(), outbound_stream, outbound_rx));

    let reason = loop {
        match conn.accept_bi().await {
            Ok((_send, recv)) => {
                let driver = Arc::clone(&driver);
                let shared = Arc::clone(&shared);
                let connection_id = connection_id.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_stream(&connection_id, recv, driver, &shared).await {
                        tracing::debug!(%connection_id, "stream error: {e}");
                    }
                });
            },
            Err(e) => break e.to_string(),
        }
    };

    shared.connections.write().await.remove(&connection_id);
    shared.outbound.write().await.remove(&connection_id);

    {
        let mut driver = driver.lock().await;
        let actions = driver
            .process_event(ServerEvent::ConnectionClosed { connection_id, reason })?;
        execute_actions(actions, &shared).await;
    }

    Ok(())
}

/// Drain a connection's outbound queue onto its unidirectional stream.
///
/// One stream per connection keeps deliveries to a client in the order the
/// driver produced them.
async fn write_outbound(
    connection_id: ConnectionId,
    mut stream: quinn::SendStream,
    mut queue: mpsc::Receiver<Bytes>,
) {
    while let Some(bytes) = queue.recv().await {
        if let Err(e) = stream.write_all(&bytes).await {
            tracing::debug!(%connection_id, "outbound write failed: {e}");
            return;
        }
    }

    if let Err(e) = stream.finish() {
        tracing::debug!(%connection_id, "outbound finish failed: {e}");
    }
}

/// Read frames from one client stream and feed them to the driver.
///
/// A frame that fails header or envelope validation ends the stream: after a
/// bad length there is no way to find the next frame boundary.
async fn handle_stream(
    connection_id: &ConnectionId,
    mut recv: quinn::RecvStream,
    driver: SharedDriver,
    shared: &SharedState,
) -> Result<(), ServerError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];

    loop {
        match recv.read_exact(&mut header_buf).await {
            Ok(()) => {},
            Err(quinn::ReadExactError::FinishedEarly(0)) => return Ok(()),
            Err(e) => return Err(ServerError::Transport(format!("header read failed: {e}"))),
        }

        let header = FrameHeader::from_bytes(&header_buf)?;
        let payload_size = header.payload_size() as usize;

        let mut buf = Vec::with_capacity(FrameHeader::SIZE + payload_size);
        buf.extend_from_slice(&header_buf);
        buf.resize(FrameHeader::SIZE + payload_size, 0);
        recv.read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| ServerError::Transport(format!("payload read failed: {e}")))?;

        let frame = Frame::decode(&buf)?;

        let mut driver = driver.lock().await;
        match driver.process_event(ServerEvent::FrameReceived {
            connection_id: connection_id.clone(),
            frame,
        }) {
            Ok(actions) => execute_actions(actions, shared).await,
            // Frames racing a disconnect land here; nothing to deliver.
            Err(e) => tracing::debug!(%connection_id, "frame processing error: {e}"),
        }
    }
}

/// Execute driver actions.
///
/// Runs with the driver lock held. Deliveries use `try_send`, so a slow
/// client fills its own queue and loses frames without stalling anyone else.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendToConnection { connection_id, frame } => {
                let Some(bytes) = encode(&frame) else { continue };
                let outbound = shared.outbound.read().await;
                enqueue(&outbound, &connection_id, bytes);
            },

            ServerAction::Broadcast { recipients, frame } => {
                let Some(bytes) = encode(&frame) else { continue };
                let outbound = shared.outbound.read().await;
                for connection_id in &recipients {
                    enqueue(&outbound, connection_id, bytes.clone());
                }
            },

            ServerAction::CloseConnection { connection_id, reason } => {
                tracing::info!(%connection_id, "closing connection: {reason}");
                if let Some(conn) = shared.connections.write().await.remove(&connection_id) {
                    conn.close(0u32.into(), reason.as_bytes());
                }
            },

            ServerAction::Log { level, message, .. } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}

fn encode(frame: &Frame) -> Option<Bytes> {
    match frame.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!(opcode = frame.header.opcode(), "failed to encode outbound frame: {e}");
            None
        },
    }
}

fn enqueue(
    outbound: &HashMap<ConnectionId, mpsc::Sender<Bytes>>,
    connection_id: &ConnectionId,
    bytes: Bytes,
) {
    let Some(queue) = outbound.get(connection_id) else {
        tracing::debug!(%connection_id, "delivery dropped: connection gone");
        return;
    };

    match queue.try_send(bytes) {
        Ok(()) => {},
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(%connection_id, "delivery dropped: outbound queue full");
        },
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(%connection_id, "delivery dropped: writer closed");
        },
    }
}
