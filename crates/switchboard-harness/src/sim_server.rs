//! Simulation server wrapper for testing with turmoil.
//!
//! `SimServer` wraps `ServerDriver` for integration with turmoil's
//! deterministic simulation. It uses `SimEnv` for the action-based core,
//! turmoil TCP for networking, and tracks connection writers in a `HashMap`.
//!
//! Tests can drive it step by step (`accept_connection`, `process_frame`) or
//! hand it to [`SimServer::serve`], which runs the same loop as the QUIC
//! runtime: reader tasks feed frames through a channel into the driver.

use std::{collections::HashMap, io};

use switchboard_proto::{ConnectionId, Frame};
use switchboard_server::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
use tokio::{
    io::{ReadHalf, WriteHalf},
    sync::mpsc,
};
use turmoil::net::{TcpListener, TcpStream};

use crate::{SimEnv, wire};

/// Input from a connection's reader task.
#[derive(Debug)]
enum Inbound {
    Frame { connection_id: ConnectionId, frame: Frame },
    Closed { connection_id: ConnectionId, reason: String },
}

/// Simulation server for testing with turmoil.
pub struct SimServer {
    /// The action-based server driver
    driver: ServerDriver<SimEnv>,
    /// TCP listener for accepting connections
    listener: TcpListener,
    /// Connection ID → write half
    connections: HashMap<ConnectionId, WriteHalf<TcpStream>>,
    /// Next connection number
    next_connection: u64,
}

impl SimServer {
    /// Create and bind a new simulation server.
    pub async fn bind(address: &str) -> io::Result<Self> {
        Self::bind_with_config(address, DriverConfig::default()).await
    }

    /// Create and bind a new simulation server with custom config.
    pub async fn bind_with_config(address: &str, config: DriverConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let driver = ServerDriver::new(SimEnv::new(), config);

        Ok(Self { driver, listener, connections: HashMap::new(), next_connection: 1 })
    }

    /// Accept a new connection.
    ///
    /// Returns the assigned ID and the read half, or `None` for the ID if the
    /// driver refused the connection.
    pub async fn accept_connection(
        &mut self,
    ) -> io::Result<(Option<ConnectionId>, ReadHalf<TcpStream>)> {
        let (stream, _addr) = self.listener.accept().await?;
        self.register(stream).await
    }

    async fn register(
        &mut self,
        stream: TcpStream,
    ) -> io::Result<(Option<ConnectionId>, ReadHalf<TcpStream>)> {
        let connection_id = ConnectionId::new(format!("sim-{}", self.next_connection));
        self.next_connection += 1;

        let (reader, writer) = tokio::io::split(stream);
        self.connections.insert(connection_id.clone(), writer);

        let actions = self
            .driver
            .process_event(ServerEvent::ConnectionAccepted { connection_id: connection_id.clone() })
            .map_err(|e| io::Error::other(e.to_string()))?;
        self.execute_actions(actions).await;

        if self.driver.is_connected(&connection_id) {
            Ok((Some(connection_id), reader))
        } else {
            self.connections.remove(&connection_id);
            Ok((None, reader))
        }
    }

    /// Process a received frame from a connection.
    pub async fn process_frame(
        &mut self,
        connection_id: &ConnectionId,
        frame: Frame,
    ) -> io::Result<()> {
        let event = ServerEvent::FrameReceived { connection_id: connection_id.clone(), frame };
        let actions = self
            .driver
            .process_event(event)
            .map_err(|e| io::Error::other(e.to_string()))?;

        self.execute_actions(actions).await;
        Ok(())
    }

    /// Handle a connection going away.
    pub async fn disconnect(
        &mut self,
        connection_id: &ConnectionId,
        reason: &str,
    ) -> io::Result<()> {
        self.connections.remove(connection_id);

        let actions = self
            .driver
            .process_event(ServerEvent::ConnectionClosed {
                connection_id: connection_id.clone(),
                reason: reason.to_string(),
            })
            .map_err(|e| io::Error::other(e.to_string()))?;

        self.execute_actions(actions).await;
        Ok(())
    }

    /// Accept connections and route their frames until the listener fails.
    pub async fn serve(mut self) -> io::Result<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, _addr) = accepted?;
                    let (connection_id, reader) = self.register(stream).await?;
                    if let Some(connection_id) = connection_id {
                        tokio::spawn(read_connection(connection_id, reader, inbound_tx.clone()));
                    }
                },
                Some(inbound) = inbound_rx.recv() => match inbound {
                    Inbound::Frame { connection_id, frame } => {
                        // A frame queued behind its connection's close is expected.
                        if let Err(e) = self.process_frame(&connection_id, frame).await {
                            tracing::debug!(%connection_id, "frame dropped: {e}");
                        }
                    },
                    Inbound::Closed { connection_id, reason } => {
                        self.disconnect(&connection_id, &reason).await?;
                    },
                },
            }
        }
    }

    /// Execute server actions.
    async fn execute_actions(&mut self, actions: Vec<ServerAction<tokio::time::Instant>>) {
        for action in actions {
            match action {
                ServerAction::SendToConnection { connection_id, frame } => {
                    self.send_frame(&connection_id, &frame).await;
                },

                ServerAction::Broadcast { recipients, frame } => {
                    for connection_id in &recipients {
                        self.send_frame(connection_id, &frame).await;
                    }
                },

                ServerAction::CloseConnection { connection_id, reason } => {
                    tracing::debug!(%connection_id, "closing connection: {reason}");
                    self.connections.remove(&connection_id);
                },

                ServerAction::Log { level, message, .. } => log(level, &message),
            }
        }
    }

    /// Send a frame to a connection. Write failures surface as a close from
    /// the connection's reader.
    async fn send_frame(&mut self, connection_id: &ConnectionId, frame: &Frame) {
        if let Some(writer) = self.connections.get_mut(connection_id) {
            if let Err(e) = wire::write_frame(writer, frame).await {
                tracing::debug!(%connection_id, "write failed: {e}");
            }
        }
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.driver.connection_count()
    }

    /// Number of announced connections.
    pub fn online_count(&self) -> usize {
        self.driver.online_count()
    }

    /// Underlying driver for test assertions.
    pub fn driver(&self) -> &ServerDriver<SimEnv> {
        &self.driver
    }
}

fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
}

/// Forward frames from one connection until it closes or sends garbage.
async fn read_connection(
    connection_id: ConnectionId,
    mut reader: ReadHalf<TcpStream>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    let reason = loop {
        match wire::read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                let frame = Inbound::Frame { connection_id: connection_id.clone(), frame };
                if inbound.send(frame).is_err() {
                    return;
                }
            },
            Ok(None) => break "connection closed".to_string(),
            Err(e) => break e.to_string(),
        }
    };

    let _ = inbound.send(Inbound::Closed { connection_id, reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_server_binds() {
        let mut sim = turmoil::Builder::new().build();

        sim.host("server", || async {
            let server = SimServer::bind("0.0.0.0:443").await?;
            assert_eq!(server.connection_count(), 0);
            assert_eq!(server.online_count(), 0);
            Ok(())
        });

        sim.run().unwrap();
    }

    #[test]
    fn accepted_connection_gets_sequential_id() {
        let mut sim = turmoil::Builder::new().build();

        sim.host("server", || async {
            let mut server = SimServer::bind("0.0.0.0:443").await?;

            let (first, _r1) = server.accept_connection().await?;
            let (second, _r2) = server.accept_connection().await?;

            assert_eq!(first, Some(ConnectionId::new("sim-1")));
            assert_eq!(second, Some(ConnectionId::new("sim-2")));
            assert_eq!(server.connection_count(), 2);
            Ok(())
        });

        sim.client("client", async {
            let _a = TcpStream::connect("server:443").await?;
            let _b = TcpStream::connect("server:443").await?;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(())
        });

        sim.run().unwrap();
    }
}
