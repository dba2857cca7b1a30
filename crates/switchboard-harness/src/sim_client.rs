//! Simulated relay client.
//!
//! Pairs the Sans-IO [`SignalingClient`] with a turmoil TCP stream.

use std::{io, time::Duration};

use switchboard_client::{ClientAction, ClientEvent, SignalingClient};
use switchboard_proto::ConnectionId;
use tokio::io::{ReadHalf, WriteHalf};
use turmoil::net::TcpStream;

use crate::wire;

/// Client connected to a [`SimServer`](crate::SimServer) over simulated TCP.
pub struct SimClient {
    state: SignalingClient,
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
}

impl SimClient {
    /// Connect and wait for the relay's handshake.
    pub async fn connect(address: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (reader, writer) = tokio::io::split(stream);
        let mut client = Self { state: SignalingClient::new(), reader, writer };

        match client.next_action().await? {
            Some(ClientAction::Connected { .. }) => Ok(client),
            Some(other) => Err(io::Error::other(format!("expected handshake, got {other:?}"))),
            None => Err(io::Error::other("relay closed before handshake")),
        }
    }

    /// Connection ID the relay assigned.
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.state.connection_id()
    }

    /// Underlying client state.
    pub fn state(&self) -> &SignalingClient {
        &self.state
    }

    /// Feed an application intent to the client and send what it produces.
    pub async fn act(&mut self, event: ClientEvent) -> io::Result<()> {
        let actions = self.state.handle(event).map_err(|e| io::Error::other(e.to_string()))?;

        for action in actions {
            if let ClientAction::Send(frame) = action {
                wire::write_frame(&mut self.writer, &frame).await?;
            }
        }
        Ok(())
    }

    /// Read the next frame and return the notification it produces.
    ///
    /// Returns `Ok(None)` when the relay closes the stream.
    pub async fn next_action(&mut self) -> io::Result<Option<ClientAction>> {
        let Some(frame) = wire::read_frame(&mut self.reader).await? else {
            return Ok(None);
        };

        let actions = self
            .state
            .handle(ClientEvent::FrameReceived(frame))
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(actions.into_iter().next())
    }

    /// Wait up to `within` for a notification.
    ///
    /// Returns `Ok(None)` if nothing arrived in time. A timeout in the middle
    /// of a frame leaves the stream misaligned, so use this only to assert
    /// that nothing is delivered.
    pub async fn next_action_within(
        &mut self,
        within: Duration,
    ) -> io::Result<Option<ClientAction>> {
        match tokio::time::timeout(within, self.next_action()).await {
            Ok(result) => result,
            Err(_elapsed) => Ok(None),
        }
    }
}
