//! QUIC transport for the client.
//!
//! Provides [`ConnectedClient`] which handles QUIC I/O for frame transport.
//! This is a thin layer that just sends/receives frames; protocol logic
//! remains in the Sans-IO [`SignalingClient`](crate::SignalingClient).
//!
//! Outbound frames share one bidirectional stream, written back to back. The
//! relay delivers everything on a single unidirectional stream it opens.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use bytes::BytesMut;
use quinn::{ClientConfig, Connection, Endpoint, RecvStream};
use switchboard_proto::{ALPN_PROTOCOL, Frame, FrameHeader};
use thiserror::Error;
use tokio::sync::mpsc;

/// Frames buffered in each direction before the sender waits.
const CHANNEL_CAPACITY: usize = 32;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Handle to a connected client with QUIC transport.
///
/// Frames are sent and received via the channels, and an internal task
/// handles the QUIC I/O.
pub struct ConnectedClient {
    /// Send frames to the relay.
    pub to_server: mpsc::Sender<Frame>,
    /// Receive frames from the relay.
    pub from_server: mpsc::Receiver<Frame>,
    connection: Connection,
    endpoint: Endpoint,
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Local address of the client endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if the socket address cannot be
    /// read.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.endpoint.local_addr().map_err(|e| TransportError::Connection(e.to_string()))
    }

    /// Stop the connection task without notifying the relay.
    ///
    /// The relay notices when its idle timeout expires.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }

    /// Close the connection and wait until the relay has been told.
    pub async fn close(self) {
        self.abort_handle.abort();
        self.connection.close(0u32.into(), b"client closed");
        self.endpoint.wait_idle().await;
    }
}

/// Connect to a Switchboard relay via QUIC.
///
/// The relay's certificate is not verified.
///
/// # Errors
///
/// Returns [`TransportError::Connection`] if the endpoint cannot be created or
/// the handshake fails.
pub async fn connect(server_addr: SocketAddr) -> Result<ConnectedClient, TransportError> {
    let client_config = insecure_client_config()?;
    let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
    let mut endpoint = Endpoint::client(bind)
        .map_err(|e| TransportError::Connection(format!("endpoint creation failed: {e}")))?;
    endpoint.set_default_client_config(client_config);

    let connection = endpoint
        .connect(server_addr, "localhost")
        .map_err(|e| TransportError::Connection(format!("connect failed: {e}")))?
        .await
        .map_err(|e| TransportError::Connection(format!("connection failed: {e}")))?;

    let (to_server_tx, to_server_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
    let (from_server_tx, from_server_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_connection(connection.clone(), to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        connection,
        endpoint,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection, bridging between channels and QUIC.
async fn run_connection(
    connection: Connection,
    to_server: mpsc::Receiver<Frame>,
    from_server: mpsc::Sender<Frame>,
) {
    let conn_recv = connection.clone();
    let recv_handle = tokio::spawn(async move {
        loop {
            match conn_recv.accept_uni().await {
                Ok(recv) => {
                    let tx = from_server.clone();
                    tokio::spawn(async move {
                        if let Err(e) = read_frames(recv, tx).await {
                            tracing::debug!("incoming stream ended: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::debug!("connection closed: {e}");
                    break;
                },
            }
        }
    });

    if let Err(e) = write_frames(&connection, to_server).await {
        tracing::warn!("outbound stream failed: {e}");
    }

    recv_handle.abort();
}

/// Drain outgoing frames onto one bidirectional stream.
///
/// The stream is opened when the first frame is queued.
async fn write_frames(
    connection: &Connection,
    mut to_server: mpsc::Receiver<Frame>,
) -> Result<(), TransportError> {
    let Some(first) = to_server.recv().await else {
        return Ok(());
    };

    let (mut send, _recv) = connection
        .open_bi()
        .await
        .map_err(|e| TransportError::Stream(format!("open failed: {e}")))?;

    let mut buf = Vec::new();
    let mut next = Some(first);

    while let Some(frame) = next {
        buf.clear();
        frame
            .encode(&mut buf)
            .map_err(|e| TransportError::Protocol(format!("encode failed: {e}")))?;

        send.write_all(&buf)
            .await
            .map_err(|e| TransportError::Stream(format!("write failed: {e}")))?;

        next = to_server.recv().await;
    }

    send.finish().map_err(|e| TransportError::Stream(format!("finish failed: {e}")))?;

    Ok(())
}

/// Read length-prefixed frames from a relay stream until it finishes.
async fn read_frames(mut recv: RecvStream, tx: mpsc::Sender<Frame>) -> Result<(), TransportError> {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        buf.resize(FrameHeader::SIZE, 0);
        match recv.read_exact(&mut buf[..FrameHeader::SIZE]).await {
            Ok(()) => {},
            Err(quinn::ReadExactError::FinishedEarly(0)) => return Ok(()),
            Err(e) => return Err(TransportError::Stream(format!("header read failed: {e}"))),
        }

        let header = FrameHeader::from_bytes(&buf[..FrameHeader::SIZE])
            .map_err(|e| TransportError::Protocol(format!("invalid header: {e}")))?;
        let payload_size = header.payload_size() as usize;

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            recv.read_exact(&mut buf[FrameHeader::SIZE..])
                .await
                .map_err(|e| TransportError::Stream(format!("payload read failed: {e}")))?;
        }

        let frame = Frame::decode(&buf)
            .map_err(|e| TransportError::Protocol(format!("frame decode failed: {e}")))?;

        tx.send(frame)
            .await
            .map_err(|e| TransportError::Stream(format!("channel send failed: {e}")))?;
    }
}

/// Create an insecure client config that accepts any certificate.
///
/// WARNING: Development only. Production should verify certificates.
fn insecure_client_config() -> Result<ClientConfig, TransportError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();

    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| TransportError::Connection(format!("invalid TLS config: {e}")))?;
    let mut config = ClientConfig::new(Arc::new(quic_crypto));

    let idle_timeout = Duration::from_secs(30)
        .try_into()
        .map_err(|e| TransportError::Connection(format!("invalid idle timeout: {e}")))?;
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(idle_timeout));
    transport.keep_alive_interval(Some(Duration::from_secs(10)));
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts any certificate.
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
