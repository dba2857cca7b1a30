//! Quinn-based QUIC transport.
//!
//! Provides encrypted, multiplexed streams over UDP with TLS 1.3. Supports
//! certificates loaded from PEM files and a generated self-signed certificate
//! for local development.
//!
//! # Security
//!
//! ALPN is set to `switchboard` so a client speaking another protocol fails
//! the handshake instead of sending frames the relay cannot parse.
//! Self-signed certificates are for local testing only; deployments MUST use
//! a certificate from a trusted CA.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use quinn::{Endpoint, RecvStream, SendStream, ServerConfig, TransportConfig};
use switchboard_proto::ALPN_PROTOCOL;

use crate::error::ServerError;

/// How long a silent connection stays open before the relay drops it.
const IDLE_TIMEOUT_FACTOR: u32 = 3;

/// QUIC transport using Quinn.
pub struct QuinnTransport {
    /// Quinn endpoint
    endpoint: Endpoint,
}

impl QuinnTransport {
    /// Create and bind a new QUIC transport.
    ///
    /// If `cert_path` and `key_path` are both provided they are used for TLS.
    /// Otherwise a self-signed certificate is generated.
    ///
    /// `keep_alive` is the QUIC keep-alive interval. A connection that stays
    /// silent for three intervals is considered lost, which is what turns a
    /// vanished client into a disconnect.
    pub fn bind(
        addr: SocketAddr,
        cert_path: Option<&Path>,
        key_path: Option<&Path>,
        keep_alive: Duration,
    ) -> Result<Self, ServerError> {
        let mut server_config = match (cert_path, key_path) {
            (Some(cert), Some(key)) => load_tls_config(cert, key)?,
            _ => generate_self_signed_config()?,
        };
        server_config.transport_config(Arc::new(transport_config(keep_alive)?));

        let endpoint = Endpoint::server(server_config, addr)
            .map_err(|e| ServerError::Transport(format!("failed to create endpoint: {e}")))?;

        tracing::info!(%addr, "QUIC transport bound");

        Ok(Self { endpoint })
    }

    /// Wait for the next incoming connection attempt.
    ///
    /// Returns `None` once the endpoint has been closed. Cancel-safe: the
    /// handshake itself runs in [`Connecting::establish`].
    pub async fn accept(&self) -> Option<Connecting> {
        self.endpoint.accept().await.map(Connecting)
    }

    /// Local address the transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.endpoint
            .local_addr()
            .map_err(|e| ServerError::Transport(format!("failed to get local address: {e}")))
    }

    /// Close the endpoint and every connection on it.
    pub fn close(&self, reason: &str) {
        self.endpoint.close(0u32.into(), reason.as_bytes());
    }

    /// Wait until all connections have finished closing.
    pub async fn wait_idle(&self) {
        self.endpoint.wait_idle().await;
    }
}

/// Connection attempt that has not finished its handshake.
pub struct Connecting(quinn::Incoming);

impl Connecting {
    /// Complete the QUIC/TLS handshake.
    pub async fn establish(self) -> Result<QuinnConnection, ServerError> {
        let connection = self
            .0
            .await
            .map_err(|e| ServerError::Transport(format!("connection failed: {e}")))?;

        Ok(QuinnConnection { connection })
    }
}

/// A QUIC connection wrapper.
///
/// Clones are cheap and share the same underlying QUIC connection.
#[derive(Clone)]
pub struct QuinnConnection {
    connection: quinn::Connection,
}

impl QuinnConnection {
    /// Accept a bidirectional stream opened by the client.
    pub async fn accept_bi(&self) -> Result<(SendStream, RecvStream), ServerError> {
        self.connection
            .accept_bi()
            .await
            .map_err(|e| ServerError::Transport(format!("accept_bi failed: {e}")))
    }

    /// Open a unidirectional stream for sending.
    pub async fn open_uni(&self) -> Result<SendStream, ServerError> {
        self.connection
            .open_uni()
            .await
            .map_err(|e| ServerError::Transport(format!("open_uni failed: {e}")))
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.connection.remote_address()
    }

    /// Close the connection with an error code and reason.
    pub fn close(&self, error_code: quinn::VarInt, reason: &[u8]) {
        self.connection.close(error_code, reason);
    }
}

fn transport_config(keep_alive: Duration) -> Result<TransportConfig, ServerError> {
    let idle = keep_alive
        .checked_mul(IDLE_TIMEOUT_FACTOR)
        .ok_or_else(|| ServerError::Config(format!("keep-alive too large: {keep_alive:?}")))?;
    let idle = quinn::IdleTimeout::try_from(idle)
        .map_err(|e| ServerError::Config(format!("invalid idle timeout {idle:?}: {e}")))?;

    let mut transport = TransportConfig::default();
    transport.keep_alive_interval(Some(keep_alive));
    transport.max_idle_timeout(Some(idle));
    Ok(transport)
}

/// Load TLS configuration from certificate and key files.
fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig, ServerError> {
    use std::fs;

    let cert_pem = fs::read(cert_path).map_err(|e| {
        ServerError::Config(format!("failed to read cert '{}': {e}", cert_path.display()))
    })?;

    let key_pem = fs::read(key_path).map_err(|e| {
        ServerError::Config(format!("failed to read key '{}': {e}", key_path.display()))
    })?;

    let certs = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("failed to parse certificates: {e}")))?;

    let key = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| ServerError::Config(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| ServerError::Config("no private key found".to_string()))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    quic_config(tls_config)
}

/// Generate a self-signed certificate for `localhost`.
fn generate_self_signed_config() -> Result<ServerConfig, ServerError> {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .map_err(|e| ServerError::Config(format!("failed to generate self-signed cert: {e}")))?;

    let cert_chain = vec![cert.cert.der().clone()];
    let key = rustls::pki_types::PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key.into())
        .map_err(|e| ServerError::Config(format!("invalid TLS config: {e}")))?;

    tracing::warn!("using self-signed certificate, not for production use");

    quic_config(tls_config)
}

fn quic_config(mut tls_config: rustls::ServerConfig) -> Result<ServerConfig, ServerError> {
    tls_config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
        .map_err(|e| ServerError::Config(format!("QUIC config error: {e}")))?;

    Ok(ServerConfig::with_crypto(Arc::new(crypto)))
}
