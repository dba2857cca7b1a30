//! Switchboard relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Self-signed certificate (development)
//! switchboard-server --port 5000
//!
//! # TLS certificate (production)
//! switchboard-server --host 0.0.0.0 --port 443 --cert cert.pem --key key.pem
//! ```
//!
//! `PORT` and `SWITCHBOARD_*` environment variables are read when the
//! corresponding flag is absent. `RUST_LOG` overrides `--log-level`.

use std::{net::IpAddr, path::PathBuf, time::Duration};

use clap::Parser;
use switchboard_server::{DriverConfig, Server, ServerRuntimeConfig};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Presence and call-signaling relay
#[derive(Parser, Debug)]
#[command(name = "switchboard-server")]
#[command(about = "Presence and call-signaling relay over QUIC")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(long, env = "SWITCHBOARD_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long, env = "SWITCHBOARD_CERT")]
    cert: Option<PathBuf>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long, env = "SWITCHBOARD_KEY")]
    key: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, env = "SWITCHBOARD_MAX_CONNECTIONS", default_value_t = 10_000)]
    max_connections: usize,

    /// Frames buffered per connection before deliveries are dropped
    #[arg(long, env = "SWITCHBOARD_OUTBOUND_CAPACITY", default_value_t = 256)]
    outbound_capacity: usize,

    /// QUIC keep-alive interval in seconds
    #[arg(long, env = "SWITCHBOARD_KEEP_ALIVE_SECS", default_value_t = 10)]
    keep_alive_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SWITCHBOARD_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate provided, generating a self-signed one");
    }

    let config = ServerRuntimeConfig {
        bind_address: (args.host, args.port).into(),
        cert_path: args.cert,
        key_path: args.key,
        driver: DriverConfig { max_connections: args.max_connections },
        outbound_capacity: args.outbound_capacity,
        keep_alive: Duration::from_secs(args.keep_alive_secs),
    };

    let server = Server::bind(config)?;

    tracing::info!("relay listening on {}", server.local_addr()?);

    server.run_until(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
