//! peer-http-bridge
//!
//! Serves an HTTP backend to remote peers over iroh streams.
//!
//! ```text
//!     Remote peer                ┌──────────────────────────────────────────────┐
//!     ───── stream ─────────────▶│ net::iroh → net::session (allow list check)  │
//!                                │      → http::request (decode)                │
//!                                │      → forward::reverse_proxy ───────────────┼──▶ Backend
//!     ◀──── response bytes ──────│ http::response (encode) ◀── http::sink ◀─────┼─── (HTTP/1.1)
//!                                └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use peer_http_bridge::config::{read_config, validate_config, BridgeConfig, ConfigError};
use peer_http_bridge::lifecycle::{self, signals, Shutdown};
use peer_http_bridge::observability;

#[derive(Parser, Debug)]
#[command(name = "peer-http-bridge")]
#[command(about = "Serve an HTTP backend to allowed peers over iroh streams", long_about = None)]
struct Cli {
    /// TOML config file. Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma separated peer ids allowed to connect, or "*" for anyone.
    #[arg(long)]
    allowed_peers: Option<String>,

    /// Backend base URL, e.g. http://127.0.0.1:8080
    #[arg(long)]
    proxy_target: Option<String>,

    /// Secret key file; created on first start.
    #[arg(long)]
    key_path: Option<PathBuf>,

    /// Protocol id to accept streams on.
    #[arg(long)]
    protocol: Option<String>,

    /// Comma separated UDP listen addresses, at most one IPv4 and one IPv6.
    #[arg(long)]
    addrs: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(peers) = self.allowed_peers {
            config.bridge.allowed_peers = peers.split(',').map(str::to_string).collect();
        }
        if let Some(target) = self.proxy_target {
            config.upstream.target = target;
        }
        if let Some(key_path) = self.key_path {
            config.identity.key_path = key_path;
        }
        if let Some(protocol) = self.protocol {
            config.bridge.protocol = protocol;
        }
        if let Some(addrs) = self.addrs {
            config.bridge.bind_addrs = addrs.split(',').map(str::to_string).collect();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => BridgeConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    observability::logging::init(&config.observability);
    tracing::info!("peer-http-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        observability::metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    lifecycle::run(config, shutdown).await?;
    Ok(())
}
