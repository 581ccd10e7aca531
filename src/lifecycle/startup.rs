//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the allow list and the forwarding handler from validated config
//! - Load or create the node's secret key
//! - Bind the iroh endpoint and register the bridge protocol
//! - Run until shutdown, then drain in-flight sessions
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The endpoint binds last (streams only when ready)

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use iroh::endpoint::BindError;
use iroh::protocol::Router;
use iroh::{Endpoint, SecretKey};

use crate::config::{BindAddrError, BridgeConfig};
use crate::forward::{ProxyTargetError, ReverseProxy};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::iroh::IrohAcceptor;
use crate::net::{Bridge, SessionSettings};
use crate::security::{AllowList, AllowListError};

const SECRET_KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    AllowList(#[from] AllowListError),
    #[error(transparent)]
    Target(#[from] ProxyTargetError),
    #[error("secret key {}: {source}", .path.display())]
    KeyIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("secret key {} is {len} bytes, expected {SECRET_KEY_LEN}", .path.display())]
    KeyLength { path: PathBuf, len: usize },
    #[error(transparent)]
    BindAddr(#[from] BindAddrError),
    #[error("failed to bind endpoint: {0}")]
    Bind(#[from] BindError),
}

/// Read the node's secret key, generating and saving one on first start.
pub fn load_or_create_secret_key(path: &Path) -> Result<SecretKey, StartupError> {
    let key_io = |source| StartupError::KeyIo {
        path: path.to_path_buf(),
        source,
    };

    match fs::read(path) {
        Ok(bytes) => {
            let bytes: [u8; SECRET_KEY_LEN] =
                bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StartupError::KeyLength {
                        path: path.to_path_buf(),
                        len: bytes.len(),
                    })?;
            tracing::debug!(path = %path.display(), "Loaded secret key");
            Ok(SecretKey::from_bytes(&bytes))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let bytes: [u8; SECRET_KEY_LEN] = rand::random();
            write_key_file(path, &bytes).map_err(key_io)?;
            tracing::info!(path = %path.display(), "Generated new secret key");
            Ok(SecretKey::from_bytes(&bytes))
        }
        Err(e) => Err(key_io(e)),
    }
}

fn write_key_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Run the bridge until `shutdown` fires.
pub async fn run(config: BridgeConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let stop = shutdown.subscribe();

    let allow_list = AllowList::new(&config.bridge.allowed_peers)?;
    if allow_list.is_wildcard() {
        tracing::warn!("Any peer may open streams to this bridge");
    } else {
        tracing::info!(peers = allow_list.entries().len(), "Loaded allowed peers");
    }

    let proxy = ReverseProxy::new(&config.upstream)?;
    tracing::info!(target = %proxy.target().authority(), "Forwarding requests to backend");

    let bridge = Bridge::new(
        allow_list,
        Arc::new(proxy),
        SessionSettings::from_config(&config),
    );

    let bind_addrs = config.bridge.parse_bind_addrs()?;
    let secret_key = load_or_create_secret_key(&config.identity.key_path)?;
    let mut builder = Endpoint::builder().secret_key(secret_key);
    if let Some(v4) = bind_addrs.v4 {
        builder = builder.bind_addr_v4(v4);
    }
    if let Some(v6) = bind_addrs.v6 {
        builder = builder.bind_addr_v6(v6);
    }
    let endpoint = builder.bind().await?;
    let router = Router::builder(endpoint)
        .accept(
            config.bridge.protocol.as_bytes().to_vec(),
            IrohAcceptor::new(bridge.clone()),
        )
        .spawn();

    let endpoint_id = router.endpoint().id();
    println!("Endpoint id: {endpoint_id}");
    for addr in router.endpoint().bound_sockets() {
        println!("Listening on {addr} as {endpoint_id}");
    }
    tracing::info!(
        endpoint_id = %endpoint_id,
        protocol = %config.bridge.protocol,
        "Bridge listening"
    );

    Shutdown::triggered(stop).await;
    tracing::info!("Shutting down");

    if let Err(e) = router.shutdown().await {
        tracing::warn!(error = ?e, "Router shutdown failed");
    }

    let grace = Duration::from_secs(config.timeouts.shutdown_secs);
    if !bridge.tracker().wait_idle(grace).await {
        tracing::warn!(
            remaining = bridge.tracker().active_count(),
            "Sessions still active at shutdown deadline"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
