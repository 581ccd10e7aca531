//! iroh transport binding.
//!
//! Each bidirectional QUIC stream opened by a remote endpoint becomes one
//! bridge session. The remote endpoint id is the peer identity.

use std::time::Duration;

use iroh::endpoint::{Connection, ConnectionError};
use iroh::protocol::{AcceptError, ProtocolHandler};
use tokio_util::future::FutureExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::net::session::Bridge;
use crate::net::stream::{IdentifiedStream, PeerIdentity};

/// How long shutdown waits for in-flight streams before giving up.
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Accepts iroh connections and hands their streams to a [`Bridge`].
///
/// ```ignore
/// let router = Router::builder(endpoint)
///     .accept(protocol.as_bytes(), IrohAcceptor::new(bridge))
///     .spawn();
/// ```
#[derive(Debug)]
pub struct IrohAcceptor {
    bridge: Bridge,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl IrohAcceptor {
    pub fn new(bridge: Bridge) -> Self {
        Self {
            bridge,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    async fn handle_connection(&self, connection: Connection) -> Result<(), ConnectionError> {
        let peer = PeerIdentity::new(connection.remote_id().to_string());
        let mut stream_id: u64 = 0;
        loop {
            let (send, recv) = match connection
                .accept_bi()
                .with_cancellation_token(&self.shutdown)
                .await
            {
                None => return Ok(()),
                Some(Ok(streams)) => streams,
                Some(Err(ConnectionError::ApplicationClosed(_))) => {
                    tracing::debug!("Connection closed by remote");
                    return Ok(());
                }
                Some(Err(err)) => return Err(err),
            };

            let stream = IdentifiedStream::new(peer.clone(), tokio::io::join(recv, send));
            let bridge = self.bridge.clone();
            self.tasks.spawn(
                async move {
                    bridge.handle(stream).await;
                }
                .instrument(tracing::debug_span!("stream", id = stream_id)),
            );
            stream_id += 1;
        }
    }
}

impl ProtocolHandler for IrohAcceptor {
    async fn accept(&self, connection: Connection) -> Result<(), AcceptError> {
        tracing::debug!(remote_id = %connection.remote_id().fmt_short(), "Accepted connection");
        self.handle_connection(connection)
            .await
            .map_err(AcceptError::from_err)
    }

    async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        tracing::debug!(pending = self.tasks.len(), "Shutting down stream acceptor");
        match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, self.tasks.wait()).await {
            Ok(()) => tracing::debug!("All streams closed cleanly"),
            Err(_) => tracing::warn!(
                remaining = self.tasks.len(),
                "Not all streams closed in time"
            ),
        }
    }
}
