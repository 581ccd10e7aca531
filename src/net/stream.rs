//! Peer streams as seen by the bridge.
//!
//! A transport hands the bridge one [`PeerStream`] per accepted stream. The
//! stream carries exactly one request/response exchange and is closed by the
//! session when it ends.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Authenticated identifier of the remote end of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Transports build identities from their own peer ids.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bidirectional byte stream bound to a single remote peer.
pub trait PeerStream: AsyncRead + AsyncWrite + Unpin + Send {
    fn remote_identity(&self) -> &PeerIdentity;
}

/// Pairs any async byte stream with the identity of its remote end.
#[derive(Debug)]
pub struct IdentifiedStream<S> {
    remote: PeerIdentity,
    inner: S,
}

impl<S> IdentifiedStream<S> {
    pub fn new(remote: PeerIdentity, inner: S) -> Self {
        Self { remote, inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> PeerStream for IdentifiedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn remote_identity(&self) -> &PeerIdentity {
        &self.remote
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for IdentifiedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for IdentifiedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
