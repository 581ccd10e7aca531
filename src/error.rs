//! Error taxonomy for the stream-to-HTTP bridge.
//!
//! Every variant is handled at the session boundary; none of them is fatal
//! to the process.

use std::io;
use thiserror::Error;

/// Errors raised while bridging one stream.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The remote peer is not in the allow list.
    #[error("peer {peer} is not allowed")]
    Unauthorized { peer: String },

    /// The request could not be read off the stream.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The forwarding handler panicked.
    #[error("handler fault: {0}")]
    HandlerFault(String),

    /// Writing to the stream failed.
    #[error("failed to write to stream: {0}")]
    WriteFailure(#[source] io::Error),

    /// The response read back by the client side could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BridgeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        BridgeError::MalformedRequest(reason.into())
    }

    /// Maps a read error into `MalformedRequest`, keeping timeouts recognizable.
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => BridgeError::malformed("read timed out"),
            _ => BridgeError::MalformedRequest(format!("read failed: {err}")),
        }
    }
}
