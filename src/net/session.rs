//! Per-stream session handling.
//!
//! # State Machine
//! ```text
//! Opened → Authorizing ─┬─→ Rejected                      (nothing written)
//!                       └─→ Decoding ─┬─→ DecodeFailed    (nothing written)
//!                                     └─→ Forwarding → Encoding → Closed
//! ```
//! The stream is shut down on every path, including handler and session panics.
//!
//! # Design Decisions
//! - One tokio task per stream, no admission control
//! - Handler panics are caught at the session boundary and answered with a 500
//! - Rejected and malformed streams get silence, not an HTTP error

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use http::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::forward::Forward;
use crate::http::{decode_request, encode_response, CapturedResponse, DecodeLimits, ResponseSink};
use crate::net::connection::SessionTracker;
use crate::net::stream::{PeerIdentity, PeerStream};
use crate::observability::metrics;
use crate::security::{is_allowed, AllowList};

/// Session lifecycle states, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opened,
    Authorizing,
    Rejected,
    Decoding,
    DecodeFailed,
    Forwarding,
    Encoding,
    Closed,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Peer not in the allow list.
    Rejected,
    /// The request could not be decoded.
    DecodeFailed,
    /// A response was written. `handler_fault` is set when the handler
    /// panicked and a 500 was sent in its place.
    Completed {
        status: StatusCode,
        handler_fault: bool,
    },
    /// Writing the response failed.
    WriteFailed,
    /// The session itself panicked outside the handler.
    Aborted,
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Rejected => "rejected",
            SessionOutcome::DecodeFailed => "decode_failed",
            SessionOutcome::Completed {
                handler_fault: true,
                ..
            } => "handler_fault",
            SessionOutcome::Completed { .. } => "completed",
            SessionOutcome::WriteFailed => "write_failed",
            SessionOutcome::Aborted => "aborted",
        }
    }
}

/// Per-session limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub limits: DecodeLimits,
    /// Upper bound on reading the whole request.
    pub read_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            limits: DecodeLimits::default(),
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            limits: config.limits.decode_limits(),
            read_timeout: Duration::from_secs(config.timeouts.read_secs),
        }
    }
}

/// Bridges inbound peer streams to a forwarding handler.
///
/// Cheap to clone; all clones share the allow list, handler and tracker.
#[derive(Clone)]
pub struct Bridge {
    allow_list: Arc<AllowList>,
    forwarder: Arc<dyn Forward>,
    settings: SessionSettings,
    tracker: SessionTracker,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("allow_list", &self.allow_list)
            .field("forwarder", &self.forwarder)
            .field("active_sessions", &self.tracker.active_count())
            .finish()
    }
}

impl Bridge {
    pub fn new(
        allow_list: AllowList,
        forwarder: Arc<dyn Forward>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            allow_list: Arc::new(allow_list),
            forwarder,
            settings,
            tracker: SessionTracker::new(),
        }
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Stream-accept callback: handles `stream` on its own task.
    pub fn accept<S>(&self, stream: S) -> JoinHandle<SessionOutcome>
    where
        S: PeerStream + 'static,
    {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.handle(stream).await })
    }

    /// Runs one session to completion and closes the stream.
    pub async fn handle<S: PeerStream>(&self, mut stream: S) -> SessionOutcome {
        let guard = self.tracker.track();
        let peer = stream.remote_identity().clone();
        let span = tracing::info_span!("session", id = %guard.id(), peer = %peer);

        async move {
            let start_time = Instant::now();
            tracing::debug!(state = ?SessionState::Opened, "Stream opened");

            let outcome = match AssertUnwindSafe(self.run(&peer, &mut stream))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    tracing::error!(panic = %panic_message(&*panic), "Session panicked");
                    SessionOutcome::Aborted
                }
            };

            if let Err(e) = stream.shutdown().await {
                tracing::debug!(error = %e, "Stream shutdown failed");
            }
            drop(stream);
            tracing::debug!(state = ?SessionState::Closed, outcome = outcome.label(), "Stream closed");

            metrics::record_session(outcome.label(), start_time);
            drop(guard);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run<S: PeerStream>(&self, peer: &PeerIdentity, stream: &mut S) -> SessionOutcome {
        tracing::debug!(state = ?SessionState::Authorizing, "Checking peer");
        if !is_allowed(peer, &self.allow_list) {
            let err = BridgeError::Unauthorized {
                peer: peer.to_string(),
            };
            tracing::warn!(
                state = ?SessionState::Rejected,
                error = %err,
                "Got a new stream from a peer that is not allowed. If it should be, add it to the allowed peers"
            );
            return SessionOutcome::Rejected;
        }

        tracing::debug!(state = ?SessionState::Decoding, "Reading request");
        let decoded = tokio::time::timeout(
            self.settings.read_timeout,
            decode_request(&mut *stream, &self.settings.limits),
        )
        .await
        .unwrap_or_else(|_| Err(BridgeError::malformed("read timed out")));
        let mut request = match decoded {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(state = ?SessionState::DecodeFailed, error = %e, "Error reading request");
                return SessionOutcome::DecodeFailed;
            }
        };
        request.extensions_mut().insert(peer.clone());

        let method = request.method().clone();
        let path = request.uri().path().to_string();
        tracing::debug!(state = ?SessionState::Forwarding, method = %method, path = %path, "Forwarding request");

        let mut sink = ResponseSink::new();
        let forwarded = AssertUnwindSafe(self.forwarder.forward(request, &mut sink))
            .catch_unwind()
            .await;
        let (response, handler_fault) = match forwarded {
            Ok(()) => (sink.build(), false),
            Err(panic) => {
                let err = BridgeError::HandlerFault(panic_message(&*panic));
                tracing::error!(method = %method, path = %path, error = %err, "Forwarding handler panicked");
                (CapturedResponse::empty(StatusCode::INTERNAL_SERVER_ERROR), true)
            }
        };

        tracing::debug!(state = ?SessionState::Encoding, status = %response.status, "Writing response");
        match encode_response(&response, stream).await {
            Ok(()) => {
                tracing::info!(
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    body_len = response.body.len(),
                    "Request bridged"
                );
                SessionOutcome::Completed {
                    status: response.status,
                    handler_fault,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error writing response");
                SessionOutcome::WriteFailed
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(SessionOutcome::Rejected.label(), "rejected");
        assert_eq!(
            SessionOutcome::Completed {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                handler_fault: true
            }
            .label(),
            "handler_fault"
        );
        assert_eq!(
            SessionOutcome::Completed {
                status: StatusCode::OK,
                handler_fault: false
            }
            .label(),
            "completed"
        );
    }

    #[test]
    fn panic_messages() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(&*boxed), "kaboom");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }

    #[test]
    fn settings_follow_config() {
        let mut config = BridgeConfig::default();
        config.timeouts.read_secs = 3;
        config.limits.max_body_bytes = 10;
        let settings = SessionSettings::from_config(&config);
        assert_eq!(settings.read_timeout, Duration::from_secs(3));
        assert_eq!(settings.limits.max_body_bytes, 10);
    }
}
