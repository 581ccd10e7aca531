//! Forwarding handlers.
//!
//! # Data Flow
//! ```text
//! session (decoded request + fresh sink)
//!     → Forward::forward
//!         → reverse_proxy.rs (rewrite URI/Host, strip hop-by-hop,
//!                             call backend, capture response)
//!     → sink holds the response
//! ```
//!
//! # Design Decisions
//! - A handler only writes into the sink; it never sees the peer stream
//! - One handler instance is shared by every session, so it must be reentrant
//! - Backend failures become 502/504 responses, not errors

pub mod reverse_proxy;

use std::fmt::Debug;

use futures_util::future::BoxFuture;

use crate::http::{DecodedRequest, ResponseSink};

pub use reverse_proxy::{ProxyTargetError, ReverseProxy};

/// An HTTP handler that answers a decoded request by writing into a sink.
pub trait Forward: Send + Sync + Debug {
    fn forward<'a>(&'a self, req: DecodedRequest, sink: &'a mut ResponseSink) -> BoxFuture<'a, ()>;
}
