//! Bridge HTTP requests arriving on peer-to-peer streams to a local HTTP backend.
//!
//! Each inbound stream carries one HTTP/1.1 request. The bridge checks the
//! remote peer against an allow list, decodes the request, hands it to a
//! [`forward::Forward`] handler and writes the captured response back before
//! closing the stream.

pub mod config;
pub mod error;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::BridgeConfig;
pub use error::BridgeError;
pub use lifecycle::Shutdown;
pub use net::{Bridge, PeerIdentity, PeerStream, SessionOutcome};
